//! Object-storage collaborator. Jobs see a single bucket through [`BucketStore`]; the S3
//! backend lives behind the `runtime` feature and a directory-backed store covers local runs.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::debug;

use crate::archive::{extract_zip, ArchiveError};

#[derive(Debug, Error)]
pub enum BucketError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("sdk error: {0}")]
    Sdk(String),
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("io error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BucketError {
    #[cfg_attr(not(feature = "runtime"), allow(dead_code))]
    fn from_sdk(err: impl fmt::Display) -> Self {
        Self::Sdk(err.to_string())
    }

    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[async_trait]
pub trait BucketStore: Send + Sync {
    fn bucket(&self) -> &str;
    /// Keys under `prefix`, sorted.
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, BucketError>;
    async fn get_object(&self, key: &str) -> Result<Bytes, BucketError>;
    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), BucketError>;
}

/// `s3://bucket/some/prefix`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Location {
    pub bucket: String,
    pub prefix: String,
}

impl FromStr for S3Location {
    type Err = BucketError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let rest = value.trim().strip_prefix("s3://").ok_or_else(|| {
            BucketError::Configuration(format!("'{value}' is not an s3:// location"))
        })?;
        let (bucket, path) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(BucketError::Configuration(format!(
                "'{value}' does not name a bucket"
            )));
        }
        Ok(Self {
            bucket: bucket.to_string(),
            prefix: path.trim_start_matches('/').to_string(),
        })
    }
}

impl fmt::Display for S3Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.prefix)
    }
}

/// A directory standing in for a bucket: object `a/b.json` lives at `<root>/a/b.json`.
#[derive(Debug, Clone)]
pub struct LocalBucketStore {
    root: PathBuf,
    bucket: String,
}

impl LocalBucketStore {
    pub fn new(root: impl Into<PathBuf>, bucket: impl Into<String>) -> Result<Self, BucketError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| BucketError::io(&root, source))?;
        Ok(Self {
            root,
            bucket: bucket.into(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, BucketError> {
        if key.is_empty() || key.split('/').any(|segment| segment == "..") {
            return Err(BucketError::Configuration(format!("invalid object key '{key}'")));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BucketStore for LocalBucketStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, BucketError> {
        let pattern = self.root.join("**").join("*");
        let pattern = pattern.to_string_lossy();
        let entries =
            glob::glob(&pattern).map_err(|err| BucketError::Configuration(err.to_string()))?;

        let mut keys = Vec::new();
        for entry in entries {
            let path = entry.map_err(|err| BucketError::Sdk(err.to_string()))?;
            if !path.is_file() {
                continue;
            }
            let Ok(relative) = path.strip_prefix(&self.root) else {
                continue;
            };
            let key = relative
                .components()
                .map(|component| component.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn get_object(&self, key: &str) -> Result<Bytes, BucketError> {
        let path = self.object_path(key)?;
        match std::fs::read(&path) {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(BucketError::NotFound(key.to_string()))
            }
            Err(err) => Err(BucketError::io(&path, err)),
        }
    }

    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        _content_type: &str,
    ) -> Result<(), BucketError> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| BucketError::io(parent, source))?;
        }
        std::fs::write(&path, &bytes).map_err(|source| BucketError::io(&path, source))
    }
}

/// Downloads `key` to `dst`, creating parent directories.
pub async fn download_to_path(
    store: &dyn BucketStore,
    key: &str,
    dst: &Path,
) -> Result<(), BucketError> {
    let bytes = store.get_object(key).await?;
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent).map_err(|source| BucketError::io(parent, source))?;
    }
    std::fs::write(dst, &bytes).map_err(|source| BucketError::io(dst, source))?;
    debug!(bucket = store.bucket(), key, path = %dst.display(), bytes = bytes.len(), "downloaded object");
    Ok(())
}

pub async fn upload_path(
    store: &dyn BucketStore,
    src: &Path,
    key: &str,
) -> Result<(), BucketError> {
    let data = std::fs::read(src).map_err(|source| BucketError::io(src, source))?;
    let size = data.len();
    store
        .put_object(key, Bytes::from(data), content_type_for(src))
        .await?;
    debug!(bucket = store.bucket(), key, path = %src.display(), bytes = size, "uploaded object");
    Ok(())
}

/// Downloads the zip archive at `key` to `archive` and extracts it into `dest`, returning
/// the number of extracted entries.
pub async fn download_and_extract(
    store: &dyn BucketStore,
    key: &str,
    archive: &Path,
    dest: &Path,
) -> Result<usize, BucketError> {
    download_to_path(store, key, archive).await?;
    Ok(extract_zip(archive, dest)?)
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => "application/json",
        Some("csv") => "text/csv",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}

#[cfg(feature = "runtime")]
pub use s3::{bucket_store_from_env, S3BucketStore, S3Config};

#[cfg(feature = "runtime")]
mod s3 {
    use async_trait::async_trait;
    use aws_config::BehaviorVersion;
    use aws_credential_types::provider::SharedCredentialsProvider;
    use aws_credential_types::Credentials;
    use aws_sdk_s3::config::Region;
    use aws_sdk_s3::error::SdkError;
    use aws_sdk_s3::primitives::ByteStream;
    use aws_sdk_s3::Client;
    use bytes::Bytes;

    use super::{BucketError, BucketStore, LocalBucketStore};

    #[derive(Debug, Clone)]
    pub struct S3Config {
        pub bucket: String,
        pub region: String,
        pub endpoint: Option<String>,
        pub access_key_id: Option<String>,
        pub secret_access_key: Option<String>,
        pub force_path_style: bool,
    }

    impl S3Config {
        /// Connection settings from `S3_REGION`, `S3_ENDPOINT_URL`, `S3_ACCESS_KEY_ID`,
        /// `S3_SECRET_ACCESS_KEY` and `S3_FORCE_PATH_STYLE`.
        pub fn from_env(bucket: impl Into<String>) -> Self {
            let var = |name: &str| std::env::var(name).ok().filter(|value| !value.is_empty());
            Self {
                bucket: bucket.into(),
                region: var("S3_REGION")
                    .or_else(|| var("AWS_REGION"))
                    .unwrap_or_else(|| "us-east-1".to_string()),
                endpoint: var("S3_ENDPOINT_URL"),
                access_key_id: var("S3_ACCESS_KEY_ID"),
                secret_access_key: var("S3_SECRET_ACCESS_KEY"),
                force_path_style: var("S3_FORCE_PATH_STYLE")
                    .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                    .unwrap_or(false),
            }
        }
    }

    #[derive(Clone)]
    pub struct S3BucketStore {
        client: Client,
        bucket: String,
    }

    impl S3BucketStore {
        pub async fn new(config: S3Config) -> Result<Self, BucketError> {
            if config.bucket.is_empty() {
                return Err(BucketError::Configuration(
                    "bucket name cannot be empty".into(),
                ));
            }

            let mut loader = aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(config.region.clone()));

            if let (Some(access_key), Some(secret_key)) =
                (&config.access_key_id, &config.secret_access_key)
            {
                let credentials = Credentials::new(access_key, secret_key, None, None, "static");
                loader = loader.credentials_provider(SharedCredentialsProvider::new(credentials));
            }

            let shared_config = loader.load().await;
            let mut builder = aws_sdk_s3::config::Builder::from(&shared_config);

            if let Some(endpoint) = &config.endpoint {
                builder = builder.endpoint_url(endpoint);
            }

            if config.force_path_style {
                builder = builder.force_path_style(true);
            }

            let client = Client::from_conf(builder.build());
            Ok(Self {
                client,
                bucket: config.bucket,
            })
        }
    }

    #[async_trait]
    impl BucketStore for S3BucketStore {
        fn bucket(&self) -> &str {
            &self.bucket
        }

        async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, BucketError> {
            let mut keys = Vec::new();
            let mut continuation: Option<String> = None;

            loop {
                let output = self
                    .client
                    .list_objects_v2()
                    .bucket(&self.bucket)
                    .prefix(prefix)
                    .set_continuation_token(continuation.take())
                    .send()
                    .await
                    .map_err(BucketError::from_sdk)?;

                keys.extend(
                    output
                        .contents()
                        .iter()
                        .filter_map(|object| object.key().map(str::to_string)),
                );

                match output.next_continuation_token() {
                    Some(token) if output.is_truncated().unwrap_or(false) => {
                        continuation = Some(token.to_string());
                    }
                    _ => break,
                }
            }

            keys.sort();
            Ok(keys)
        }

        async fn get_object(&self, key: &str) -> Result<Bytes, BucketError> {
            let output = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|err| match err {
                    SdkError::ServiceError(service_err) => {
                        let message = service_err.err().to_string();
                        if message.contains("NoSuchKey") {
                            BucketError::NotFound(key.to_string())
                        } else {
                            BucketError::from_sdk(message)
                        }
                    }
                    other => BucketError::from_sdk(other),
                })?;

            let data = output.body.collect().await.map_err(BucketError::from_sdk)?;
            Ok(data.into_bytes())
        }

        async fn put_object(
            &self,
            key: &str,
            bytes: Bytes,
            content_type: &str,
        ) -> Result<(), BucketError> {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .body(ByteStream::from(bytes))
                .content_type(content_type)
                .send()
                .await
                .map_err(BucketError::from_sdk)?;
            Ok(())
        }
    }

    /// A directory-backed store under `LOADCAST_LOCAL_BUCKET_ROOT/<bucket>` when that variable
    /// is set, otherwise S3 configured from the environment.
    pub async fn bucket_store_from_env(bucket: &str) -> Result<Box<dyn BucketStore>, BucketError> {
        if let Some(root) = std::env::var_os("LOADCAST_LOCAL_BUCKET_ROOT") {
            let root = std::path::PathBuf::from(root).join(bucket);
            return Ok(Box::new(LocalBucketStore::new(root, bucket)?));
        }
        Ok(Box::new(S3BucketStore::new(S3Config::from_env(bucket)).await?))
    }
}
