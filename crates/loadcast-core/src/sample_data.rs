use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::archive::extract_zip;
use crate::object_store::{download_to_path, BucketStore};

pub const SAMPLE_BUCKET: &str = "sagemaker-sample-files";
pub const SAMPLE_PREFIX: &str = "datasets/timeseries/uci_electricity/";
pub const SAMPLE_ARCHIVE: &str = "LD2011_2014.txt.zip";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    AlreadyPresent(PathBuf),
    /// An archive from an earlier download was extracted; nothing was fetched.
    ExtractedExisting(PathBuf),
    Downloaded { archive: PathBuf, extracted: bool },
}

/// Name of the dataset file inside the sample archive.
pub fn sample_file_name() -> &'static str {
    SAMPLE_ARCHIVE.trim_end_matches(".zip")
}

/// Downloads the public household dataset archive into `dest` unless the extracted dataset
/// is already there. An archive left by an earlier download is reused instead of fetched
/// again.
pub async fn fetch_sample_data(
    store: &dyn BucketStore,
    dest: &Path,
    extract: bool,
) -> Result<FetchOutcome> {
    let dataset = dest.join(sample_file_name());
    if dataset.is_file() {
        info!(path = %dataset.display(), "file found, skipping download");
        return Ok(FetchOutcome::AlreadyPresent(dataset));
    }

    let archive = dest.join(SAMPLE_ARCHIVE);
    if archive.is_file() {
        if !extract {
            info!(path = %archive.display(), "archive found, skipping download");
            return Ok(FetchOutcome::AlreadyPresent(archive));
        }
        extract_zip(&archive, dest).context("failed to extract sample archive")?;
        info!(path = %archive.display(), "extracted existing archive");
        return Ok(FetchOutcome::ExtractedExisting(archive));
    }

    let key = format!("{SAMPLE_PREFIX}{SAMPLE_ARCHIVE}");
    info!(bucket = store.bucket(), key = %key, "downloading dataset, this can take a few minutes");
    download_to_path(store, &key, &archive)
        .await
        .with_context(|| format!("failed to download s3://{}/{}", store.bucket(), key))?;

    if extract {
        extract_zip(&archive, dest).context("failed to extract sample archive")?;
    }

    Ok(FetchOutcome::Downloaded { archive, extracted: extract })
}
