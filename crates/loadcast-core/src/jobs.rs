//! Batch jobs wiring the transforms to the storage collaborator. Each job runs once per
//! pipeline step and fails as a whole on the first error.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};

use crate::axis::TimestampAxis;
use crate::config::PipelineConfig;
use crate::object_store::{download_and_extract, download_to_path, upload_path, BucketStore};
use crate::quantiles::flatten_file;
use crate::windowing::run_windowing;

pub const INPUT_DIR: &str = "input";
pub const JSON_DIR: &str = "json";
pub const CSV_DIR: &str = "csv";
pub const FORECAST_PREFIX: &str = "forecast";

#[derive(Debug, Clone)]
pub struct PreprocessReport {
    pub entity_count: usize,
    pub train_windows: usize,
    pub test_windows: usize,
    pub uploaded_keys: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PostprocessReport {
    pub files_processed: usize,
    pub rows_written: usize,
    pub uploaded_keys: Vec<String>,
}

/// Key a produced window file is published under: `train.json` -> `json/train/train.json`.
pub fn dataset_key(file: &Path) -> Option<String> {
    let stem = file.file_stem()?.to_str()?;
    Some(format!("{JSON_DIR}/{stem}/{stem}.json"))
}

/// Downloads the raw archive `fileuri`, windows the dataset inside it, and uploads the
/// resulting JSON files.
pub async fn run_preprocess(
    store: &dyn BucketStore,
    fileuri: &str,
    scratch: &Path,
    config: &PipelineConfig,
) -> Result<PreprocessReport> {
    let archive_path = scratch.join(fileuri);
    let data_dir = scratch.join(INPUT_DIR);
    let entries = download_and_extract(store, fileuri, &archive_path, &data_dir)
        .await
        .with_context(|| format!("failed to fetch raw archive s3://{}/{}", store.bucket(), fileuri))?;
    info!(fileuri, entries, dir = %data_dir.display(), "extracted raw archive");

    let dataset_path = data_dir.join(&config.windowing.dataset_file);
    let summary = run_windowing(&dataset_path, &data_dir, &config.windowing)
        .with_context(|| format!("failed to window {}", dataset_path.display()))?;
    info!(
        entities = summary.entity_count,
        train_windows = summary.train_windows,
        test_windows = summary.test_windows,
        "wrote training and test windows"
    );

    let mut uploaded_keys = Vec::new();
    for path in json_files(&data_dir)? {
        let key = dataset_key(&path)
            .ok_or_else(|| anyhow!("cannot derive object key from {}", path.display()))?;
        upload_path(store, &path, &key)
            .await
            .with_context(|| format!("failed to upload {}", path.display()))?;
        info!(bucket = store.bucket(), key = %key, "uploaded dataset");
        uploaded_keys.push(key);
    }

    Ok(PreprocessReport {
        entity_count: summary.entity_count,
        train_windows: summary.train_windows,
        test_windows: summary.test_windows,
        uploaded_keys,
    })
}

/// Downloads every forecast object under `prefix`, flattens each into a CSV, and uploads the
/// CSVs produced by this run under `forecast/`. Older files in the scratch CSV directory are
/// not uploaded.
pub async fn run_postprocess(
    store: &dyn BucketStore,
    prefix: &str,
    scratch: &Path,
    config: &PipelineConfig,
) -> Result<PostprocessReport> {
    let axis = TimestampAxis::from_config(&config.forecast)
        .ok_or_else(|| anyhow!("forecast cadence must be positive"))?;
    if axis.is_empty() {
        warn!("forecast axis is empty; every non-empty forecast line will be rejected");
    }

    let json_dir = scratch.join(JSON_DIR);
    let csv_dir = scratch.join(CSV_DIR);
    for dir in [&json_dir, &csv_dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let keys = store
        .list_prefix(prefix)
        .await
        .with_context(|| format!("failed to list s3://{}/{}", store.bucket(), prefix))?;

    let mut downloaded: Vec<PathBuf> = Vec::new();
    for key in keys.iter().filter(|key| !key.ends_with('/')) {
        let name = key.rsplit('/').next().unwrap_or(key.as_str());
        let dst = json_dir.join(name);
        download_to_path(store, key, &dst)
            .await
            .with_context(|| format!("failed to download s3://{}/{}", store.bucket(), key))?;
        if !downloaded.contains(&dst) {
            downloaded.push(dst);
        }
    }
    downloaded.sort();
    info!(prefix, files = downloaded.len(), "downloaded forecast output");

    let mut rows_written = 0;
    let mut outputs = Vec::with_capacity(downloaded.len());
    for path in &downloaded {
        let summary = flatten_file(path, &csv_dir, &axis, &config.forecast.entity_tag)
            .with_context(|| format!("failed to flatten {}", path.display()))?;
        rows_written += summary.rows;
        outputs.push(summary.output);
    }

    let mut uploaded_keys = Vec::with_capacity(outputs.len());
    for path in &outputs {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("invalid output file name {}", path.display()))?;
        let key = format!("{FORECAST_PREFIX}/{name}");
        upload_path(store, path, &key)
            .await
            .with_context(|| format!("failed to upload {}", path.display()))?;
        info!(bucket = store.bucket(), key = %key, "uploaded forecast table");
        uploaded_keys.push(key);
    }

    Ok(PostprocessReport {
        files_processed: downloaded.len(),
        rows_written,
        uploaded_keys,
    })
}

fn json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = dir.join("*.json");
    let pattern = pattern.to_string_lossy();
    let mut files = Vec::new();
    for entry in glob::glob(&pattern).context("invalid dataset glob")? {
        let path = entry.context("failed to read dataset directory")?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
