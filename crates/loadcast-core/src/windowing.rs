use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use loadcast_parser::{read_wide_table, ParserError, WideTable};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, TestWindowOffset, WindowConfig, TIMESTAMP_FORMAT};
use crate::resample::{resample_sum, trimmed_series, EntitySeries, ResampleError};

pub const TRAIN_FILE: &str = "train.json";
pub const TEST_FILE: &str = "test.json";

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Parser(#[from] ParserError),
    #[error(transparent)]
    Resample(#[from] ResampleError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowRecord {
    pub start: String,
    pub target: Vec<f64>,
}

/// Training windows (one per entity) and test windows (`num_test_windows` per entity,
/// ordered window-major then entity).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WindowedDataset {
    pub train: Vec<WindowRecord>,
    pub test: Vec<WindowRecord>,
}

#[derive(Debug, Clone)]
pub struct WindowSummary {
    pub entity_count: usize,
    pub empty_entities: Vec<String>,
    pub train_windows: usize,
    pub test_windows: usize,
    pub train_path: PathBuf,
    pub test_path: PathBuf,
}

pub fn build_windows(
    series: &[EntitySeries],
    config: &WindowConfig,
) -> Result<WindowedDataset, ConfigError> {
    let start_label = config.start_dataset.format(TIMESTAMP_FORMAT).to_string();
    let train_end = config.training_end()?;

    let train = series
        .iter()
        .map(|entity| WindowRecord {
            start: start_label.clone(),
            target: entity
                .slice_inclusive(config.start_dataset, train_end)
                .to_vec(),
        })
        .collect();

    let mut test = Vec::new();
    for k in 1..=config.num_test_windows {
        let end = config.test_end(k)?;
        for entity in series {
            test.push(WindowRecord {
                start: start_label.clone(),
                target: entity.slice_inclusive(config.start_dataset, end).to_vec(),
            });
        }
    }

    Ok(WindowedDataset { train, test })
}

/// Resamples, trims, and windows a parsed table.
pub fn window_table(
    table: &WideTable,
    config: &WindowConfig,
) -> Result<(WindowedDataset, Vec<EntitySeries>), WindowError> {
    config.validate()?;
    let resampled = resample_sum(table, config.cadence(), config.scale_divisor)?;
    debug!(
        buckets = resampled.bucket_starts.len(),
        entities = resampled.columns.len(),
        "resampled wide table"
    );
    let series = trimmed_series(&resampled);
    let dataset = build_windows(&series, config)?;
    Ok((dataset, series))
}

pub fn write_json_lines<W: Write>(mut writer: W, records: &[WindowRecord]) -> std::io::Result<()> {
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

fn write_records(path: &Path, records: &[WindowRecord]) -> Result<(), WindowError> {
    File::create(path)
        .and_then(|file| write_json_lines(BufWriter::new(file), records))
        .map_err(|source| WindowError::Write {
            path: path.to_path_buf(),
            source,
        })
}

/// Reads the wide table at `input`, writes `train.json` and `test.json` into `output_dir`.
pub fn run_windowing(
    input: &Path,
    output_dir: &Path,
    config: &WindowConfig,
) -> Result<WindowSummary, WindowError> {
    if config.test_offset == TestWindowOffset::CalendarDays {
        warn!(
            prediction_length = config.prediction_length,
            "test windows advance by prediction_length calendar days, not cadence buckets; \
             set windowing.test_offset = \"buckets\" for bucket offsets"
        );
    }

    let file = File::open(input).map_err(|source| WindowError::Read {
        path: input.to_path_buf(),
        source,
    })?;
    let table = read_wide_table(BufReader::new(file))?;
    info!(
        path = %input.display(),
        rows = table.height(),
        entities = table.entity_count(),
        "parsed wide table"
    );

    let (dataset, series) = window_table(&table, config)?;
    let empty_entities: Vec<String> = series
        .iter()
        .filter(|entity| entity.values.is_empty())
        .map(|entity| entity.name.clone())
        .collect();
    if !empty_entities.is_empty() {
        warn!(count = empty_entities.len(), "entities with no nonzero readings");
    }

    let train_path = output_dir.join(TRAIN_FILE);
    let test_path = output_dir.join(TEST_FILE);
    write_records(&train_path, &dataset.train)?;
    write_records(&test_path, &dataset.test)?;

    Ok(WindowSummary {
        entity_count: series.len(),
        empty_entities,
        train_windows: dataset.train.len(),
        test_windows: dataset.test.len(),
        train_path,
        test_path,
    })
}
