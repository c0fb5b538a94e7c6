use std::fs::File;
use std::path::{Path, PathBuf};

use loadcast_parser::{parse_quantile_lines, ParserError, QuantileRecord};
use polars::prelude::{Column, CsvWriter, DataFrame, NamedFrom, PolarsError, SerWriter, Series};
use thiserror::Error;
use tracing::info;

use crate::axis::TimestampAxis;

pub const ENTITY_COLUMN: &str = "entity_id";
pub const TIMESTAMP_COLUMN: &str = "timestamp";
pub const QUANTILE_COLUMNS: [&str; 3] = ["p10", "p50", "p90"];

#[derive(Debug, Error)]
pub enum FlattenError {
    #[error("line {line_index} quantile {label}: expected {expected} horizon steps, found {found}")]
    AxisLengthMismatch {
        line_index: usize,
        label: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("cannot derive an output name from {0}")]
    InvalidFileName(PathBuf),
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
    Polars(#[from] PolarsError),
}

#[derive(Debug, Clone)]
pub struct FlattenSummary {
    pub input: PathBuf,
    pub output: PathBuf,
    pub entities: usize,
    pub rows: usize,
}

/// `MT001`, `MT002`, ... Indices past 999 keep every digit.
pub fn entity_id(tag: &str, index: usize) -> String {
    format!("{tag}{index:03}")
}

/// Converts per-entity quantile records into one row per (entity, horizon step), numbering
/// entities from 1 in record order. Every quantile sequence must match the axis length.
pub fn flatten_records(
    records: &[QuantileRecord],
    axis: &TimestampAxis,
    tag: &str,
) -> Result<DataFrame, FlattenError> {
    let horizon = axis.len();
    let timestamps = axis.formatted();
    let rows = records.len() * horizon;

    let mut entity_ids: Vec<String> = Vec::with_capacity(rows);
    let mut row_timestamps: Vec<&str> = Vec::with_capacity(rows);
    let mut p10: Vec<f64> = Vec::with_capacity(rows);
    let mut p50: Vec<f64> = Vec::with_capacity(rows);
    let mut p90: Vec<f64> = Vec::with_capacity(rows);

    for (idx, record) in records.iter().enumerate() {
        let line_index = idx + 1;
        for (label, values) in record.series() {
            if values.len() != horizon {
                return Err(FlattenError::AxisLengthMismatch {
                    line_index,
                    label,
                    expected: horizon,
                    found: values.len(),
                });
            }
        }

        let id = entity_id(tag, line_index);
        entity_ids.extend(std::iter::repeat(id).take(horizon));
        row_timestamps.extend(timestamps.iter().map(String::as_str));
        p10.extend_from_slice(&record.p10);
        p50.extend_from_slice(&record.p50);
        p90.extend_from_slice(&record.p90);
    }

    let columns: Vec<Column> = vec![
        Series::new(ENTITY_COLUMN.into(), entity_ids).into(),
        Series::new(TIMESTAMP_COLUMN.into(), row_timestamps).into(),
        Series::new(QUANTILE_COLUMNS[0].into(), p10).into(),
        Series::new(QUANTILE_COLUMNS[1].into(), p50).into(),
        Series::new(QUANTILE_COLUMNS[2].into(), p90).into(),
    ];
    Ok(DataFrame::new(columns)?)
}

pub fn write_csv(df: &mut DataFrame, path: &Path) -> Result<(), FlattenError> {
    let mut file = File::create(path).map_err(|source| FlattenError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}

/// `test.json.out` -> `test.json.csv`.
pub fn output_name(input: &Path) -> Result<String, FlattenError> {
    input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(|stem| format!("{stem}.csv"))
        .ok_or_else(|| FlattenError::InvalidFileName(input.to_path_buf()))
}

/// Flattens one batch-transform output file into `<output_dir>/<stem>.csv`.
pub fn flatten_file(
    input: &Path,
    output_dir: &Path,
    axis: &TimestampAxis,
    tag: &str,
) -> Result<FlattenSummary, FlattenError> {
    let content = std::fs::read_to_string(input).map_err(|source| FlattenError::Read {
        path: input.to_path_buf(),
        source,
    })?;
    let records = parse_quantile_lines(&content)?;
    let mut df = flatten_records(&records, axis, tag)?;

    let output = output_dir.join(output_name(input)?);
    write_csv(&mut df, &output)?;
    info!(
        input = %input.display(),
        output = %output.display(),
        entities = records.len(),
        rows = df.height(),
        "flattened quantile forecast"
    );

    Ok(FlattenSummary {
        input: input.to_path_buf(),
        output,
        entities: records.len(),
        rows: df.height(),
    })
}
