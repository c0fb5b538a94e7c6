//! Parsing for the wide household consumption table: a `;`-delimited text file whose first
//! column is a timestamp index and whose remaining columns hold one reading per household,
//! written with a decimal comma.

use std::io::Read;

use chrono::{NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord};
use polars::prelude::*;

use crate::errors::ParserError;

const PARSER: &str = "wide_table";

pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// A parsed wide table. Column 0 is `timestamp` (`Datetime(Microseconds, None)`), every
/// following column is a nullable `Float64` entity column in source order.
#[derive(Debug, Clone)]
pub struct WideTable {
    pub df: DataFrame,
}

impl WideTable {
    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn entity_names(&self) -> Vec<String> {
        self.df
            .get_columns()
            .iter()
            .skip(1)
            .map(|column| column.name().to_string())
            .collect()
    }

    pub fn entity_count(&self) -> usize {
        self.df.width().saturating_sub(1)
    }

    /// Timestamps as UTC-naive microseconds since the epoch, in row order.
    pub fn timestamps_micros(&self) -> PolarsResult<Vec<i64>> {
        let column = self.df.column(TIMESTAMP_COLUMN)?.cast(&DataType::Int64)?;
        let values = column.i64()?;
        let mut out = Vec::with_capacity(values.len());
        for (idx, value) in values.into_iter().enumerate() {
            match value {
                Some(micros) => out.push(micros),
                None => {
                    return Err(PolarsError::ComputeError(
                        format!("timestamp missing at row {idx}").into(),
                    ))
                }
            }
        }
        Ok(out)
    }

    /// Values of one entity column, nulls preserved.
    pub fn entity_values(&self, name: &str) -> PolarsResult<Vec<Option<f64>>> {
        Ok(self.df.column(name)?.f64()?.into_iter().collect())
    }
}

pub fn parse_wide_table(content: &str) -> Result<WideTable, ParserError> {
    read_wide_table(content.as_bytes())
}

/// Streams the table from `source` record by record, so only the parsed columns are held in
/// memory. Wrap files in a `BufReader`.
pub fn read_wide_table<R: Read>(source: R) -> Result<WideTable, ParserError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .from_reader(source);

    let header = reader
        .headers()
        .map_err(|source| ParserError::Csv {
            parser: PARSER,
            source,
        })?
        .clone();
    let entity_names = parse_header(&header)?;

    let mut timestamps: Vec<i64> = Vec::new();
    let mut values: Vec<Vec<Option<f64>>> = vec![Vec::new(); entity_names.len()];

    let mut record = StringRecord::new();
    loop {
        let more = reader
            .read_record(&mut record)
            .map_err(|source| ParserError::Csv {
                parser: PARSER,
                source,
            })?;
        if !more {
            break;
        }
        let line_index = record
            .position()
            .map(|pos| pos.line() as usize)
            .unwrap_or_default();

        if record.len() != header.len() {
            return Err(ParserError::DataRow {
                parser: PARSER,
                line_index,
                message: format!(
                    "expected {} fields, found {}",
                    header.len(),
                    record.len()
                ),
            });
        }

        timestamps.push(parse_timestamp(
            record.get(0).unwrap_or_default(),
            line_index,
        )?);

        for (column, field) in record.iter().skip(1).enumerate() {
            let value = parse_decimal_comma(field, line_index, &entity_names[column])?;
            values[column].push(value);
        }
    }

    if timestamps.is_empty() {
        return Err(ParserError::EmptyData { parser: PARSER });
    }

    build_dataframe(timestamps, entity_names, values)
}

fn parse_header(header: &StringRecord) -> Result<Vec<String>, ParserError> {
    if header.len() < 2 {
        return Err(ParserError::InvalidHeader {
            parser: PARSER,
            message: format!(
                "expected an index column and at least one entity column, found {} fields",
                header.len()
            ),
        });
    }

    let mut names = Vec::with_capacity(header.len() - 1);
    for (idx, raw) in header.iter().enumerate().skip(1) {
        let name = raw.trim();
        if name.is_empty() {
            return Err(ParserError::InvalidHeader {
                parser: PARSER,
                message: format!("entity column {idx} has an empty name"),
            });
        }
        if name == TIMESTAMP_COLUMN || names.iter().any(|existing| existing == name) {
            return Err(ParserError::InvalidHeader {
                parser: PARSER,
                message: format!("duplicate column name '{name}'"),
            });
        }
        names.push(name.to_string());
    }
    Ok(names)
}

fn build_dataframe(
    timestamps: Vec<i64>,
    entity_names: Vec<String>,
    values: Vec<Vec<Option<f64>>>,
) -> Result<WideTable, ParserError> {
    let ts_series = Series::new(TIMESTAMP_COLUMN.into(), timestamps)
        .cast(&DataType::Datetime(TimeUnit::Microseconds, None))
        .map_err(|err| ParserError::Validation {
            parser: PARSER,
            message: format!("failed to cast timestamp column: {err}"),
        })?;

    let mut columns: Vec<Column> = Vec::with_capacity(entity_names.len() + 1);
    columns.push(ts_series.into());
    for (name, data) in entity_names.iter().zip(values) {
        columns.push(Series::new(name.as_str().into(), data).into());
    }

    let df = DataFrame::new(columns).map_err(|err| ParserError::Validation {
        parser: PARSER,
        message: format!("failed to build wide table: {err}"),
    })?;
    Ok(WideTable { df })
}

pub(crate) fn parse_timestamp(value: &str, line_index: usize) -> Result<i64, ParserError> {
    static FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];
    let trimmed = value.trim();
    for fmt in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(dt.and_utc().timestamp_micros());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(dt.and_utc().timestamp_micros());
        }
    }
    Err(ParserError::DataRow {
        parser: PARSER,
        line_index,
        message: format!("invalid timestamp '{trimmed}'"),
    })
}

/// Parses a reading written with a decimal comma (`2,5387`). Empty cells and `nan` are nulls.
pub(crate) fn parse_decimal_comma(
    value: &str,
    line_index: usize,
    column: &str,
) -> Result<Option<f64>, ParserError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }

    let normalized = trimmed.replace(',', ".");
    normalized
        .parse::<f64>()
        .map(Some)
        .map_err(|err| ParserError::DataRow {
            parser: PARSER,
            line_index,
            message: format!("failed to parse column '{column}' value '{trimmed}' as float: {err}"),
        })
}
