//! Fixed-cadence resampling of a wide table and per-entity leading-zero trimming.

use chrono::{DateTime, Duration, NaiveDateTime};
use loadcast_parser::WideTable;
use polars::prelude::PolarsError;
use thiserror::Error;

const MICROS_PER_DAY: i64 = 24 * 60 * 60 * 1_000_000;

#[derive(Debug, Error)]
pub enum ResampleError {
    #[error("cadence must be positive, got {0}")]
    InvalidCadence(Duration),
    #[error("timestamp {0} is out of range")]
    TimestampOutOfRange(i64),
    #[error(transparent)]
    Polars(#[from] PolarsError),
}

/// Bucket sums for every entity, one value per cadence step between the first and last
/// populated bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct ResampledTable {
    pub bucket_starts: Vec<i64>,
    pub columns: Vec<(String, Vec<f64>)>,
}

/// One entity's resampled series with its leading zeros removed.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySeries {
    pub name: String,
    pub timestamps: Vec<i64>,
    pub values: Vec<f64>,
}

impl EntitySeries {
    /// Values whose timestamp lies in `[start, end]`.
    pub fn slice_inclusive(&self, start: NaiveDateTime, end: NaiveDateTime) -> &[f64] {
        let start = start.and_utc().timestamp_micros();
        let end = end.and_utc().timestamp_micros();
        if end < start {
            return &[];
        }
        let lo = self.timestamps.partition_point(|ts| *ts < start);
        let hi = self.timestamps.partition_point(|ts| *ts <= end);
        &self.values[lo..hi.max(lo)]
    }
}

/// Sums every entity into left-closed, left-labelled buckets of `cadence`, anchored at
/// midnight of the earliest timestamp's day, then divides each sum by `divisor`.
/// Nulls are skipped; buckets without samples sum to zero.
pub fn resample_sum(
    table: &WideTable,
    cadence: Duration,
    divisor: f64,
) -> Result<ResampledTable, ResampleError> {
    let step = cadence
        .num_microseconds()
        .filter(|micros| *micros > 0)
        .ok_or(ResampleError::InvalidCadence(cadence))?;

    let timestamps = table.timestamps_micros()?;
    let (Some(&first), Some(&last)) = (timestamps.iter().min(), timestamps.iter().max()) else {
        return Ok(ResampledTable {
            bucket_starts: Vec::new(),
            columns: table
                .entity_names()
                .into_iter()
                .map(|name| (name, Vec::new()))
                .collect(),
        });
    };

    let origin = first - first.rem_euclid(MICROS_PER_DAY);
    let first_bucket = (first - origin).div_euclid(step);
    let last_bucket = (last - origin).div_euclid(step);
    let bucket_count = (last_bucket - first_bucket + 1) as usize;

    let bucket_starts: Vec<i64> = (0..bucket_count as i64)
        .map(|offset| origin + (first_bucket + offset) * step)
        .collect();
    let bucket_of: Vec<usize> = timestamps
        .iter()
        .map(|ts| ((ts - origin).div_euclid(step) - first_bucket) as usize)
        .collect();

    let mut columns = Vec::with_capacity(table.entity_count());
    for name in table.entity_names() {
        let values = table.entity_values(&name)?;
        let mut sums = vec![0.0_f64; bucket_count];
        for (row, value) in values.into_iter().enumerate() {
            if let Some(value) = value.filter(|v| !v.is_nan()) {
                sums[bucket_of[row]] += value;
            }
        }
        for sum in &mut sums {
            *sum /= divisor;
        }
        columns.push((name, sums));
    }

    Ok(ResampledTable {
        bucket_starts,
        columns,
    })
}

/// Drops the leading run of exact zeros. Trailing zeros are kept.
pub fn trim_leading_zeros(values: &[f64]) -> &[f64] {
    let first = values
        .iter()
        .position(|value| *value != 0.0)
        .unwrap_or(values.len());
    &values[first..]
}

/// Splits a resampled table into trimmed per-entity series, preserving column order.
pub fn trimmed_series(resampled: &ResampledTable) -> Vec<EntitySeries> {
    resampled
        .columns
        .iter()
        .map(|(name, values)| {
            let trimmed = trim_leading_zeros(values);
            let skipped = values.len() - trimmed.len();
            EntitySeries {
                name: name.clone(),
                timestamps: resampled.bucket_starts[skipped..].to_vec(),
                values: trimmed.to_vec(),
            }
        })
        .collect()
}

pub fn naive_from_micros(micros: i64) -> Result<NaiveDateTime, ResampleError> {
    DateTime::from_timestamp_micros(micros)
        .map(|dt| dt.naive_utc())
        .ok_or(ResampleError::TimestampOutOfRange(micros))
}
