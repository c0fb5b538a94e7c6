use chrono::{Duration, NaiveDateTime};

use crate::config::{ForecastConfig, TIMESTAMP_FORMAT};

/// Fixed-cadence timestamps covering a forecast horizon, both endpoints included when they
/// fall on the cadence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampAxis {
    points: Vec<NaiveDateTime>,
}

impl TimestampAxis {
    /// Returns `None` when `cadence` is not positive.
    pub fn new(start: NaiveDateTime, end: NaiveDateTime, cadence: Duration) -> Option<Self> {
        if cadence <= Duration::zero() {
            return None;
        }
        let mut points = Vec::new();
        let mut current = start;
        while current <= end {
            points.push(current);
            match current.checked_add_signed(cadence) {
                Some(next) => current = next,
                None => break,
            }
        }
        Some(Self { points })
    }

    pub fn from_config(config: &ForecastConfig) -> Option<Self> {
        Self::new(config.forecast_start, config.forecast_end, config.cadence())
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[NaiveDateTime] {
        &self.points
    }

    pub fn formatted(&self) -> Vec<String> {
        self.points
            .iter()
            .map(|point| point.format(TIMESTAMP_FORMAT).to_string())
            .collect()
    }
}
