//! Pipeline configuration. Every field defaults to the values the household electricity
//! pipeline was built around, so an absent config file reproduces the stock behavior.

use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub windowing: WindowConfig,
    pub forecast: ForecastConfig,
    pub trigger: TriggerConfig,
}

/// How far each successive test window extends past `end_training`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestWindowOffset {
    /// `k * prediction_length` calendar days. Matches the datasets already produced by
    /// this pipeline even though `prediction_length` counts cadence buckets.
    #[default]
    CalendarDays,
    /// `k * prediction_length` cadence buckets.
    Buckets,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub cadence_minutes: i64,
    pub scale_divisor: f64,
    #[serde(with = "timestamp_format")]
    pub start_dataset: NaiveDateTime,
    #[serde(with = "timestamp_format")]
    pub end_training: NaiveDateTime,
    pub prediction_length: i64,
    pub num_test_windows: i64,
    pub test_offset: TestWindowOffset,
    pub dataset_file: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            cadence_minutes: 120,
            scale_divisor: 8.0,
            start_dataset: midnight(2014, 1, 1),
            end_training: midnight(2014, 9, 1),
            prediction_length: 7 * 12,
            num_test_windows: 4,
            test_offset: TestWindowOffset::CalendarDays,
            dataset_file: "LD2011_2014.txt".to_string(),
        }
    }
}

impl WindowConfig {
    /// Resampling cadence. Zero when `cadence_minutes` does not fit a duration, which the
    /// resampler rejects.
    pub fn cadence(&self) -> Duration {
        Duration::try_minutes(self.cadence_minutes).unwrap_or_else(Duration::zero)
    }

    /// Inclusive end of the training window, one day before `end_training`.
    pub fn training_end(&self) -> Result<NaiveDateTime, ConfigError> {
        self.end_training
            .checked_sub_signed(Duration::days(1))
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "windowing.end_training {} is out of range",
                    self.end_training
                ))
            })
    }

    /// Inclusive end of the `k`-th test window (1-based).
    pub fn test_end(&self, k: i64) -> Result<NaiveDateTime, ConfigError> {
        let out_of_range = || {
            ConfigError::Invalid(format!(
                "test window {k} end is out of range: prediction_length {} with cadence {} minutes",
                self.prediction_length, self.cadence_minutes
            ))
        };
        let steps = k.checked_mul(self.prediction_length).ok_or_else(out_of_range)?;
        let offset = match self.test_offset {
            TestWindowOffset::CalendarDays => Duration::try_days(steps),
            TestWindowOffset::Buckets => self
                .cadence_minutes
                .checked_mul(steps)
                .and_then(Duration::try_minutes),
        }
        .ok_or_else(out_of_range)?;
        self.end_training
            .checked_add_signed(offset)
            .ok_or_else(out_of_range)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cadence_minutes <= 0 || Duration::try_minutes(self.cadence_minutes).is_none() {
            return Err(ConfigError::Invalid(format!(
                "windowing.cadence_minutes must be positive and fit a duration, got {}",
                self.cadence_minutes
            )));
        }
        if self.scale_divisor == 0.0 || !self.scale_divisor.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "windowing.scale_divisor must be finite and non-zero, got {}",
                self.scale_divisor
            )));
        }
        if self.prediction_length <= 0 {
            return Err(ConfigError::Invalid(format!(
                "windowing.prediction_length must be positive, got {}",
                self.prediction_length
            )));
        }
        if self.num_test_windows < 0 {
            return Err(ConfigError::Invalid(format!(
                "windowing.num_test_windows must not be negative, got {}",
                self.num_test_windows
            )));
        }
        if self.dataset_file.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "windowing.dataset_file must not be empty".to_string(),
            ));
        }
        self.training_end()?;
        // Window ends grow with k, so the last one bounds them all.
        self.test_end(self.num_test_windows)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    #[serde(with = "timestamp_format")]
    pub forecast_start: NaiveDateTime,
    #[serde(with = "timestamp_format")]
    pub forecast_end: NaiveDateTime,
    pub cadence_minutes: i64,
    pub entity_tag: String,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            forecast_start: midnight(2014, 9, 1),
            forecast_end: midnight(2014, 9, 7) + Duration::hours(22),
            cadence_minutes: 120,
            entity_tag: "MT".to_string(),
        }
    }
}

impl ForecastConfig {
    pub fn cadence(&self) -> Duration {
        Duration::try_minutes(self.cadence_minutes).unwrap_or_else(Duration::zero)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cadence_minutes <= 0 || Duration::try_minutes(self.cadence_minutes).is_none() {
            return Err(ConfigError::Invalid(format!(
                "forecast.cadence_minutes must be positive and fit a duration, got {}",
                self.cadence_minutes
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    pub resource_prefix: String,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            resource_prefix: "DeepAR-MLOps-Pipeline".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Loads a TOML config, or the defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.windowing.validate()?;
        self.forecast.validate()
    }
}

fn midnight(year: i32, month: u32, day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

mod timestamp_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIMESTAMP_FORMAT;

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_household_pipeline() {
        let config = PipelineConfig::default();
        assert_eq!(config.windowing.prediction_length, 84);
        assert_eq!(config.windowing.num_test_windows, 4);
        assert_eq!(config.windowing.cadence(), Duration::hours(2));
        assert_eq!(
            config
                .windowing
                .training_end()
                .unwrap()
                .format(TIMESTAMP_FORMAT)
                .to_string(),
            "2014-08-31 00:00:00"
        );
        assert_eq!(
            config.forecast.forecast_end.format(TIMESTAMP_FORMAT).to_string(),
            "2014-09-07 22:00:00"
        );
        assert_eq!(config.trigger.resource_prefix, "DeepAR-MLOps-Pipeline");
        config.validate().unwrap();
    }

    #[test]
    fn test_end_uses_configured_unit() {
        let mut config = WindowConfig::default();
        assert_eq!(config.test_end(1).unwrap(), config.end_training + Duration::days(84));

        config.test_offset = TestWindowOffset::Buckets;
        assert_eq!(
            config.test_end(2).unwrap(),
            config.end_training + Duration::hours(2 * 84 * 2)
        );
    }

    #[test]
    fn oversized_calendar_offset_is_rejected() {
        let config = WindowConfig {
            prediction_length: 1_000_000_000,
            ..WindowConfig::default()
        };
        assert!(matches!(config.test_end(1), Err(ConfigError::Invalid(_))));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn bucket_offset_never_wraps_before_training_end() {
        let config = WindowConfig {
            test_offset: TestWindowOffset::Buckets,
            cadence_minutes: 1,
            prediction_length: 1 << 31,
            ..WindowConfig::default()
        };
        // 2^31 minutes is about 4083 years, still representable.
        let end = config.test_end(1).unwrap();
        assert!(end > config.end_training);
        assert_eq!(end, config.end_training + Duration::minutes(1 << 31));

        let overflowing = WindowConfig {
            prediction_length: i64::MAX / 2,
            num_test_windows: 4,
            ..config
        };
        assert!(matches!(overflowing.test_end(4), Err(ConfigError::Invalid(_))));
        assert!(overflowing.validate().is_err());
    }

    #[test]
    fn oversized_cadence_is_rejected_without_panicking() {
        let config = WindowConfig {
            cadence_minutes: i64::MAX,
            ..WindowConfig::default()
        };
        assert_eq!(config.cadence(), Duration::zero());
        assert!(config.validate().is_err());

        let toml_config = PipelineConfig::from_toml_str(
            r#"
            [windowing]
            prediction_length = 1000000000
            "#,
        )
        .unwrap();
        assert!(toml_config.validate().is_err());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [windowing]
            end_training = "2014-06-01 00:00:00"
            test_offset = "buckets"

            [forecast]
            entity_tag = "HH"
            "#,
        )
        .unwrap();

        assert_eq!(config.windowing.test_offset, TestWindowOffset::Buckets);
        assert_eq!(
            config.windowing.end_training.format(TIMESTAMP_FORMAT).to_string(),
            "2014-06-01 00:00:00"
        );
        assert_eq!(config.windowing.scale_divisor, 8.0);
        assert_eq!(config.forecast.entity_tag, "HH");
        assert_eq!(config.forecast.cadence_minutes, 120);
    }

    #[test]
    fn zero_cadence_is_invalid() {
        let mut config = PipelineConfig::default();
        config.forecast.cadence_minutes = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
