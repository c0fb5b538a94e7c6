use std::collections::BTreeMap;

use serde::Deserialize;

use crate::errors::ParserError;

const PARSER: &str = "quantile_forecast";

/// Quantile labels carried into the flattened output, in column order.
pub const QUANTILE_LABELS: [&str; 3] = ["0.1", "0.5", "0.9"];

#[derive(Debug, Deserialize)]
struct ForecastLine {
    quantiles: BTreeMap<String, Vec<f64>>,
}

/// One entity's forecast, one value per horizon step for each quantile.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantileRecord {
    pub p10: Vec<f64>,
    pub p50: Vec<f64>,
    pub p90: Vec<f64>,
}

impl QuantileRecord {
    pub fn series(&self) -> [(&'static str, &[f64]); 3] {
        [
            (QUANTILE_LABELS[0], self.p10.as_slice()),
            (QUANTILE_LABELS[1], self.p50.as_slice()),
            (QUANTILE_LABELS[2], self.p90.as_slice()),
        ]
    }
}

/// Parses one line of a batch-transform output file. `line_index` is 1-based and only used
/// for error reporting.
pub fn parse_quantile_line(line: &str, line_index: usize) -> Result<QuantileRecord, ParserError> {
    let mut parsed: ForecastLine =
        serde_json::from_str(line).map_err(|source| ParserError::Json {
            parser: PARSER,
            line_index,
            source,
        })?;

    let mut take = |label: &'static str| {
        parsed
            .quantiles
            .remove(label)
            .ok_or(ParserError::MissingQuantile {
                parser: PARSER,
                line_index,
                label,
            })
    };

    Ok(QuantileRecord {
        p10: take(QUANTILE_LABELS[0])?,
        p50: take(QUANTILE_LABELS[1])?,
        p90: take(QUANTILE_LABELS[2])?,
    })
}

/// Parses every line of a batch-transform output file in order.
pub fn parse_quantile_lines(content: &str) -> Result<Vec<QuantileRecord>, ParserError> {
    content
        .lines()
        .enumerate()
        .map(|(idx, line)| parse_quantile_line(line, idx + 1))
        .collect()
}
