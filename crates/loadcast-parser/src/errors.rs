use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("{parser} CSV error: {source}")]
    Csv {
        parser: &'static str,
        #[source]
        source: csv::Error,
    },

    #[error("{parser} header invalid: {message}")]
    InvalidHeader {
        parser: &'static str,
        message: String,
    },

    #[error("{parser} data row {line_index} invalid: {message}")]
    DataRow {
        parser: &'static str,
        line_index: usize,
        message: String,
    },

    #[error("{parser} line {line_index} is not valid JSON: {source}")]
    Json {
        parser: &'static str,
        line_index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("{parser} line {line_index} is missing quantile '{label}'")]
    MissingQuantile {
        parser: &'static str,
        line_index: usize,
        label: &'static str,
    },

    #[error("{parser} validation error: {message}")]
    Validation {
        parser: &'static str,
        message: String,
    },

    #[error("{parser} file did not contain any data rows")]
    EmptyData { parser: &'static str },
}
