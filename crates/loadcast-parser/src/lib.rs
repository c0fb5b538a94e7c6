pub mod errors;
pub mod quantiles;
pub mod table;

pub use errors::ParserError;
pub use quantiles::{parse_quantile_line, parse_quantile_lines, QuantileRecord, QUANTILE_LABELS};
pub use table::{parse_wide_table, read_wide_table, WideTable, TIMESTAMP_COLUMN};
