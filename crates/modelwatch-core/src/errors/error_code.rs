//! ModelwatchErrorCode trait for structured diagnostics.

/// Every error enum implements this to provide a stable, machine-readable
/// error code that diagnostics and callers can match on.
pub trait ModelwatchErrorCode {
    /// Returns the error code string (e.g., "NOT_EAGER").
    fn error_code(&self) -> &'static str;

    /// Returns the formatted error string: `[ERROR_CODE] message`.
    fn coded_string(&self) -> String
    where
        Self: std::fmt::Display,
    {
        format!("[{}] {}", self.error_code(), self)
    }
}

pub const COLUMN_NOT_FOUND: &str = "COLUMN_NOT_FOUND";
pub const TABLE_ERROR: &str = "TABLE_ERROR";
pub const TYPE_MISMATCH: &str = "TYPE_MISMATCH";
pub const FORMAT_ERROR: &str = "FORMAT_ERROR";
pub const NOT_EAGER: &str = "NOT_EAGER";
pub const QUERY_PARSE_ERROR: &str = "QUERY_PARSE_ERROR";
pub const INVALID_QUERY_VALUES: &str = "INVALID_QUERY_VALUES";
pub const EMPTY_RESULT: &str = "EMPTY_RESULT";
pub const MISSING_TABLE: &str = "MISSING_TABLE";
pub const MISSING_COLUMNS: &str = "MISSING_COLUMNS";
pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
pub const SERIALIZATION_ERROR: &str = "SERIALIZATION_ERROR";
pub const SOURCE_NOT_FOUND: &str = "SOURCE_NOT_FOUND";
pub const CONFIG_ERROR: &str = "CONFIG_ERROR";
