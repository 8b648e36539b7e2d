//! Query filter errors.

use super::error_code::{self, ModelwatchErrorCode};
use super::FrameError;

/// Errors raised while applying a query filter to a table.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The query references columns the table does not have.
    #[error("query references columns missing from {table}: {}", columns.join(", "))]
    ColumnNotFound { table: String, columns: Vec<String> },

    #[error("{operation} requires the eager evaluation strategy")]
    NotEager { operation: String },

    #[error("cannot parse query at offset {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("invalid allowed values for column {column}: {message}")]
    InvalidValues { column: String, message: String },

    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl From<polars::prelude::PolarsError> for QueryError {
    fn from(error: polars::prelude::PolarsError) -> Self {
        Self::Frame(FrameError::from(error))
    }
}

impl ModelwatchErrorCode for QueryError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ColumnNotFound { .. } => error_code::COLUMN_NOT_FOUND,
            Self::NotEager { .. } => error_code::NOT_EAGER,
            Self::Parse { .. } => error_code::QUERY_PARSE_ERROR,
            Self::InvalidValues { .. } => error_code::INVALID_QUERY_VALUES,
            Self::Frame(e) => e.error_code(),
        }
    }
}
