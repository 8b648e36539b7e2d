//! Datamart-level errors. Aggregates subsystem errors via `From` conversions.

use super::error_code::{self, ModelwatchErrorCode};
use super::{ConfigError, FrameError, QueryError, StorageError};

/// Errors surfaced by ingestion, aggregation, and caching.
#[derive(Debug, thiserror::Error)]
pub enum DatamartError {
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Query error: {0}")]
    Query(QueryError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An eager-only operation was invoked under the deferred strategy.
    #[error("{operation} requires the eager evaluation strategy")]
    NotEager { operation: String },

    /// A model subset came out empty.
    #[error("{operation} matched no models")]
    EmptyResult { operation: String },

    #[error("{table} is not available")]
    MissingTable { table: String },

    #[error("{table} lacks required columns: {}", columns.join(", "))]
    MissingColumns { table: String, columns: Vec<String> },
}

impl DatamartError {
    pub fn not_eager(operation: impl Into<String>) -> Self {
        Self::NotEager {
            operation: operation.into(),
        }
    }

    pub fn is_not_eager(&self) -> bool {
        matches!(self, Self::NotEager { .. })
    }
}

impl From<polars::prelude::PolarsError> for DatamartError {
    fn from(error: polars::prelude::PolarsError) -> Self {
        Self::Frame(FrameError::from(error))
    }
}

impl From<QueryError> for DatamartError {
    fn from(error: QueryError) -> Self {
        match error {
            QueryError::NotEager { operation } => Self::NotEager { operation },
            QueryError::Frame(e) => Self::Frame(e),
            other => Self::Query(other),
        }
    }
}

impl ModelwatchErrorCode for DatamartError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Frame(e) => e.error_code(),
            Self::Query(e) => e.error_code(),
            Self::Storage(e) => e.error_code(),
            Self::Config(e) => e.error_code(),
            Self::NotEager { .. } => error_code::NOT_EAGER,
            Self::EmptyResult { .. } => error_code::EMPTY_RESULT,
            Self::MissingTable { .. } => error_code::MISSING_TABLE,
            Self::MissingColumns { .. } => error_code::MISSING_COLUMNS,
        }
    }
}

pub type DatamartResult<T> = Result<T, DatamartError>;
