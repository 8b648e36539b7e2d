//! Table errors.

use polars::prelude::PolarsError;

use super::error_code::{self, ModelwatchErrorCode};

/// Errors raised while building, planning, or executing tables.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("column not found: {column}")]
    ColumnNotFound { column: String },

    #[error("type mismatch in {context}: expected {expected}, got {actual}")]
    TypeMismatch {
        context: String,
        expected: String,
        actual: String,
    },

    /// Values of `column` could not be converted under a strict conversion.
    #[error("cannot convert {count} value(s) in column {column} to {target}")]
    Format {
        column: String,
        count: usize,
        target: String,
    },

    #[error(transparent)]
    Polars(#[from] PolarsError),
}

impl FrameError {
    pub fn column_not_found(column: impl Into<String>) -> Self {
        Self::ColumnNotFound {
            column: column.into(),
        }
    }

    pub fn type_mismatch(
        context: impl Into<String>,
        expected: impl Into<String>,
        actual: impl ToString,
    ) -> Self {
        Self::TypeMismatch {
            context: context.into(),
            expected: expected.into(),
            actual: actual.to_string(),
        }
    }
}

impl ModelwatchErrorCode for FrameError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ColumnNotFound { .. } => error_code::COLUMN_NOT_FOUND,
            Self::TypeMismatch { .. } => error_code::TYPE_MISMATCH,
            Self::Format { .. } => error_code::FORMAT_ERROR,
            Self::Polars(PolarsError::ColumnNotFound(_)) => error_code::COLUMN_NOT_FOUND,
            Self::Polars(_) => error_code::TABLE_ERROR,
        }
    }
}
