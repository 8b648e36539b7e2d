//! Storage errors for export reading and snapshot caching.

use super::error_code::{self, ModelwatchErrorCode};
use super::FrameError;

/// Errors raised by readers and the snapshot cache.
/// I/O failures keep the underlying error as their source and are never retried.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no export matching {name} in {directory}")]
    NotFound { directory: String, name: String },

    #[error("invalid records in {path}: {message}")]
    InvalidRecord { path: String, message: String },

    #[error("serialization failed for {path}: {message}")]
    Serialization { path: String, message: String },

    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl StorageError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<polars::prelude::PolarsError> for StorageError {
    fn from(error: polars::prelude::PolarsError) -> Self {
        Self::Frame(FrameError::from(error))
    }
}

impl ModelwatchErrorCode for StorageError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Io { .. } => error_code::STORAGE_ERROR,
            Self::NotFound { .. } => error_code::SOURCE_NOT_FOUND,
            Self::InvalidRecord { .. } | Self::Serialization { .. } => {
                error_code::SERIALIZATION_ERROR
            }
            Self::Frame(e) => e.error_code(),
        }
    }
}
