//! Export readers.

use std::fmt;
use std::path::{Path, PathBuf};

use modelwatch_core::errors::StorageError;
use polars::prelude::DataFrame;

use crate::json_rows;

/// File extensions the JSON-lines reader picks up when searching a directory.
const JSON_EXTENSIONS: &[&str] = &["json", "jsonl", "ndjson"];

/// Where a raw export comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum SourceLocator {
    /// A file in `directory`. `name` is either an exact file name or a stem
    /// to search for.
    File { directory: PathBuf, name: String },
    /// An in-memory buffer; `name` only labels errors.
    Bytes { name: String, data: Vec<u8> },
}

impl SourceLocator {
    pub fn file(directory: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self::File {
            directory: directory.into(),
            name: name.into(),
        }
    }

    pub fn bytes(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self::Bytes {
            name: name.into(),
            data: data.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::File { name, .. } | Self::Bytes { name, .. } => name,
        }
    }
}

impl fmt::Debug for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File { directory, name } => f
                .debug_struct("File")
                .field("directory", directory)
                .field("name", name)
                .finish(),
            Self::Bytes { name, data } => f
                .debug_struct("Bytes")
                .field("name", name)
                .field("len", &data.len())
                .finish(),
        }
    }
}

/// Reads one raw table from a locator.
pub trait TableReader: Send + Sync {
    fn read_table(&self, locator: &SourceLocator) -> Result<DataFrame, StorageError>;
}

/// Reader for JSON-lines exports and snapshot-cache files.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinesReader;

impl JsonLinesReader {
    pub fn new() -> Self {
        Self
    }

    /// Resolve `name` inside `directory`: the exact file if it exists,
    /// otherwise the lexicographically last JSON file whose name contains
    /// `name`. Timestamped export names sort chronologically, so this is the
    /// newest export.
    pub fn resolve_path(directory: &Path, name: &str) -> Result<PathBuf, StorageError> {
        let exact = directory.join(name);
        if exact.is_file() {
            return Ok(exact);
        }
        let entries = std::fs::read_dir(directory)
            .map_err(|e| StorageError::io(directory.display().to_string(), e))?;
        let mut candidates: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| StorageError::io(directory.display().to_string(), e))?
                .path();
            let matches_name = path
                .file_name()
                .and_then(|f| f.to_str())
                .is_some_and(|f| f.contains(name));
            let is_json = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| JSON_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
            if matches_name && is_json && path.is_file() {
                candidates.push(path);
            }
        }
        candidates.sort();
        candidates.pop().ok_or_else(|| StorageError::NotFound {
            directory: directory.display().to_string(),
            name: name.to_string(),
        })
    }
}

impl TableReader for JsonLinesReader {
    fn read_table(&self, locator: &SourceLocator) -> Result<DataFrame, StorageError> {
        match locator {
            SourceLocator::File { directory, name } => {
                let path = Self::resolve_path(directory, name)?;
                let label = path.display().to_string();
                let bytes = std::fs::read(&path).map_err(|e| StorageError::io(&label, e))?;
                let df = json_rows::decode(&bytes, &label)?;
                tracing::debug!(
                    path = %label,
                    rows = df.height(),
                    columns = df.width(),
                    "read export"
                );
                Ok(df)
            }
            SourceLocator::Bytes { name, data } => json_rows::decode(data, name),
        }
    }
}
