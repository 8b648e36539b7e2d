//! Snapshot cache configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the snapshot cache.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory receiving cached snapshots. Default: ".".
    pub directory: Option<PathBuf>,
}

impl CacheConfig {
    /// Returns the effective cache directory, defaulting to the working directory.
    pub fn effective_directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}
