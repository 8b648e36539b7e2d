//! Snapshot cache: timestamped, write-once copies of tables.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use modelwatch_core::constants::{CACHE_EXTENSION, CACHE_TIMESTAMP_FORMAT};
use modelwatch_core::errors::StorageError;
use modelwatch_core::cache_span;
use polars::prelude::DataFrame;

use crate::json_rows;

/// Last stamp handed out in this process, in Unix milliseconds.
static LAST_STAMP_MILLIS: AtomicI64 = AtomicI64::new(i64::MIN);

/// Writes frames to `directory` as `{prefix}_{YYYYMMDDThhmmss.mmm}.jsonl`.
///
/// Stamps are strictly increasing within a process and files are opened with
/// `create_new`, so a snapshot never overwrites an earlier one.
#[derive(Debug, Clone)]
pub struct SnapshotCache {
    directory: PathBuf,
}

impl SnapshotCache {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// A fresh millisecond stamp, later than every stamp issued before it.
    pub fn next_stamp() -> String {
        let now = Utc::now().timestamp_millis();
        let step = |last: i64| if now > last { now } else { last + 1 };
        let previous = match LAST_STAMP_MILLIS.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(step(last))
        }) {
            Ok(previous) | Err(previous) => previous,
        };
        let millis = step(previous);
        DateTime::from_timestamp_millis(millis)
            .unwrap_or_else(Utc::now)
            .naive_utc()
            .format(CACHE_TIMESTAMP_FORMAT)
            .to_string()
    }

    /// Write `df` under `prefix` with a fresh stamp.
    pub fn persist(&self, df: &DataFrame, prefix: &str) -> Result<PathBuf, StorageError> {
        self.persist_with_stamp(df, prefix, &Self::next_stamp())
    }

    /// Write `df` under `prefix` with a caller-chosen stamp, so related
    /// frames can share one.
    pub fn persist_with_stamp(
        &self,
        df: &DataFrame,
        prefix: &str,
        stamp: &str,
    ) -> Result<PathBuf, StorageError> {
        let path = self
            .directory
            .join(format!("{prefix}_{stamp}.{CACHE_EXTENSION}"));
        let label = path.display().to_string();
        let _span = cache_span!(label).entered();

        std::fs::create_dir_all(&self.directory)
            .map_err(|e| StorageError::io(self.directory.display().to_string(), e))?;
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| StorageError::io(&label, e))?;
        let mut writer = BufWriter::new(file);
        json_rows::encode(df, &mut writer, &label)?;
        writer.flush().map_err(|e| StorageError::io(&label, e))?;

        tracing::info!(path = %label, rows = df.height(), "persisted snapshot");
        Ok(path)
    }
}

/// Write `df` into `directory` under `name` and a fresh stamp, returning
/// the file written.
pub fn persist(df: &DataFrame, directory: &Path, name: &str) -> Result<PathBuf, StorageError> {
    SnapshotCache::new(directory).persist(df, name)
}
