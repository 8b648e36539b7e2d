//! # modelwatch-storage
//!
//! Export readers and the snapshot cache for the Modelwatch datamart.
//! Readers turn a [`SourceLocator`] into a raw polars `DataFrame`; the
//! [`SnapshotCache`] writes frames under timestamped names that are never
//! reused.

pub mod cache;
pub mod json_rows;
pub mod reader;

pub use cache::{persist, SnapshotCache};
pub use reader::{JsonLinesReader, SourceLocator, TableReader};
