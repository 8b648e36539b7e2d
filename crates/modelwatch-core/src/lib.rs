//! # modelwatch-core
//!
//! Foundation crate for the Modelwatch datamart.
//! Defines errors, config, tracing, constants, shared types, and the labelled
//! polars table handle (materialized `DataFrame` / deferred `LazyFrame`) that
//! the storage and datamart crates build on.

pub mod config;
pub mod constants;
pub mod errors;
pub mod frame;
pub mod tracing;
pub mod types;

// Re-export the most commonly used types at the crate root.
pub use config::DatamartConfig;
pub use errors::{ConfigError, DatamartError, FrameError, QueryError, StorageError};
pub use frame::{FrameResult, TableFrame, TableHandle};
pub use types::{initialize_shared_categorical_registry, EvaluationStrategy};
