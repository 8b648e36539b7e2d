//! Table handles on top of polars.
//!
//! A [`TableFrame`] is either a materialized `DataFrame` or a deferred
//! `LazyFrame`, tagged with the name of the table it holds so errors can say
//! which table was involved. Both polars types implement [`TableHandle`].
//!
//! The expression helpers cover what polars does not ship directly: a
//! zero-safe division, a response-weighted mean, and the per-model
//! "last time this counter changed" window.

mod exprs;
mod handle;
mod values;

pub use exprs::{
    categorical, last_change, null_of, referenced_columns, safe_div, timestamp_type,
    weighted_mean,
};
pub use handle::{TableFrame, TableHandle};
pub use values::{f64_values, i64_values, scalar_f64, scalar_i64, text_values};

/// Result alias for table operations.
pub type FrameResult<T> = Result<T, crate::errors::FrameError>;
