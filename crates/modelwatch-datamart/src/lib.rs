//! # modelwatch-datamart
//!
//! Ingestion and normalization of model and predictor snapshot exports.
//! Raw tables go through column resolution, type normalization and the shared
//! query filter; the resulting pair feeds the combined view, group summaries,
//! predictor statistics and model health checks. Everything respects one
//! evaluation strategy, eager or deferred, fixed when a [`Datamart`] is built.

pub mod aggregates;
pub mod categorization;
pub mod datamart;
pub mod health;
pub mod ingest;
pub mod keys;
pub mod normalizer;
pub mod query;
pub mod resolver;

pub use aggregates::{
    combine, latest_snapshot, models_by_positives, response_gain, summarize, summary_by_channel,
    top_n, PivotOptions,
};
pub use categorization::{
    DefaultPredictorCategorizer, FnCategorizer, PredictorAttributes, PredictorCategorizer,
};
pub use datamart::{Datamart, SavedSnapshot, TableKind};
pub use health::ModelHealthStats;
pub use ingest::{ingest, Diagnostic, IngestOptions, IngestOutcome, IngestedTable, TableSource};
pub use query::{apply_query, parse_query, Query};
pub use resolver::{canonicalize_name, resolve, Resolution};
