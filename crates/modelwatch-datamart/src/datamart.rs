//! The `Datamart` facade: one ingested model/predictor pair plus every view
//! derived from it, under a strategy fixed at construction.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use modelwatch_core::constants::{CACHE_MODEL_PREFIX, CACHE_PREDICTOR_PREFIX};
use modelwatch_core::errors::{DatamartError, DatamartResult};
use modelwatch_core::{
    initialize_shared_categorical_registry, DatamartConfig, EvaluationStrategy, TableFrame,
};
use modelwatch_storage::{JsonLinesReader, SnapshotCache, SourceLocator, TableReader};
use polars::prelude::DataFrame;

use crate::aggregates::{self, PivotOptions};
use crate::health::{self, ModelHealthStats};
use crate::ingest::{Diagnostic, IngestOptions, IngestedTable, Ingestor, TableSource};
use crate::query::{apply_query, Query};

const COMBINED_DATA_LABEL: &str = "combined data";

/// Which of the datamart's tables an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    Model,
    Predictor,
    Combined,
}

impl TableKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Model => crate::ingest::MODEL_DATA_LABEL,
            Self::Predictor => crate::ingest::PREDICTOR_DATA_LABEL,
            Self::Combined => COMBINED_DATA_LABEL,
        }
    }
}

/// Files written by [`Datamart::save_data`], sharing one stamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedSnapshot {
    pub stamp: String,
    pub model: Option<PathBuf>,
    pub predictor: Option<PathBuf>,
}

/// Ingested model and predictor tables with their combined view.
///
/// Tables are never mutated: replacing one re-ingests it and recomputes the
/// combined view.
pub struct Datamart {
    options: IngestOptions,
    reader: Arc<dyn TableReader>,
    context_keys: Vec<String>,
    model: Option<IngestedTable>,
    predictor: Option<IngestedTable>,
    combined: Option<TableFrame>,
    diagnostics: Vec<Diagnostic>,
}

impl fmt::Debug for Datamart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Datamart")
            .field("strategy", &self.options.strategy)
            .field("context_keys", &self.context_keys)
            .field("model", &self.model.is_some())
            .field("predictor", &self.predictor.is_some())
            .field("diagnostics", &self.diagnostics.len())
            .finish_non_exhaustive()
    }
}

impl Datamart {
    /// Ingest both tables, reading files as JSON lines.
    pub fn new(
        model: impl Into<TableSource>,
        predictor: impl Into<TableSource>,
        options: IngestOptions,
    ) -> DatamartResult<Self> {
        Self::with_reader(model, predictor, options, Arc::new(JsonLinesReader::new()))
    }

    /// Ingest both tables through `reader`.
    pub fn with_reader(
        model: impl Into<TableSource>,
        predictor: impl Into<TableSource>,
        options: IngestOptions,
        reader: Arc<dyn TableReader>,
    ) -> DatamartResult<Self> {
        initialize_shared_categorical_registry();
        let outcome =
            Ingestor::new(&options, reader.as_ref()).ingest(model.into(), predictor.into())?;
        let mut datamart = Self {
            context_keys: options.context_keys.clone(),
            options,
            reader,
            model: outcome.model,
            predictor: outcome.predictor,
            combined: None,
            diagnostics: outcome.diagnostics,
        };
        datamart.refresh()?;
        tracing::info!(
            strategy = %datamart.strategy(),
            model = datamart.model.is_some(),
            predictor = datamart.predictor.is_some(),
            diagnostics = datamart.diagnostics.len(),
            "datamart ready"
        );
        Ok(datamart)
    }

    /// Read the configured exports from `directory`.
    pub fn from_config(
        directory: &Path,
        config: &DatamartConfig,
        query: Option<Query>,
    ) -> DatamartResult<Self> {
        let options = IngestOptions::from_config(&config.ingest).with_query(query);
        let model = SourceLocator::file(directory, config.ingest.effective_model_filename());
        let predictor =
            SourceLocator::file(directory, config.ingest.effective_predictor_filename());
        Self::new(model, predictor, options)
    }

    /// Load `modelwatch.toml` and the environment for `directory`, then read
    /// its exports.
    pub fn open(directory: &Path, query: Option<Query>) -> DatamartResult<Self> {
        let config = DatamartConfig::load(directory)?;
        Self::from_config(directory, &config, query)
    }

    pub fn strategy(&self) -> EvaluationStrategy {
        self.options.strategy
    }

    /// Context keys present in the model table.
    pub fn context_keys(&self) -> &[String] {
        &self.context_keys
    }

    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn model_data(&self) -> Option<&TableFrame> {
        self.model.as_ref().map(|t| &t.frame)
    }

    pub fn predictor_data(&self) -> Option<&TableFrame> {
        self.predictor.as_ref().map(|t| &t.frame)
    }

    pub fn combined_data(&self) -> Option<&TableFrame> {
        self.combined.as_ref()
    }

    /// The model table with its resolved and missing column sets.
    pub fn model_table(&self) -> Option<&IngestedTable> {
        self.model.as_ref()
    }

    pub fn predictor_table(&self) -> Option<&IngestedTable> {
        self.predictor.as_ref()
    }

    fn table(&self, kind: TableKind) -> DatamartResult<&TableFrame> {
        let frame = match kind {
            TableKind::Model => self.model_data(),
            TableKind::Predictor => self.predictor_data(),
            TableKind::Combined => self.combined_data(),
        };
        frame.ok_or_else(|| DatamartError::MissingTable {
            table: kind.label().to_string(),
        })
    }

    /// Materialize `frame` under eager evaluation.
    fn settle(&self, frame: TableFrame) -> DatamartResult<TableFrame> {
        Ok(frame.settle(self.strategy())?)
    }

    fn require_eager(&self, operation: &str) -> DatamartResult<()> {
        if self.strategy().is_eager() {
            Ok(())
        } else {
            Err(DatamartError::not_eager(operation))
        }
    }

    /// Prune the context keys and rebuild the combined view.
    fn refresh(&mut self) -> DatamartResult<()> {
        if let Some(model) = &self.model {
            let schema = model.frame.schema()?;
            let before = self.options.context_keys.len();
            self.context_keys = self
                .options
                .context_keys
                .iter()
                .filter(|k| schema.contains(k))
                .cloned()
                .collect();
            if self.context_keys.len() < before {
                tracing::debug!(keys = ?self.context_keys, "context keys pruned to model columns");
            }
        }
        self.combined = match (&self.model, &self.predictor) {
            (Some(model), Some(predictor)) => {
                let combined =
                    aggregates::combine(model.frame.clone(), predictor.frame.clone(), true);
                Some(self.settle(combined)?)
            }
            _ => None,
        };
        Ok(())
    }

    /// Rows of the most recent snapshot of `kind`. The combined view already
    /// holds only the latest snapshots.
    pub fn last(&self, kind: TableKind) -> DatamartResult<TableFrame> {
        let frame = self.table(kind)?.clone();
        match kind {
            TableKind::Combined => Ok(frame),
            _ => self.settle(aggregates::latest_snapshot(frame)),
        }
    }

    /// Summary statistics per group, grouped by the context keys unless `by`
    /// is given.
    pub fn summarize(
        &self,
        by: Option<&[String]>,
        query: Option<&Query>,
    ) -> DatamartResult<TableFrame> {
        let model = self.table(TableKind::Model)?.clone();
        let keys = by.unwrap_or(&self.context_keys);
        let summary = aggregates::summarize(model, keys, query, self.strategy())?;
        self.settle(summary)
    }

    pub fn model_health_stats(&self, only_latest: bool) -> DatamartResult<ModelHealthStats> {
        let model = self.table(TableKind::Model)?.clone();
        health::model_health_stats(model, self.context_keys.as_slice(), only_latest)
    }

    /// Health report over the latest snapshot. Every context key gets a
    /// missing-values line, complete ones included.
    pub fn describe_models(&self) -> DatamartResult<String> {
        Ok(self.model_health_stats(true)?.describe(true))
    }

    pub fn predictor_counts(&self, by: &str, query: Option<&Query>) -> DatamartResult<TableFrame> {
        let combined = self.table(TableKind::Combined)?.clone();
        let counts = aggregates::predictor_counts(combined, by, query, self.strategy())?;
        self.settle(counts)
    }

    pub fn predictor_performance_pivot(
        &self,
        options: &PivotOptions,
        query: Option<&Query>,
    ) -> DatamartResult<DataFrame> {
        let combined = self.table(TableKind::Combined)?.clone();
        aggregates::predictor_performance_pivot(combined, options, query, self.strategy())
    }

    /// Per channel and direction summary of the model table, optionally per
    /// period such as `1d`, `1w` or `1mo`.
    pub fn summary_by_channel(&self, by_period: Option<&str>) -> DatamartResult<TableFrame> {
        let model = self.table(TableKind::Model)?.clone();
        self.settle(aggregates::summary_by_channel(model, by_period)?)
    }

    /// Cumulative response gain per `by` group over the model table.
    pub fn response_gain(&self, by: &str) -> DatamartResult<TableFrame> {
        let model = self.table(TableKind::Model)?.clone();
        self.settle(aggregates::response_gain(model, by)?)
    }

    /// Distinct models per positives bin over the latest model snapshot.
    pub fn models_by_positives(&self, by: &str) -> DatamartResult<TableFrame> {
        let model = aggregates::latest_snapshot(self.table(TableKind::Model)?.clone());
        self.settle(aggregates::models_by_positives(model, by)?)
    }

    /// Combined rows of the `n` best predictors, optionally per facet.
    pub fn top_predictors(
        &self,
        n: usize,
        metric: Option<&str>,
        facets: &[String],
    ) -> DatamartResult<TableFrame> {
        let combined = self.table(TableKind::Combined)?.clone();
        self.settle(aggregates::top_n(combined, n, metric, facets)?)
    }

    /// Model rows matching `query`; fails with `EmptyResult` when none do.
    pub fn model_subset(&self, query: &Query) -> DatamartResult<TableFrame> {
        let model = self.table(TableKind::Model)?.clone();
        let subset = apply_query(model, query, self.strategy())?;
        let rows = subset.collect()?;
        if rows.height() == 0 {
            return Err(DatamartError::EmptyResult {
                operation: format!("model subset ({})", query.kind()),
            });
        }
        tracing::debug!(rows = rows.height(), "model subset");
        if self.strategy().is_eager() {
            Ok(TableFrame::materialized(subset.label(), rows))
        } else {
            Ok(subset)
        }
    }

    /// Write both tables to `directory` under one shared stamp.
    pub fn save_data(&self, directory: &Path) -> DatamartResult<SavedSnapshot> {
        self.require_eager("saving data")?;
        let cache = SnapshotCache::new(directory);
        let stamp = SnapshotCache::next_stamp();
        let write = |frame: Option<&TableFrame>, prefix: &str| -> DatamartResult<Option<PathBuf>> {
            frame
                .map(|f| {
                    let df = f.collect()?;
                    Ok(cache.persist_with_stamp(&df, prefix, &stamp)?)
                })
                .transpose()
        };
        let model = write(self.model_data(), CACHE_MODEL_PREFIX)?;
        let predictor = write(self.predictor_data(), CACHE_PREDICTOR_PREFIX)?;
        Ok(SavedSnapshot {
            stamp,
            model,
            predictor,
        })
    }

    /// Write one table to `directory` under `name` and a fresh stamp.
    pub fn persist(&self, kind: TableKind, directory: &Path, name: &str) -> DatamartResult<PathBuf> {
        self.require_eager("persisting a table")?;
        let df = self.table(kind)?.collect()?;
        Ok(modelwatch_storage::persist(&df, directory, name)?)
    }

    /// Re-ingest the model table from `source` and rebuild the combined view.
    /// With a query set, the predictor table is restricted to the new models.
    pub fn replace_model_data(&mut self, source: impl Into<TableSource>) -> DatamartResult<()> {
        let mut ingestor = Ingestor::new(&self.options, self.reader.as_ref());
        let model = ingestor.model_table(source.into(), self.predictor.as_ref())?;
        if let (Some(model), true) = (&model, self.options.query.is_some()) {
            if let Some(predictor) = self.predictor.take() {
                self.predictor = Some(ingestor.restrict_predictor(predictor, model)?);
            }
        }
        let diagnostics = ingestor.into_diagnostics();
        self.diagnostics.extend(diagnostics);
        self.model = model;
        self.refresh()
    }

    /// Re-ingest the predictor table from `source` and rebuild the combined
    /// view.
    pub fn replace_predictor_data(&mut self, source: impl Into<TableSource>) -> DatamartResult<()> {
        let mut ingestor = Ingestor::new(&self.options, self.reader.as_ref());
        let predictor = ingestor.predictor_table(source.into(), self.model.as_ref())?;
        let diagnostics = ingestor.into_diagnostics();
        self.diagnostics.extend(diagnostics);
        self.predictor = predictor;
        self.refresh()
    }
}
