//! Ingestion orchestrator.
//!
//! Each table goes through resolve → project → (key extraction) → normalize →
//! query. Once both are loaded, derived columns are added, the predictor
//! table is restricted to surviving models when a query was given, missing
//! columns are reconciled, and under eager evaluation both tables are
//! materialized.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use modelwatch_core::config::IngestConfig;
use modelwatch_core::constants::{
    BIN_ADJUSTED_PROPENSITY, BIN_NEGATIVES, BIN_POSITIVES, BIN_PROPENSITY, BIN_RESPONSE_COUNT,
    LAST_POSITIVES, LAST_RESPONSE_COUNT, MODEL_ID, NAME, POSITIVES, PREDICTOR_CATEGORY,
    RESPONSE_COUNT, SNAPSHOT_TIME, SUCCESS_RATE,
};
use modelwatch_core::errors::{DatamartResult, QueryError};
use modelwatch_core::frame::{last_change, safe_div};
use modelwatch_core::{ingest_span, EvaluationStrategy, TableFrame};
use modelwatch_storage::{SourceLocator, TableReader};
use polars::prelude::*;
use serde::Serialize;

use crate::categorization::{category_expr, DefaultPredictorCategorizer, PredictorCategorizer};
use crate::keys::extract_keys;
use crate::normalizer::{normalize, NormalizeOptions};
use crate::query::{apply_query, Query};
use crate::resolver::{canonicalize_name, resolve, Resolution};

pub const MODEL_DATA_LABEL: &str = "model data";
pub const PREDICTOR_DATA_LABEL: &str = "predictor data";

/// Stable codes of non-fatal ingestion diagnostics.
pub mod codes {
    /// A raw column was dropped because an earlier one had the same name.
    pub const DUPLICATE_COLUMN: &str = "DUPLICATE_COLUMN";
    /// The query referenced columns the table lacks and was not applied.
    pub const QUERY_SKIPPED: &str = "QUERY_SKIPPED";
    /// Expected columns are missing from both tables.
    pub const RECONCILE_MISSING: &str = "RECONCILE_MISSING";
    /// A derived column could not be computed from the available inputs.
    pub const DERIVED_SKIPPED: &str = "DERIVED_SKIPPED";
}

/// Where a table comes from.
#[derive(Clone, Default)]
pub enum TableSource {
    /// Read through the configured [`TableReader`].
    File(SourceLocator),
    Table(DataFrame),
    Frame(LazyFrame),
    #[default]
    Absent,
}

impl fmt::Debug for TableSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(locator) => f.debug_tuple("File").field(locator).finish(),
            Self::Table(df) => f.debug_tuple("Table").field(&df.shape()).finish(),
            Self::Frame(_) => f.write_str("Frame"),
            Self::Absent => f.write_str("Absent"),
        }
    }
}

impl TableSource {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

impl From<DataFrame> for TableSource {
    fn from(df: DataFrame) -> Self {
        Self::Table(df)
    }
}

impl From<LazyFrame> for TableSource {
    fn from(frame: LazyFrame) -> Self {
        Self::Frame(frame)
    }
}

impl From<SourceLocator> for TableSource {
    fn from(locator: SourceLocator) -> Self {
        Self::File(locator)
    }
}

/// Options for one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub strategy: EvaluationStrategy,
    /// Keep only resolved canonical columns.
    pub subset: bool,
    pub include_columns: Vec<String>,
    pub drop_columns: Vec<String>,
    pub context_keys: Vec<String>,
    pub extract_keys: bool,
    /// Rule deriving `PredictorCategory`; `None` passes the column through.
    pub categorizer: Option<Arc<dyn PredictorCategorizer>>,
    pub timestamp_format: String,
    pub strict_timestamps: bool,
    pub verbose: bool,
    pub reconcile_exempt: Vec<String>,
    /// Filter applied to both tables.
    pub query: Option<Query>,
}

impl IngestOptions {
    pub fn from_config(config: &IngestConfig) -> Self {
        let categorizer: Option<Arc<dyn PredictorCategorizer>> =
            if config.effective_categorize_predictors() {
                Some(Arc::new(DefaultPredictorCategorizer))
            } else {
                None
            };
        Self {
            strategy: config.effective_strategy(),
            subset: config.effective_subset(),
            include_columns: config.include_columns.clone(),
            drop_columns: config.drop_columns.clone(),
            context_keys: config.effective_context_keys(),
            extract_keys: config.effective_extract_keys(),
            categorizer,
            timestamp_format: config.effective_timestamp_format(),
            strict_timestamps: config.effective_strict_timestamps(),
            verbose: config.effective_verbose(),
            reconcile_exempt: config.effective_reconcile_exempt(),
            query: None,
        }
    }

    pub fn with_strategy(mut self, strategy: EvaluationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_query(mut self, query: impl Into<Option<Query>>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_categorizer(mut self, categorizer: Option<Arc<dyn PredictorCategorizer>>) -> Self {
        self.categorizer = categorizer;
        self
    }

    fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            timestamp_format: self.timestamp_format.clone(),
            strict: self.strict_timestamps,
        }
    }
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self::from_config(&IngestConfig::default())
    }
}

/// A non-fatal finding made during ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub code: &'static str,
    pub table: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.table, self.message)
    }
}

/// One ingested table with its column bookkeeping.
#[derive(Debug, Clone)]
pub struct IngestedTable {
    pub frame: TableFrame,
    /// Expected canonical columns the source provided.
    pub renamed: BTreeSet<String>,
    /// Expected canonical columns the source lacked.
    pub missing: BTreeSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct IngestOutcome {
    pub model: Option<IngestedTable>,
    pub predictor: Option<IngestedTable>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Ingest both tables.
pub fn ingest(
    model: TableSource,
    predictor: TableSource,
    options: &IngestOptions,
    reader: &dyn TableReader,
) -> DatamartResult<IngestOutcome> {
    Ingestor::new(options, reader).ingest(model, predictor)
}

/// Drives ingestion and collects diagnostics.
pub struct Ingestor<'a> {
    options: &'a IngestOptions,
    reader: &'a dyn TableReader,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Ingestor<'a> {
    pub fn new(options: &'a IngestOptions, reader: &'a dyn TableReader) -> Self {
        Self {
            options,
            reader,
            diagnostics: Vec::new(),
        }
    }

    pub fn ingest(
        mut self,
        model: TableSource,
        predictor: TableSource,
    ) -> DatamartResult<IngestOutcome> {
        let model = self.load(model, MODEL_DATA_LABEL, self.options.extract_keys)?;
        let predictor = self.load(predictor, PREDICTOR_DATA_LABEL, false)?;

        let model = model.map(|t| self.with_model_columns(t)).transpose()?;
        let mut predictor = predictor.map(|t| self.with_predictor_columns(t)).transpose()?;

        if let (Some(model), Some(predictor)) = (&model, &mut predictor) {
            if self.options.query.is_some() {
                self.restrict_to_models(predictor, model)?;
            }
            self.reconcile(model, predictor)?;
        }

        Ok(IngestOutcome {
            model: model.map(|t| self.finalize(t)).transpose()?,
            predictor: predictor.map(|t| self.finalize(t)).transpose()?,
            diagnostics: self.diagnostics,
        })
    }

    /// Ingest only the model table, e.g. to replace it. `predictor` is the
    /// table it will be combined with, used for reconciliation.
    pub fn model_table(
        &mut self,
        source: TableSource,
        predictor: Option<&IngestedTable>,
    ) -> DatamartResult<Option<IngestedTable>> {
        let Some(loaded) = self.load(source, MODEL_DATA_LABEL, self.options.extract_keys)? else {
            return Ok(None);
        };
        let model = self.with_model_columns(loaded)?;
        if let Some(predictor) = predictor {
            self.reconcile(&model, predictor)?;
        }
        self.finalize(model).map(Some)
    }

    /// Ingest only the predictor table, e.g. to replace it. With a query set,
    /// rows are restricted to the models of `model`.
    pub fn predictor_table(
        &mut self,
        source: TableSource,
        model: Option<&IngestedTable>,
    ) -> DatamartResult<Option<IngestedTable>> {
        let Some(loaded) = self.load(source, PREDICTOR_DATA_LABEL, false)? else {
            return Ok(None);
        };
        let mut predictor = self.with_predictor_columns(loaded)?;
        if let Some(model) = model {
            if self.options.query.is_some() {
                self.restrict_to_models(&mut predictor, model)?;
            }
            self.reconcile(model, &predictor)?;
        }
        self.finalize(predictor).map(Some)
    }

    /// Restrict an already ingested predictor table to the models of `model`,
    /// e.g. after the model table was replaced under a query.
    pub fn restrict_predictor(
        &mut self,
        mut predictor: IngestedTable,
        model: &IngestedTable,
    ) -> DatamartResult<IngestedTable> {
        self.restrict_to_models(&mut predictor, model)?;
        self.finalize(predictor)
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    fn diagnose(&mut self, code: &'static str, table: &str, message: String) {
        if self.options.verbose {
            tracing::warn!(code, table, "{message}");
        } else {
            tracing::debug!(code, table, "{message}");
        }
        self.diagnostics.push(Diagnostic {
            code,
            table: table.to_string(),
            message,
        });
    }

    fn resolve(&self, schema: &Schema) -> Resolution {
        resolve(
            schema,
            self.options.include_columns.as_slice(),
            self.options.drop_columns.as_slice(),
        )
    }

    fn load(
        &mut self,
        source: TableSource,
        label: &str,
        extract: bool,
    ) -> DatamartResult<Option<IngestedTable>> {
        let strategy = self.options.strategy;
        let _span = ingest_span!(label, strategy).entered();

        let frame = match source {
            TableSource::Absent => {
                tracing::debug!(table = label, "no source given");
                return Ok(None);
            }
            TableSource::File(locator) => {
                TableFrame::materialized(label, self.reader.read_table(&locator)?)
            }
            TableSource::Table(df) => TableFrame::materialized(label, df),
            TableSource::Frame(lf) => TableFrame::deferred(label, lf),
        };

        let schema = frame.schema()?;
        let mut resolution = self.resolve(&schema);
        for (raw, canonical) in resolution.duplicates.clone() {
            self.diagnose(
                codes::DUPLICATE_COLUMN,
                label,
                format!("column {raw} duplicates {canonical} and was dropped"),
            );
        }
        let mut frame = if resolution.is_identity(self.options.subset, schema.len()) {
            frame
        } else {
            let projection = resolution.projection(self.options.subset);
            frame.map(|lf| lf.select(projection))
        };

        if extract {
            frame = extract_keys(frame, NAME, strategy)?;
            let expanded = frame.schema()?;
            let mut renamed = false;
            let projection: Vec<Expr> = expanded
                .iter_names()
                .map(|name| {
                    let canonical = canonicalize_name(name);
                    if canonical != name.as_str() && !expanded.contains(&canonical) {
                        renamed = true;
                        col(name.as_str()).alias(canonical)
                    } else {
                        col(name.as_str())
                    }
                })
                .collect();
            if renamed {
                frame = frame.map(|lf| lf.select(projection));
            }
            resolution = self.resolve(&*frame.schema()?);
        }

        frame = normalize(frame, &self.options.normalize_options(), strategy)?;

        if let Some(query) = &self.options.query {
            match apply_query(frame.clone(), query, strategy) {
                Ok(filtered) => frame = filtered,
                Err(QueryError::ColumnNotFound { table, columns }) => self.diagnose(
                    codes::QUERY_SKIPPED,
                    &table,
                    format!("query not applied, missing columns: {}", columns.join(", ")),
                ),
                Err(e) => return Err(e.into()),
            }
        }

        tracing::debug!(
            table = label,
            resolved = resolution.resolved.len(),
            missing = resolution.missing.len(),
            "table loaded"
        );
        Ok(Some(IngestedTable {
            frame,
            renamed: resolution.resolved,
            missing: resolution.missing,
        }))
    }

    /// Success rate and the last-change timestamps of the counters.
    fn with_model_columns(&mut self, mut table: IngestedTable) -> DatamartResult<IngestedTable> {
        let schema = table.frame.schema()?;
        let label = table.frame.label().to_string();
        let mut exprs = Vec::new();

        if schema.contains(POSITIVES) && schema.contains(RESPONSE_COUNT) {
            exprs.push(
                when(col(RESPONSE_COUNT).eq(lit(0)))
                    .then(lit(0.0))
                    .otherwise(
                        col(POSITIVES).cast(DataType::Float64)
                            / col(RESPONSE_COUNT).cast(DataType::Float64),
                    )
                    .alias(SUCCESS_RATE),
            );
        } else {
            self.diagnose(
                codes::DERIVED_SKIPPED,
                &label,
                format!("{SUCCESS_RATE} needs {POSITIVES} and {RESPONSE_COUNT}"),
            );
        }

        if schema.contains(MODEL_ID) {
            let counters = [
                (POSITIVES, LAST_POSITIVES),
                (RESPONSE_COUNT, LAST_RESPONSE_COUNT),
            ];
            for (counter, derived) in counters {
                if schema.contains(counter) {
                    exprs.push(last_change(counter, SNAPSHOT_TIME, MODEL_ID).alias(derived));
                }
            }
        }

        if !exprs.is_empty() {
            table.frame = table.frame.map(|lf| lf.with_columns(exprs));
        }
        Ok(table)
    }

    /// Bin response count when absent, both propensities, and the category
    /// unless the export already carries one.
    fn with_predictor_columns(
        &mut self,
        mut table: IngestedTable,
    ) -> DatamartResult<IngestedTable> {
        let label = table.frame.label().to_string();
        let schema = table.frame.schema()?;
        let has = |name: &str| schema.contains(name);

        if !has(BIN_RESPONSE_COUNT) && has(BIN_POSITIVES) && has(BIN_NEGATIVES) {
            table.frame = table.frame.map(|lf| {
                lf.with_column((col(BIN_POSITIVES) + col(BIN_NEGATIVES)).alias(BIN_RESPONSE_COUNT))
            });
        }

        let schema = table.frame.schema()?;
        let mut exprs = Vec::new();
        if schema.contains(BIN_POSITIVES) && schema.contains(BIN_RESPONSE_COUNT) {
            exprs.push(safe_div(col(BIN_POSITIVES), col(BIN_RESPONSE_COUNT)).alias(BIN_PROPENSITY));
            exprs.push(
                ((col(BIN_POSITIVES).cast(DataType::Float64) + lit(0.5))
                    / (col(BIN_RESPONSE_COUNT).cast(DataType::Float64) + lit(1.0)))
                .alias(BIN_ADJUSTED_PROPENSITY),
            );
        } else {
            self.diagnose(
                codes::DERIVED_SKIPPED,
                &label,
                format!("bin propensities need {BIN_POSITIVES} and {BIN_RESPONSE_COUNT}"),
            );
        }
        if let Some(categorizer) = &self.options.categorizer {
            if schema.contains(PREDICTOR_CATEGORY) {
                tracing::debug!(table = %label, "{PREDICTOR_CATEGORY} present in export, kept");
            } else {
                exprs.extend(category_expr(Arc::clone(categorizer), &schema));
            }
        }

        if !exprs.is_empty() {
            table.frame = table.frame.map(|lf| lf.with_columns(exprs));
        }
        Ok(table)
    }

    /// Keep predictor rows whose model survived the model-table filter.
    fn restrict_to_models(
        &mut self,
        predictor: &mut IngestedTable,
        model: &IngestedTable,
    ) -> DatamartResult<()> {
        if !model.frame.has_column(MODEL_ID)? || !predictor.frame.has_column(MODEL_ID)? {
            tracing::debug!("no {MODEL_ID} on both tables, predictor rows not restricted");
            return Ok(());
        }
        let models = model.frame.lazy().select([col(MODEL_ID)]);
        predictor.frame = predictor.frame.clone().map(|lf| {
            lf.join(
                models,
                [col(MODEL_ID)],
                [col(MODEL_ID)],
                JoinArgs::new(JoinType::Semi),
            )
        });
        Ok(())
    }

    /// Report expected columns missing from both tables.
    fn reconcile(
        &mut self,
        model: &IngestedTable,
        predictor: &IngestedTable,
    ) -> DatamartResult<()> {
        let model_schema = model.frame.schema()?;
        let predictor_schema = predictor.frame.schema()?;
        let exempt: BTreeSet<String> = self
            .options
            .reconcile_exempt
            .iter()
            .map(|c| canonicalize_name(c))
            .collect();

        let missing: Vec<&str> = model
            .missing
            .intersection(&predictor.missing)
            .map(String::as_str)
            .filter(|c| {
                !model_schema.contains(c) && !predictor_schema.contains(c) && !exempt.contains(*c)
            })
            .collect();
        if !missing.is_empty() {
            self.diagnose(
                codes::RECONCILE_MISSING,
                &format!("{MODEL_DATA_LABEL}, {PREDICTOR_DATA_LABEL}"),
                format!("missing from both tables: {}", missing.join(", ")),
            );
        }
        Ok(())
    }

    fn finalize(&mut self, mut table: IngestedTable) -> DatamartResult<IngestedTable> {
        if self.options.strategy.is_eager() {
            table.frame = table.frame.materialize()?;
            if let Some(df) = table.frame.as_materialized() {
                tracing::debug!(table = table.frame.label(), rows = df.height(), "materialized");
            }
        }
        Ok(table)
    }
}
