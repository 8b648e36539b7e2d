//! Ingestion configuration.

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::types::EvaluationStrategy;

/// Configuration for the ingestion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct IngestConfig {
    /// Evaluation strategy. Default: eager.
    pub strategy: Option<EvaluationStrategy>,
    /// Keep only resolved canonical columns. Default: true.
    pub subset: Option<bool>,
    /// Extra columns to import on top of the defaults.
    pub include_columns: Vec<String>,
    /// Columns never to import.
    pub drop_columns: Vec<String>,
    /// Context keys. Default: Channel, Direction, Issue, Group.
    pub context_keys: Vec<String>,
    /// Expand the structured payload embedded in the model name. Default: false.
    pub extract_keys: Option<bool>,
    /// Derive PredictorCategory with the default rule. Default: true.
    pub categorize_predictors: Option<bool>,
    /// Timestamp format in chrono strftime syntax.
    pub timestamp_format: Option<String>,
    /// Fail on unparseable timestamps instead of nulling them. Default: true.
    pub strict_timestamps: Option<bool>,
    /// Surface diagnostics as warnings. Default: false.
    pub verbose: Option<bool>,
    /// Columns ignored by missing-column reconciliation. Default: Treatment.
    pub reconcile_exempt: Vec<String>,
    /// Model export file stem. Default: modelData.
    pub model_filename: Option<String>,
    /// Predictor export file stem. Default: predictorData.
    pub predictor_filename: Option<String>,
}

impl IngestConfig {
    pub fn effective_strategy(&self) -> EvaluationStrategy {
        self.strategy.unwrap_or_default()
    }

    pub fn effective_subset(&self) -> bool {
        self.subset.unwrap_or(true)
    }

    pub fn effective_context_keys(&self) -> Vec<String> {
        if self.context_keys.is_empty() {
            to_owned(constants::DEFAULT_CONTEXT_KEYS)
        } else {
            self.context_keys.clone()
        }
    }

    pub fn effective_extract_keys(&self) -> bool {
        self.extract_keys.unwrap_or(false)
    }

    pub fn effective_categorize_predictors(&self) -> bool {
        self.categorize_predictors.unwrap_or(true)
    }

    pub fn effective_timestamp_format(&self) -> String {
        self.timestamp_format
            .clone()
            .unwrap_or_else(|| constants::DEFAULT_TIMESTAMP_FORMAT.to_string())
    }

    pub fn effective_strict_timestamps(&self) -> bool {
        self.strict_timestamps.unwrap_or(true)
    }

    pub fn effective_verbose(&self) -> bool {
        self.verbose.unwrap_or(false)
    }

    pub fn effective_reconcile_exempt(&self) -> Vec<String> {
        if self.reconcile_exempt.is_empty() {
            to_owned(constants::DEFAULT_RECONCILE_EXEMPT)
        } else {
            self.reconcile_exempt.clone()
        }
    }

    pub fn effective_model_filename(&self) -> String {
        self.model_filename
            .clone()
            .unwrap_or_else(|| constants::DEFAULT_MODEL_FILENAME.to_string())
    }

    pub fn effective_predictor_filename(&self) -> String {
        self.predictor_filename
            .clone()
            .unwrap_or_else(|| constants::DEFAULT_PREDICTOR_FILENAME.to_string())
    }
}

fn to_owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
