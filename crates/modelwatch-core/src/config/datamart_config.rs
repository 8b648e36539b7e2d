//! Top-level Modelwatch configuration with layered resolution.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{CacheConfig, IngestConfig};
use crate::errors::ConfigError;
use crate::types::EvaluationStrategy;

/// Project config file name looked up in the root directory.
pub const PROJECT_CONFIG_FILE: &str = "modelwatch.toml";

/// Top-level configuration aggregating all sub-configs.
///
/// Resolution order (highest priority first):
/// 1. Environment variables (`MODELWATCH_*`)
/// 2. Project config (`modelwatch.toml` in the root)
/// 3. Compiled defaults
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DatamartConfig {
    pub ingest: IngestConfig,
    pub cache: CacheConfig,
}

impl DatamartConfig {
    /// Load configuration with layered resolution rooted at `root`.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let project_config_path = root.join(PROJECT_CONFIG_FILE);
        if project_config_path.exists() {
            Self::merge_toml_file(&mut config, &project_config_path)?;
        }

        Self::apply_env_overrides(&mut config)?;
        Self::validate(&config)?;

        Ok(config)
    }

    /// Load configuration from a TOML string (for testing).
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str).map_err(|e| ConfigError::ParseError {
            path: "<string>".to_string(),
            message: e.to_string(),
        })?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate the configuration values.
    pub fn validate(config: &DatamartConfig) -> Result<(), ConfigError> {
        if let Some(ref format) = config.ingest.timestamp_format {
            if format.trim().is_empty() {
                return Err(ConfigError::ValidationFailed {
                    field: "ingest.timestamp_format".to_string(),
                    message: "must not be empty".to_string(),
                });
            }
        }
        if config.ingest.context_keys.iter().any(|k| k.trim().is_empty()) {
            return Err(ConfigError::ValidationFailed {
                field: "ingest.context_keys".to_string(),
                message: "context keys must be non-empty names".to_string(),
            });
        }
        if let Some(ref filename) = config.ingest.model_filename {
            if filename.trim().is_empty() {
                return Err(ConfigError::ValidationFailed {
                    field: "ingest.model_filename".to_string(),
                    message: "must not be empty".to_string(),
                });
            }
        }
        if let Some(ref filename) = config.ingest.predictor_filename {
            if filename.trim().is_empty() {
                return Err(ConfigError::ValidationFailed {
                    field: "ingest.predictor_filename".to_string(),
                    message: "must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Merge a TOML file into the existing config.
    fn merge_toml_file(config: &mut DatamartConfig, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;

        let file_config: DatamartConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        Self::merge(config, &file_config);
        Ok(())
    }

    /// Merge `other` into `base`; `other` wins wherever it has a value.
    fn merge(base: &mut DatamartConfig, other: &DatamartConfig) {
        let (b, o) = (&mut base.ingest, &other.ingest);
        if o.strategy.is_some() {
            b.strategy = o.strategy;
        }
        if o.subset.is_some() {
            b.subset = o.subset;
        }
        if !o.include_columns.is_empty() {
            b.include_columns = o.include_columns.clone();
        }
        if !o.drop_columns.is_empty() {
            b.drop_columns = o.drop_columns.clone();
        }
        if !o.context_keys.is_empty() {
            b.context_keys = o.context_keys.clone();
        }
        if o.extract_keys.is_some() {
            b.extract_keys = o.extract_keys;
        }
        if o.categorize_predictors.is_some() {
            b.categorize_predictors = o.categorize_predictors;
        }
        if o.timestamp_format.is_some() {
            b.timestamp_format = o.timestamp_format.clone();
        }
        if o.strict_timestamps.is_some() {
            b.strict_timestamps = o.strict_timestamps;
        }
        if o.verbose.is_some() {
            b.verbose = o.verbose;
        }
        if !o.reconcile_exempt.is_empty() {
            b.reconcile_exempt = o.reconcile_exempt.clone();
        }
        if o.model_filename.is_some() {
            b.model_filename = o.model_filename.clone();
        }
        if o.predictor_filename.is_some() {
            b.predictor_filename = o.predictor_filename.clone();
        }

        if other.cache.directory.is_some() {
            base.cache.directory = other.cache.directory.clone();
        }
    }

    /// Apply `MODELWATCH_*` environment variable overrides.
    fn apply_env_overrides(config: &mut DatamartConfig) -> Result<(), ConfigError> {
        if let Ok(val) = std::env::var("MODELWATCH_STRATEGY") {
            config.ingest.strategy = Some(EvaluationStrategy::from_str(&val)?);
        }
        if let Ok(val) = std::env::var("MODELWATCH_VERBOSE") {
            config.ingest.verbose = Some(parse_bool("MODELWATCH_VERBOSE", &val)?);
        }
        if let Ok(val) = std::env::var("MODELWATCH_TIMESTAMP_FORMAT") {
            config.ingest.timestamp_format = Some(val);
        }
        if let Ok(val) = std::env::var("MODELWATCH_STRICT_TIMESTAMPS") {
            config.ingest.strict_timestamps =
                Some(parse_bool("MODELWATCH_STRICT_TIMESTAMPS", &val)?);
        }
        if let Ok(val) = std::env::var("MODELWATCH_EXTRACT_KEYS") {
            config.ingest.extract_keys = Some(parse_bool("MODELWATCH_EXTRACT_KEYS", &val)?);
        }
        if let Ok(val) = std::env::var("MODELWATCH_CACHE_DIR") {
            config.cache.directory = Some(val.into());
        }
        Ok(())
    }
}

fn parse_bool(field: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("expected a boolean, got '{other}'"),
        }),
    }
}
