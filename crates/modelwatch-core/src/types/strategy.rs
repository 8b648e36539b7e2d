//! Evaluation strategy: eager (materialized) or deferred (query plan).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// How tables are evaluated. Fixed when a datamart is constructed and consulted
/// by every operation that would otherwise force materialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationStrategy {
    /// Every step executes immediately against materialized data.
    #[default]
    Eager,
    /// Steps compose into a plan that runs only when materialized.
    #[serde(alias = "lazy")]
    Deferred,
}

impl EvaluationStrategy {
    pub fn is_eager(self) -> bool {
        matches!(self, Self::Eager)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Eager => "eager",
            Self::Deferred => "deferred",
        }
    }
}

impl fmt::Display for EvaluationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EvaluationStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eager" => Ok(Self::Eager),
            "deferred" | "lazy" => Ok(Self::Deferred),
            other => Err(ConfigError::InvalidValue {
                field: "ingest.strategy".to_string(),
                message: format!("unknown evaluation strategy '{other}'"),
            }),
        }
    }
}
