//! Tests for the Modelwatch configuration system.

use std::sync::Mutex;

use modelwatch_core::config::DatamartConfig;
use modelwatch_core::errors::ConfigError;
use modelwatch_core::EvaluationStrategy;

/// Global mutex to serialize tests that modify environment variables.
static ENV_MUTEX: Mutex<()> = Mutex::new(());

fn tempdir() -> tempfile::TempDir {
    tempfile::TempDir::new().unwrap()
}

/// Clear all MODELWATCH_ env vars to prevent cross-test contamination.
fn clear_modelwatch_env_vars() {
    for key in [
        "MODELWATCH_STRATEGY",
        "MODELWATCH_VERBOSE",
        "MODELWATCH_TIMESTAMP_FORMAT",
        "MODELWATCH_STRICT_TIMESTAMPS",
        "MODELWATCH_EXTRACT_KEYS",
        "MODELWATCH_CACHE_DIR",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn test_env_overrides_project_file() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_modelwatch_env_vars();

    let dir = tempdir();
    std::fs::write(
        dir.path().join("modelwatch.toml"),
        r#"
[ingest]
strategy = "deferred"
verbose = false
context_keys = ["Channel", "Direction"]

[cache]
directory = "/var/cache/modelwatch"
"#,
    )
    .unwrap();

    std::env::set_var("MODELWATCH_STRATEGY", "eager");
    std::env::set_var("MODELWATCH_VERBOSE", "true");

    let config = DatamartConfig::load(dir.path()).unwrap();
    assert_eq!(config.ingest.effective_strategy(), EvaluationStrategy::Eager);
    assert!(config.ingest.effective_verbose());
    // Untouched by env: project value survives.
    assert_eq!(
        config.ingest.effective_context_keys(),
        vec!["Channel".to_string(), "Direction".to_string()]
    );
    assert_eq!(
        config.cache.effective_directory(),
        std::path::PathBuf::from("/var/cache/modelwatch")
    );

    clear_modelwatch_env_vars();
}

#[test]
fn test_load_without_project_file_uses_defaults() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_modelwatch_env_vars();

    let dir = tempdir();
    let config = DatamartConfig::load(dir.path()).unwrap();

    assert_eq!(config.ingest.effective_strategy(), EvaluationStrategy::Eager);
    assert!(config.ingest.effective_subset());
    assert!(config.ingest.effective_strict_timestamps());
    assert!(!config.ingest.effective_extract_keys());
    assert!(config.ingest.effective_categorize_predictors());
    assert_eq!(
        config.ingest.effective_context_keys(),
        vec!["Channel", "Direction", "Issue", "Group"]
    );
    assert_eq!(config.ingest.effective_reconcile_exempt(), vec!["Treatment"]);
    assert_eq!(config.ingest.effective_model_filename(), "modelData");
    assert_eq!(config.ingest.effective_predictor_filename(), "predictorData");
}

#[test]
fn test_lazy_is_an_alias_for_deferred() {
    let config = DatamartConfig::from_toml("[ingest]\nstrategy = \"lazy\"\n").unwrap();
    assert_eq!(config.ingest.effective_strategy(), EvaluationStrategy::Deferred);
}

#[test]
fn test_invalid_strategy_env_value() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_modelwatch_env_vars();

    std::env::set_var("MODELWATCH_STRATEGY", "sometimes");
    let dir = tempdir();
    let err = DatamartConfig::load(dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "ingest.strategy"));

    clear_modelwatch_env_vars();
}

#[test]
fn test_invalid_toml_is_a_parse_error() {
    let err = DatamartConfig::from_toml("[ingest\nstrategy = ").unwrap_err();
    assert!(matches!(err, ConfigError::ParseError { .. }));
}

#[test]
fn test_empty_timestamp_format_fails_validation() {
    let err = DatamartConfig::from_toml("[ingest]\ntimestamp_format = \"  \"\n").unwrap_err();
    assert!(
        matches!(err, ConfigError::ValidationFailed { ref field, .. } if field == "ingest.timestamp_format")
    );
}

#[test]
fn test_bad_boolean_env_value() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_modelwatch_env_vars();

    std::env::set_var("MODELWATCH_STRICT_TIMESTAMPS", "maybe");
    let dir = tempdir();
    assert!(DatamartConfig::load(dir.path()).is_err());

    clear_modelwatch_env_vars();
}
