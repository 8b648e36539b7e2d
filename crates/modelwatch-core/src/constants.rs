//! Shared constants for the Modelwatch datamart.

/// Modelwatch version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ---- Canonical column names ----

pub const MODEL_ID: &str = "ModelID";
pub const NAME: &str = "Name";
pub const ISSUE: &str = "Issue";
pub const GROUP: &str = "Group";
pub const CHANNEL: &str = "Channel";
pub const DIRECTION: &str = "Direction";
pub const TREATMENT: &str = "Treatment";
pub const CONFIGURATION: &str = "Configuration";
pub const POSITIVES: &str = "Positives";
pub const RESPONSE_COUNT: &str = "ResponseCount";
pub const PERFORMANCE: &str = "Performance";
pub const SNAPSHOT_TIME: &str = "SnapshotTime";
pub const PREDICTOR_NAME: &str = "PredictorName";
pub const PREDICTOR_CATEGORY: &str = "PredictorCategory";
pub const ENTRY_TYPE: &str = "EntryType";
pub const BIN_SYMBOL: &str = "BinSymbol";
pub const BIN_INDEX: &str = "BinIndex";
pub const BIN_TYPE: &str = "BinType";
pub const BIN_POSITIVES: &str = "BinPositives";
pub const BIN_NEGATIVES: &str = "BinNegatives";
pub const BIN_RESPONSE_COUNT: &str = "BinResponseCount";
pub const TYPE: &str = "Type";
pub const CONTENTS: &str = "Contents";

// ---- Derived column names ----

pub const SUCCESS_RATE: &str = "SuccessRate";
pub const LAST_POSITIVES: &str = "Last_Positives";
pub const LAST_RESPONSE_COUNT: &str = "Last_ResponseCount";
pub const BIN_PROPENSITY: &str = "BinPropensity";
pub const BIN_ADJUSTED_PROPENSITY: &str = "BinAdjustedPropensity";

/// Canonical columns expected in either export, already in canonical spelling.
pub const DEFAULT_COLUMNS: &[&str] = &[
    MODEL_ID,
    ISSUE,
    GROUP,
    CHANNEL,
    DIRECTION,
    NAME,
    TREATMENT,
    POSITIVES,
    CONFIGURATION,
    RESPONSE_COUNT,
    SNAPSHOT_TIME,
    PREDICTOR_NAME,
    PREDICTOR_CATEGORY,
    PERFORMANCE,
    ENTRY_TYPE,
    BIN_SYMBOL,
    BIN_INDEX,
    BIN_TYPE,
    BIN_POSITIVES,
    BIN_NEGATIVES,
    BIN_RESPONSE_COUNT,
    TYPE,
    CONTENTS,
];

/// Additional export fields whose canonical spelling is known even though
/// they are not imported by default.
pub const KNOWN_EXTRA_COLUMNS: &[&str] = &[
    "Negatives",
    "Modeldata",
    "ModelVersion",
    "ModelType",
    "ModelClass",
    "AppliesToClass",
    "FactoryUpdateTime",
    "FeatureImportance",
    "ActivePredictors",
    "TotalPredictors",
    "TotalBins",
    "RelativePositives",
    "RelativeNegatives",
    "RelativeBinPositives",
    "RelativeBinNegatives",
    "BinLowerBound",
    "BinUpperBound",
    "Lift",
    "ZRatio",
    "GroupIndex",
    "ObjClass",
    "InsKey",
];

/// Export-internal prefixes stripped before comparing column names.
pub const INTERNAL_PREFIXES: &[&str] = &["px", "py", "pz"];

/// Default context keys used to group and report models.
pub const DEFAULT_CONTEXT_KEYS: &[&str] = &[CHANNEL, DIRECTION, ISSUE, GROUP];

/// Columns recast to categorical by the type normalizer.
pub const CATEGORICAL_COLUMNS: &[&str] = &[ISSUE, GROUP, CHANNEL, DIRECTION, CONFIGURATION];

/// Columns recast to floating point by the type normalizer.
pub const FLOAT_COLUMNS: &[&str] = &[PERFORMANCE];

/// Columns exempt from missing-column reconciliation by default.
pub const DEFAULT_RECONCILE_EXEMPT: &[&str] = &[TREATMENT];

/// Default export timestamp format (chrono strftime syntax).
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.f %Z";

/// Default model export file stem.
pub const DEFAULT_MODEL_FILENAME: &str = "modelData";

/// Default predictor export file stem.
pub const DEFAULT_PREDICTOR_FILENAME: &str = "predictorData";

/// Suffix applied to colliding predictor-side columns in the combined view.
pub const COMBINED_SUFFIX: &str = "Bin";

/// Pseudo-predictor holding the model's classifier bins.
pub const CLASSIFIER_PREDICTOR: &str = "Classifier";

/// Category assigned to predictors without a dotted namespace.
pub const PRIMARY_CATEGORY: &str = "Primary";

// ---- Health thresholds ----

/// Performance of an uninformative model (AUC 0.5).
pub const BASELINE_PERFORMANCE: f64 = 0.5;

/// Positives at or below which a model counts as immature.
pub const MATURITY_POSITIVES: i64 = 200;

/// Pivot fill value for predictors without data in a group.
pub const PIVOT_FILL_PERFORMANCE: f64 = 0.5;

// ---- Snapshot cache ----

pub const CACHE_MODEL_PREFIX: &str = "cached_modelData";
pub const CACHE_PREDICTOR_PREFIX: &str = "cached_predictorData";
pub const CACHE_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3f";
pub const CACHE_EXTENSION: &str = "jsonl";
