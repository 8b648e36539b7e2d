//! Process-wide interning of categorical values.
//!
//! Context-key columns are polars `Categorical`. With the global string cache
//! enabled, every table built in this process maps a category string to the
//! same physical id, so categoricals from independently loaded tables can be
//! compared, joined, and concatenated. The cache is append-only for the life
//! of the process.

use std::sync::Once;

use polars::{enable_string_cache, using_string_cache};

static INIT: Once = Once::new();

/// Enable the shared categorical registry (the polars global string cache).
///
/// Call once at process start; further calls are no-ops. Datamart
/// construction calls it as well.
pub fn initialize_shared_categorical_registry() {
    INIT.call_once(|| {
        tracing::debug!("enabling global categorical string cache");
        enable_string_cache();
    });
}

/// Whether categoricals built now share the process-wide registry.
pub fn categorical_registry_enabled() -> bool {
    using_string_cache()
}
