//! Span definitions per operation: ingestion, querying, caching.

/// Create an ingestion span for one table.
#[macro_export]
macro_rules! ingest_span {
    ($table:expr, $strategy:expr) => {
        ::tracing::info_span!("modelwatch.ingest", table = %$table, strategy = %$strategy)
    };
}

/// Create a query-filter span.
#[macro_export]
macro_rules! query_span {
    ($table:expr, $kind:expr) => {
        ::tracing::debug_span!("modelwatch.query", table = %$table, kind = %$kind)
    };
}

/// Create a snapshot-cache span.
#[macro_export]
macro_rules! cache_span {
    ($name:expr) => {
        ::tracing::info_span!("modelwatch.cache", name = %$name)
    };
}

/// Span names as constants for programmatic use.
pub mod names {
    pub const INGEST: &str = "modelwatch.ingest";
    pub const QUERY: &str = "modelwatch.query";
    pub const CACHE: &str = "modelwatch.cache";
}
