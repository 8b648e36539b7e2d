//! Configuration system for Modelwatch.
//! TOML-based, 3-layer resolution: env > project > defaults.

pub mod cache_config;
pub mod datamart_config;
pub mod ingest_config;

pub use cache_config::CacheConfig;
pub use datamart_config::DatamartConfig;
pub use ingest_config::IngestConfig;
