//! Observability for Modelwatch.
//! `tracing` crate with `EnvFilter`, per-crate log levels, operation spans.

pub mod setup;
pub mod spans;

pub use setup::init_tracing;
