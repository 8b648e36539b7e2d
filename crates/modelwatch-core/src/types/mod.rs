//! Shared types for Modelwatch.
//! Evaluation strategy, the process-wide categorical registry, and collections.

pub mod collections;
pub mod interning;
pub mod strategy;

pub use collections::{FxHashMap, FxHashSet, KeyVec};
pub use interning::{categorical_registry_enabled, initialize_shared_categorical_registry};
pub use strategy::EvaluationStrategy;
