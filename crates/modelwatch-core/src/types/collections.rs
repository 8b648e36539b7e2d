//! Re-exports of performance-oriented collection types.

pub use rustc_hash::{FxHashMap, FxHashSet};
pub use smallvec::SmallVec;

/// SmallVec sized for group and join keys (context keys default to four).
pub type KeyVec<T> = SmallVec<[T; 4]>;
