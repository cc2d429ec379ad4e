//! Fast hash collections keyed by entity references.

pub use rustc_hash::{FxHashMap, FxHashSet};
