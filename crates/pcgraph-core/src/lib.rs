//! # pcgraph Core
//!
//! Constraint-based causal structure learning: conditional-independence
//! testing, PC-stable skeleton search and edge orientation into a PDAG.

#![forbid(unsafe_code)]

pub mod engine;

// Re-export commonly used types
pub use engine::dataset::{Dataset, DatasetKind, VarId, MAX_CATEGORIES};
pub use engine::errors::{ErrorCategory, LearnError};
pub use engine::independence::{
    CiOutcome, CiTestKind, IndependenceTest, OracleOptions, SparseStrataPolicy,
};
pub use engine::learn::learn;
pub use engine::orientation::{apply_propagation_rules, OrientationReport};
pub use engine::params::{LearnParams, OptionValue};
pub use engine::pdag::{Edge, EdgeType, Pdag};
pub use engine::skeleton::{LevelTrace, Skeleton, SkeletonAlgorithm, SkeletonSearch};
pub use engine::statistics::{CacheStats, ContingencyTable, StatisticsEngine};
pub use engine::trace::{SeparatingSetEntry, Trace};
