//! Error types for structure learning.

use thiserror::Error;

/// Coarse classification of a [`LearnError`] by the stage that raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed dataset, domain or parameters.
    Construction,
    /// Degenerate or unsupported independence test.
    Test,
    /// Internal invariant violated during skeleton search.
    Search,
    /// Separating sets produced an invalid orientation.
    Orientation,
}

/// Errors that can occur while building a dataset or learning a PDAG.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in the future without breaking changes.
///
/// Learning is all-or-nothing: when any stage fails the error is returned to
/// the caller and no partial graph is produced. Test failures name the
/// variables and conditioning set involved so the failing call can be
/// reproduced directly against the oracle.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum LearnError {
    /// Malformed input records (ragged rows, unparsable or non-finite values).
    #[error("format error: {0}")]
    Format(String),

    /// Semantically invalid argument (too few rows, cardinality too high, bad alpha).
    #[error("invalid value: {0}")]
    Value(String),

    /// Option supplied with the wrong value type.
    #[error("type error: {0}")]
    Type(String),

    /// A statistics query named a variable absent from the dataset.
    #[error("unknown variable '{0}'")]
    InvalidVariable(String),

    /// A statistics query named the same variable twice.
    #[error("variable '{0}' requested more than once")]
    DuplicateVariable(String),

    /// The covariance slice for a Gaussian test is (near-)singular, or the
    /// conditioning set leaves no residual degrees of freedom.
    #[error("singular conditioning set testing {x} _|_ {y} | {{{}}}: {reason}", .conditioning.join(", "))]
    SingularConditioning {
        x: String,
        y: String,
        conditioning: Vec<String>,
        reason: String,
    },

    /// A stratum of a categorical test has too few observations and the
    /// sparse-stratum policy rejects such tests.
    #[error(
        "insufficient support testing {x} _|_ {y} | {{{}}}: stratum has {stratum_size} rows, minimum is {minimum}",
        .conditioning.join(", ")
    )]
    InsufficientSupport {
        x: String,
        y: String,
        conditioning: Vec<String>,
        stratum_size: u64,
        minimum: usize,
    },

    /// Collider orientation produced a directed cycle.
    #[error("inconsistent orientation: directed cycle {}", .cycle.join(" -> "))]
    InconsistentOrientation { cycle: Vec<String> },

    /// Numerical failure (invalid distribution parameters, NaN statistics).
    #[error("numerical error: {0}")]
    Numerical(String),

    /// Internal invariant violation (programmer error, not user error).
    #[error("internal error: {0}")]
    Internal(String),
}

impl LearnError {
    /// Returns the stage category this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            LearnError::Format(_)
            | LearnError::Value(_)
            | LearnError::Type(_)
            | LearnError::InvalidVariable(_)
            | LearnError::DuplicateVariable(_) => ErrorCategory::Construction,
            LearnError::SingularConditioning { .. }
            | LearnError::InsufficientSupport { .. }
            | LearnError::Numerical(_) => ErrorCategory::Test,
            LearnError::InconsistentOrientation { .. } => ErrorCategory::Orientation,
            LearnError::Internal(_) => ErrorCategory::Search,
        }
    }
}
