//! Learning parameters.

use crate::engine::dataset::DatasetKind;
use crate::engine::errors::LearnError;
use crate::engine::independence::{CiTestKind, OracleOptions, SparseStrataPolicy};
use crate::engine::skeleton::SkeletonAlgorithm;

/// Parameters of one learning run.
#[derive(Debug, Clone, PartialEq)]
pub struct LearnParams {
    /// Significance level in (0, 1). A test with `p >= alpha` removes the edge.
    pub alpha: f64,
    /// Independence test; `None` picks the default for the dataset kind.
    pub test: Option<CiTestKind>,
    /// Largest conditioning set to try; `None` is unbounded.
    pub max_conditioning_set_size: Option<usize>,
    pub algorithm: SkeletonAlgorithm,
    /// Minimum rows for a categorical stratum to contribute.
    pub min_stratum_count: usize,
    pub sparse_strata: SparseStrataPolicy,
    /// Test the pairs of a level concurrently (needs the `parallel` feature).
    pub parallel: bool,
}

impl Default for LearnParams {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            test: None,
            max_conditioning_set_size: None,
            algorithm: SkeletonAlgorithm::PcStable,
            min_stratum_count: 5,
            sparse_strata: SparseStrataPolicy::Skip,
            parallel: true,
        }
    }
}

/// Loosely typed option value, as supplied by a caller's option map.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Float(f64),
    Int(i64),
    Text(String),
}

impl OptionValue {
    fn kind(&self) -> &'static str {
        match self {
            OptionValue::Float(_) => "float",
            OptionValue::Int(_) => "integer",
            OptionValue::Text(_) => "string",
        }
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        OptionValue::Float(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Int(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Text(v.to_string())
    }
}

fn type_error(key: &str, expected: &str, got: &OptionValue) -> LearnError {
    LearnError::Type(format!(
        "option '{}' expects {}, got {}",
        key,
        expected,
        got.kind()
    ))
}

fn non_negative(key: &str, value: &OptionValue) -> Result<usize, LearnError> {
    match value {
        OptionValue::Int(v) => usize::try_from(*v)
            .map_err(|_| LearnError::Value(format!("option '{}' must be >= 0, got {}", key, v))),
        other => Err(type_error(key, "integer", other)),
    }
}

impl LearnParams {
    /// Builds parameters from `(key, value)` pairs over the defaults.
    ///
    /// Keys: `alpha`, `test`, `max_conditioning_set_size`, `algorithm`,
    /// `min_stratum_count`, `sparse_strata` (`skip` or `reject`).
    pub fn from_options<I, K>(options: I) -> Result<Self, LearnError>
    where
        I: IntoIterator<Item = (K, OptionValue)>,
        K: AsRef<str>,
    {
        let mut params = LearnParams::default();
        for (key, value) in options {
            let key = key.as_ref();
            match key {
                "alpha" => match value {
                    OptionValue::Float(v) => params.alpha = v,
                    other => return Err(type_error(key, "float", &other)),
                },
                "test" => match value {
                    OptionValue::Text(s) => params.test = Some(s.parse()?),
                    other => return Err(type_error(key, "string", &other)),
                },
                "max_conditioning_set_size" => {
                    params.max_conditioning_set_size = Some(non_negative(key, &value)?)
                }
                "algorithm" => match value {
                    OptionValue::Text(s) => params.algorithm = s.parse()?,
                    other => return Err(type_error(key, "string", &other)),
                },
                "min_stratum_count" => params.min_stratum_count = non_negative(key, &value)?,
                "sparse_strata" => match value {
                    OptionValue::Text(s) => {
                        params.sparse_strata = match s.as_str() {
                            "skip" => SparseStrataPolicy::Skip,
                            "reject" => SparseStrataPolicy::Reject,
                            other => {
                                return Err(LearnError::Value(format!(
                                    "sparse_strata must be 'skip' or 'reject', got '{}'",
                                    other
                                )))
                            }
                        }
                    }
                    other => return Err(type_error(key, "string", &other)),
                },
                other => {
                    return Err(LearnError::Value(format!("unknown option '{}'", other)));
                }
            }
        }
        params.validate()
    }

    /// Checks ranges; returns the parameters unchanged when valid.
    pub fn validate(self) -> Result<Self, LearnError> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(LearnError::Value(format!(
                "alpha must be in (0, 1), got {}",
                self.alpha
            )));
        }
        Ok(self)
    }

    /// Test to run on a dataset of `kind`.
    pub fn test_for(&self, kind: DatasetKind) -> Result<CiTestKind, LearnError> {
        let test = self.test.unwrap_or_else(|| CiTestKind::default_for(kind));
        if test.dataset_kind() != kind {
            return Err(LearnError::Value(format!(
                "test '{}' does not apply to {} data",
                test, kind
            )));
        }
        Ok(test)
    }

    pub fn oracle_options(&self) -> OracleOptions {
        OracleOptions {
            alpha: self.alpha,
            min_stratum_count: self.min_stratum_count,
            sparse_strata: self.sparse_strata,
        }
    }
}
