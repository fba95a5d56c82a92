//! Conditional-independence test oracle.
//!
//! Two interchangeable strategies sit behind [`IndependenceTest`]:
//!
//! - [`ContingencyTest`] for categorical data: G-test (likelihood ratio,
//!   `mi`) or Pearson chi-square (`x2`) summed over the strata of the
//!   conditioning set. Degrees of freedom are `(|X|-1)(|Y|-1)` per stratum
//!   retained, where cardinalities count values observed in the sample and a
//!   stratum is retained only if it has at least `min_stratum_count` rows.
//! - [`PartialCorrelationTest`] for continuous data: partial correlation of
//!   X and Y given Z from the inverse of the correlation slice, converted to a
//!   Fisher z statistic (`zf`) or the Gaussian likelihood-ratio statistic
//!   `-N ln(1 - r²)` (`mi-g`).
//!
//! Both strategies put `(X, Y)` in id order and sort `Z` before computing, so
//! `test(X, Y, Z)` and `test(Y, X, Z)` return identical outcomes. A test is a
//! pure function of the dataset view, the significance level and its inputs.

use std::fmt;
use std::str::FromStr;

use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};

use crate::engine::dataset::{Dataset, DatasetKind, VarId};
use crate::engine::errors::LearnError;
use crate::engine::statistics::StatisticsEngine;

/// Correlations are clamped to this magnitude before the Fisher transform.
const MAX_ABS_CORRELATION: f64 = 1.0 - 1e-12;

/// Variance below which a variable is treated as constant.
const MIN_VARIANCE: f64 = 1e-12;

/// Determinant of the correlation slice below which it is treated as singular.
const MIN_CORRELATION_DETERMINANT: f64 = 1e-12;

/// Independence test statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CiTestKind {
    /// Categorical G-test (mutual information).
    GTest,
    /// Categorical Pearson chi-square.
    ChiSquare,
    /// Gaussian partial correlation with Fisher z transform.
    FisherZ,
    /// Gaussian likelihood-ratio (mutual information) test.
    GaussianMi,
}

impl CiTestKind {
    /// Default test for a dataset kind.
    pub fn default_for(kind: DatasetKind) -> Self {
        match kind {
            DatasetKind::Categorical => CiTestKind::GTest,
            DatasetKind::Continuous => CiTestKind::FisherZ,
        }
    }

    /// Dataset kind this test applies to.
    pub fn dataset_kind(self) -> DatasetKind {
        match self {
            CiTestKind::GTest | CiTestKind::ChiSquare => DatasetKind::Categorical,
            CiTestKind::FisherZ | CiTestKind::GaussianMi => DatasetKind::Continuous,
        }
    }

    /// Short name, as accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            CiTestKind::GTest => "mi",
            CiTestKind::ChiSquare => "x2",
            CiTestKind::FisherZ => "zf",
            CiTestKind::GaussianMi => "mi-g",
        }
    }
}

impl fmt::Display for CiTestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CiTestKind {
    type Err = LearnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "categorical-default" | "mi" => Ok(CiTestKind::GTest),
            "x2" => Ok(CiTestKind::ChiSquare),
            "gaussian-partial-correlation" | "zf" => Ok(CiTestKind::FisherZ),
            "mi-g" => Ok(CiTestKind::GaussianMi),
            other => Err(LearnError::Value(format!("unknown independence test '{}'", other))),
        }
    }
}

/// Handling of strata below the minimum observed count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SparseStrataPolicy {
    /// Leave the stratum out, reducing the effective degrees of freedom.
    #[default]
    Skip,
    /// Fail the test with [`LearnError::InsufficientSupport`].
    Reject,
}

/// Verdict and statistics of one independence test.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CiOutcome {
    /// `p_value >= alpha`.
    pub independent: bool,
    pub statistic: f64,
    pub p_value: f64,
    pub degrees_of_freedom: usize,
}

/// Oracle configuration fixed for a whole learning run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OracleOptions {
    /// Significance level in (0, 1).
    pub alpha: f64,
    /// Minimum rows for a categorical stratum to contribute.
    pub min_stratum_count: usize,
    pub sparse_strata: SparseStrataPolicy,
}

impl Default for OracleOptions {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            min_stratum_count: 5,
            sparse_strata: SparseStrataPolicy::Skip,
        }
    }
}

/// Capability interface shared by all independence test strategies.
pub trait IndependenceTest: Send + Sync + fmt::Debug {
    /// Tests `x _|_ y | z`. `z` must not contain `x` or `y`.
    fn test(&self, x: VarId, y: VarId, z: &[VarId]) -> Result<CiOutcome, LearnError>;

    fn kind(&self) -> CiTestKind;

    fn alpha(&self) -> f64;

    fn dataset(&self) -> &Dataset;

    /// Called by skeleton search before the tests of conditioning level
    /// `level` run, so strategies can drop state earlier levels needed.
    fn begin_level(&self, _level: usize) -> Result<(), LearnError> {
        Ok(())
    }

    /// Tests variables given by name.
    fn test_named(&self, x: &str, y: &str, z: &[&str]) -> Result<CiOutcome, LearnError> {
        let dataset = self.dataset();
        let x = dataset.var_id(x)?;
        let y = dataset.var_id(y)?;
        let z = dataset.resolve(z)?;
        self.test(x, y, &z)
    }
}

/// Builds the oracle for `kind` over the statistics context.
pub fn oracle<'a>(
    engine: &'a StatisticsEngine<'a>,
    kind: CiTestKind,
    options: OracleOptions,
) -> Result<Box<dyn IndependenceTest + 'a>, LearnError> {
    if !(options.alpha > 0.0 && options.alpha < 1.0) {
        return Err(LearnError::Value(format!(
            "alpha must be in (0, 1), got {}",
            options.alpha
        )));
    }
    let dataset_kind = engine.dataset().kind();
    if kind.dataset_kind() != dataset_kind {
        return Err(LearnError::Value(format!(
            "test '{}' does not apply to {} data",
            kind, dataset_kind
        )));
    }
    Ok(match kind {
        CiTestKind::GTest | CiTestKind::ChiSquare => Box::new(ContingencyTest {
            engine,
            kind,
            options,
        }),
        CiTestKind::FisherZ | CiTestKind::GaussianMi => Box::new(PartialCorrelationTest {
            engine,
            kind,
            alpha: options.alpha,
        }),
    })
}

/// Puts `(x, y)` in id order and returns `z` sorted, after checking that the
/// triple is well formed.
fn canonical_triple(
    dataset: &Dataset,
    x: VarId,
    y: VarId,
    z: &[VarId],
) -> Result<(VarId, VarId, Vec<VarId>), LearnError> {
    dataset.check_id(x)?;
    dataset.check_id(y)?;
    if x == y {
        return Err(LearnError::DuplicateVariable(dataset.name(x).to_string()));
    }
    if let Some(&v) = z.iter().find(|&&v| v == x || v == y) {
        return Err(LearnError::Value(format!(
            "test: conditioning set contains tested variable '{}'",
            dataset.name(v)
        )));
    }
    let mut z = z.to_vec();
    z.sort_unstable();
    if let Some(w) = z.windows(2).find(|w| w[0] == w[1]) {
        return Err(LearnError::DuplicateVariable(dataset.name(w[0]).to_string()));
    }
    for &v in &z {
        dataset.check_id(v)?;
    }
    Ok((x.min(y), x.max(y), z))
}

fn names(dataset: &Dataset, ids: &[VarId]) -> Vec<String> {
    ids.iter().map(|&v| dataset.name(v).to_string()).collect()
}

fn chi_square_sf(statistic: f64, dof: usize) -> Result<f64, LearnError> {
    let dist = ChiSquared::new(dof as f64)
        .map_err(|e| LearnError::Numerical(format!("chi-square with {} dof: {}", dof, e)))?;
    Ok(dist.sf(statistic))
}

/// Stratified G-test / chi-square over contingency tables.
#[derive(Debug)]
pub struct ContingencyTest<'a> {
    engine: &'a StatisticsEngine<'a>,
    kind: CiTestKind,
    options: OracleOptions,
}

impl ContingencyTest<'_> {
    /// Adds one stratum's contribution: `cells[x][k]` with the stratum's
    /// observed Y values as columns.
    fn stratum_statistic(&self, cells: &[Vec<u64>], width: usize) -> f64 {
        let row_sums: Vec<u64> = cells.iter().map(|r| r.iter().sum()).collect();
        let col_sums: Vec<u64> = (0..width)
            .map(|k| cells.iter().map(|r| r[k]).sum())
            .collect();
        let n: u64 = row_sums.iter().sum();
        let n = n as f64;

        let mut statistic = 0.0;
        for (row, &r) in cells.iter().zip(&row_sums) {
            if r == 0 {
                continue;
            }
            for (&observed, &c) in row.iter().zip(&col_sums) {
                if c == 0 {
                    continue;
                }
                let expected = r as f64 * c as f64 / n;
                let observed = observed as f64;
                match self.kind {
                    CiTestKind::ChiSquare => {
                        statistic += (observed - expected).powi(2) / expected;
                    }
                    _ => {
                        if observed > 0.0 {
                            statistic += 2.0 * observed * (observed / expected).ln();
                        }
                    }
                }
            }
        }
        statistic
    }
}

impl IndependenceTest for ContingencyTest<'_> {
    fn test(&self, x: VarId, y: VarId, z: &[VarId]) -> Result<CiOutcome, LearnError> {
        let dataset = self.engine.dataset();
        let (a, b, z) = canonical_triple(dataset, x, y, z)?;

        // Column keys are (z..., b), so sorted columns group strata contiguously.
        let mut variables = Vec::with_capacity(z.len() + 2);
        variables.push(a);
        variables.extend_from_slice(&z);
        variables.push(b);
        let table = self.engine.contingency(&variables)?;

        let rows = table.counts().len();
        let k = z.len();
        let columns = table.columns();

        let mut statistic = 0.0;
        let mut strata_kept = 0usize;
        let mut start = 0usize;
        while start < columns.len() {
            let stratum = &columns[start][..k];
            let mut end = start + 1;
            while end < columns.len() && &columns[end][..k] == stratum {
                end += 1;
            }

            let width = end - start;
            let cells: Vec<Vec<u64>> = (0..rows)
                .map(|row| table.counts()[row][start..end].to_vec())
                .collect();
            let size: u64 = cells.iter().flatten().sum();
            if (size as usize) < self.options.min_stratum_count {
                if self.options.sparse_strata == SparseStrataPolicy::Reject {
                    return Err(LearnError::InsufficientSupport {
                        x: dataset.name(a).to_string(),
                        y: dataset.name(b).to_string(),
                        conditioning: names(dataset, &z),
                        stratum_size: size,
                        minimum: self.options.min_stratum_count,
                    });
                }
            } else {
                statistic += self.stratum_statistic(&cells, width);
                strata_kept += 1;
            }
            start = end;
        }

        let kx = dataset.observed_cardinality(a).saturating_sub(1);
        let ky = dataset.observed_cardinality(b).saturating_sub(1);
        let dof = kx * ky * strata_kept;
        let statistic = statistic.max(0.0);
        if !statistic.is_finite() {
            return Err(LearnError::Numerical(format!(
                "non-finite {} statistic testing {} _|_ {}",
                self.kind,
                dataset.name(a),
                dataset.name(b)
            )));
        }
        if dof == 0 {
            return Ok(CiOutcome {
                independent: true,
                statistic,
                p_value: 1.0,
                degrees_of_freedom: 0,
            });
        }

        let p_value = chi_square_sf(statistic, dof)?;
        Ok(CiOutcome {
            independent: p_value >= self.options.alpha,
            statistic,
            p_value,
            degrees_of_freedom: dof,
        })
    }

    fn kind(&self) -> CiTestKind {
        self.kind
    }

    fn alpha(&self) -> f64 {
        self.options.alpha
    }

    fn dataset(&self) -> &Dataset {
        self.engine.dataset()
    }

    /// Tests at `level` count sets of `level + 2` variables; smaller cached
    /// tables cannot be reused.
    fn begin_level(&self, level: usize) -> Result<(), LearnError> {
        self.engine.retain_joint_counts(level + 2)
    }
}

/// Partial-correlation test over covariance slices.
#[derive(Debug)]
pub struct PartialCorrelationTest<'a> {
    engine: &'a StatisticsEngine<'a>,
    kind: CiTestKind,
    alpha: f64,
}

impl PartialCorrelationTest<'_> {
    /// Partial correlation of `a` and `b` given `z`.
    fn partial_correlation(
        &self,
        a: VarId,
        b: VarId,
        z: &[VarId],
    ) -> Result<f64, LearnError> {
        let dataset = self.engine.dataset();
        let singular = |reason: String| LearnError::SingularConditioning {
            x: dataset.name(a).to_string(),
            y: dataset.name(b).to_string(),
            conditioning: names(dataset, z),
            reason,
        };

        let mut variables = Vec::with_capacity(z.len() + 2);
        variables.push(a);
        variables.push(b);
        variables.extend_from_slice(z);
        let covariance = self.engine.covariance_slice(&variables)?;

        let k = variables.len();
        let mut scale = Vec::with_capacity(k);
        for (i, &v) in variables.iter().enumerate() {
            let var = covariance[(i, i)];
            if var <= MIN_VARIANCE {
                return Err(singular(format!(
                    "variable '{}' has zero variance",
                    dataset.name(v)
                )));
            }
            scale.push(var.sqrt());
        }
        let correlation =
            nalgebra::DMatrix::from_fn(k, k, |i, j| covariance[(i, j)] / (scale[i] * scale[j]));

        let cholesky = correlation
            .cholesky()
            .ok_or_else(|| singular("correlation slice is not positive definite".into()))?;
        let determinant: f64 = cholesky.l_dirty().diagonal().iter().map(|d| d * d).product();
        if determinant < MIN_CORRELATION_DETERMINANT {
            return Err(singular(format!(
                "correlation slice determinant {:.3e} is below {:.0e}",
                determinant, MIN_CORRELATION_DETERMINANT
            )));
        }
        let precision = cholesky.inverse();
        let r = -precision[(0, 1)] / (precision[(0, 0)] * precision[(1, 1)]).sqrt();
        if !r.is_finite() {
            return Err(singular("partial correlation is not finite".into()));
        }
        Ok(r.clamp(-MAX_ABS_CORRELATION, MAX_ABS_CORRELATION))
    }
}

impl IndependenceTest for PartialCorrelationTest<'_> {
    fn test(&self, x: VarId, y: VarId, z: &[VarId]) -> Result<CiOutcome, LearnError> {
        let dataset = self.engine.dataset();
        let (a, b, z) = canonical_triple(dataset, x, y, z)?;

        let n = dataset.sample_size();
        let residual = n as i64 - z.len() as i64 - 3;
        if residual <= 0 {
            return Err(LearnError::SingularConditioning {
                x: dataset.name(a).to_string(),
                y: dataset.name(b).to_string(),
                conditioning: names(dataset, &z),
                reason: format!(
                    "{} conditioning variables leave no degrees of freedom with N = {}",
                    z.len(),
                    n
                ),
            });
        }

        let r = self.partial_correlation(a, b, &z)?;
        let (statistic, p_value, dof) = match self.kind {
            CiTestKind::GaussianMi => {
                let statistic = -(n as f64) * (1.0 - r * r).ln();
                (statistic.max(0.0), chi_square_sf(statistic.max(0.0), 1)?, 1)
            }
            _ => {
                let statistic = (residual as f64).sqrt() * r.atanh();
                let normal = Normal::new(0.0, 1.0)
                    .map_err(|e| LearnError::Numerical(format!("standard normal: {}", e)))?;
                let p_value = (2.0 * normal.sf(statistic.abs())).min(1.0);
                (statistic, p_value, residual as usize)
            }
        };

        Ok(CiOutcome {
            independent: p_value >= self.alpha,
            statistic,
            p_value,
            degrees_of_freedom: dof,
        })
    }

    fn kind(&self) -> CiTestKind {
        self.kind
    }

    fn alpha(&self) -> f64 {
        self.alpha
    }

    fn dataset(&self) -> &Dataset {
        self.engine.dataset()
    }
}
