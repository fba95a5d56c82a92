//! Sufficient statistics for independence testing.
//!
//! - **ContingencyTable**: joint counts of a child variable against the value
//!   combinations of the remaining variables, with one column per combination
//!   actually observed in the sample. The full cross-product of parent domains
//!   is never materialised, so sparse high-arity tables stay proportional to
//!   the number of distinct rows.
//! - **CovarianceMatrix**: sample covariance over every continuous variable,
//!   computed once per dataset view and sliced in O(k²) per request.
//! - **StatisticsEngine**: the run-scoped context that owns both and caches
//!   joint counts per variable set, so tests over the same set in different
//!   roles (`A _|_ B | C`, `A _|_ C | B`) share one pass over the sample. It
//!   is created for one learning run and dropped when the run completes.

use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use nalgebra::DMatrix;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::engine::dataset::{Dataset, DatasetKind, VarId};
use crate::engine::errors::LearnError;

/// Inline capacity for value-combination keys.
const INLINE_COMBO: usize = 8;

/// Codes of the parent variables for one column of a contingency table.
pub type ValueCombo = SmallVec<[u8; INLINE_COMBO]>;

/// Counts of every observed value combination of a variable set.
///
/// Variables are held in id order, so any permutation of the same set maps to
/// one `JointCounts`. Tables for a particular child/parent ordering are
/// derived from it without rescanning the sample.
#[derive(Debug, Clone, PartialEq)]
pub struct JointCounts {
    variables: Vec<VarId>,
    /// Observed combinations (codes in `variables` order), sorted.
    cells: Vec<(ValueCombo, u64)>,
    total: u64,
}

impl JointCounts {
    /// Scans the current sample once. `variables` must be categorical and
    /// distinct; they are sorted by id.
    pub fn count(dataset: &Dataset, variables: &[VarId]) -> Result<Self, LearnError> {
        let mut variables = variables.to_vec();
        variables.sort_unstable();
        let columns = variables
            .iter()
            .map(|&v| {
                dataset.codes(v).ok_or_else(|| {
                    LearnError::Value(format!(
                        "contingency table: variable '{}' is not categorical",
                        dataset.name(v)
                    ))
                })
            })
            .collect::<Result<Vec<Cow<'_, [u8]>>, _>>()?;

        let rows = dataset.sample_size();
        let mut counts: FxHashMap<ValueCombo, u64> = FxHashMap::default();
        let mut key = ValueCombo::with_capacity(variables.len());
        for i in 0..rows {
            key.clear();
            key.extend(columns.iter().map(|col| col[i]));
            match counts.get_mut(&key) {
                Some(n) => *n += 1,
                None => {
                    counts.insert(key.clone(), 1);
                }
            }
        }
        let mut cells: Vec<(ValueCombo, u64)> = counts.into_iter().collect();
        cells.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        Ok(Self {
            variables,
            cells,
            total: rows as u64,
        })
    }

    /// Variables in id order.
    pub fn variables(&self) -> &[VarId] {
        &self.variables
    }

    pub fn cells(&self) -> &[(ValueCombo, u64)] {
        &self.cells
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

/// Joint counts of a child variable against observed parent combinations.
#[derive(Debug, Clone, PartialEq)]
pub struct ContingencyTable {
    variables: Vec<VarId>,
    /// `counts[row][column]`: rows are child codes, columns index `columns`.
    counts: Vec<Vec<u64>>,
    /// Observed parent value combinations, sorted lexicographically.
    columns: Vec<ValueCombo>,
    max_columns: usize,
    total: u64,
}

impl ContingencyTable {
    /// Counts the current sample of `dataset` over `variables`.
    ///
    /// The first variable is the child (table rows); the rest are parents
    /// whose observed value combinations form the columns. Variables must be
    /// valid, distinct and categorical; use [`StatisticsEngine::contingency`]
    /// for a checked, cached entry point.
    pub fn build(dataset: &Dataset, variables: &[VarId]) -> Result<Self, LearnError> {
        let joint = JointCounts::count(dataset, variables)?;
        Self::from_joint(dataset, &joint, variables)
    }

    /// Rearranges `joint` into a table over `variables`, which must be a
    /// permutation of `joint.variables()`.
    pub fn from_joint(
        dataset: &Dataset,
        joint: &JointCounts,
        variables: &[VarId],
    ) -> Result<Self, LearnError> {
        let positions = variables
            .iter()
            .map(|v| {
                joint.variables.iter().position(|u| u == v).ok_or_else(|| {
                    LearnError::Internal(format!(
                        "contingency table: variable '{}' not in joint counts",
                        dataset.name(*v)
                    ))
                })
            })
            .collect::<Result<Vec<usize>, _>>()?;
        let (&child, parents) = positions.split_first().ok_or_else(|| {
            LearnError::Value("contingency table: at least one variable required".into())
        })?;
        if positions.len() != joint.variables.len() {
            return Err(LearnError::Internal(
                "contingency table: variables do not cover joint counts".into(),
            ));
        }

        let rows = dataset.domain(variables[0]).len();
        let max_columns = variables[1..]
            .iter()
            .fold(1usize, |acc, &p| acc.saturating_mul(dataset.domain(p).len()));

        let mut column_of: FxHashMap<ValueCombo, usize> = FxHashMap::default();
        let mut combos: Vec<ValueCombo> = Vec::new();
        let mut by_column: Vec<Vec<u64>> = Vec::new();
        let mut key = ValueCombo::with_capacity(parents.len());
        for (combo, n) in &joint.cells {
            key.clear();
            key.extend(parents.iter().map(|&i| combo[i]));
            let j = match column_of.get(&key) {
                Some(&j) => j,
                None => {
                    let j = combos.len();
                    column_of.insert(key.clone(), j);
                    combos.push(key.clone());
                    by_column.push(vec![0; rows]);
                    j
                }
            };
            by_column[j][combo[child] as usize] += n;
        }

        let mut sorted: Vec<usize> = (0..combos.len()).collect();
        sorted.sort_by(|&a, &b| combos[a].cmp(&combos[b]));

        let mut counts = vec![Vec::with_capacity(sorted.len()); rows];
        let mut columns = Vec::with_capacity(sorted.len());
        for &j in &sorted {
            for (row, &n) in by_column[j].iter().enumerate() {
                counts[row].push(n);
            }
            columns.push(combos[j].clone());
        }

        Ok(Self {
            variables: variables.to_vec(),
            counts,
            columns,
            max_columns,
            total: joint.total,
        })
    }

    /// Variables in table order (child first).
    pub fn variables(&self) -> &[VarId] {
        &self.variables
    }

    /// Count matrix, `counts()[child_code][column]`.
    pub fn counts(&self) -> &[Vec<u64>] {
        &self.counts
    }

    /// Observed parent combinations, one per column.
    pub fn columns(&self) -> &[ValueCombo] {
        &self.columns
    }

    /// Size of the full cross-product of parent domains (saturating).
    pub fn max_columns(&self) -> usize {
        self.max_columns
    }

    /// Total count; equals the sample size.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Child value label for each row.
    pub fn row_labels(&self, dataset: &Dataset) -> Vec<Arc<str>> {
        self.variables
            .first()
            .map(|&child| dataset.domain(child).to_vec())
            .unwrap_or_default()
    }

    /// Parent `(variable, value)` labels for each column.
    pub fn column_labels(&self, dataset: &Dataset) -> Vec<Vec<(Arc<str>, Arc<str>)>> {
        let parents = self.variables.get(1..).unwrap_or(&[]);
        self.columns
            .iter()
            .map(|combo| {
                parents
                    .iter()
                    .zip(combo.iter())
                    .map(|(&p, &code)| {
                        let name = Arc::clone(&dataset.names()[p.index()]);
                        let value = Arc::clone(&dataset.domain(p)[code as usize]);
                        (name, value)
                    })
                    .collect()
            })
            .collect()
    }
}

/// Sample covariance over every variable of a continuous dataset.
#[derive(Debug, Clone)]
pub struct CovarianceMatrix {
    matrix: DMatrix<f64>,
    sample_size: usize,
}

impl CovarianceMatrix {
    /// Computes the unbiased sample covariance of the current sample.
    pub fn compute(dataset: &Dataset) -> Result<Self, LearnError> {
        if dataset.kind() != DatasetKind::Continuous {
            return Err(LearnError::Value(
                "covariance: dataset is not continuous".into(),
            ));
        }
        let p = dataset.num_variables();
        let n = dataset.sample_size();
        let columns = (0..p as u32)
            .map(|j| {
                dataset.values(VarId(j)).ok_or_else(|| {
                    LearnError::Internal(format!("covariance: missing column {}", j))
                })
            })
            .collect::<Result<Vec<Cow<'_, [f64]>>, _>>()?;
        let means: Vec<f64> = columns
            .iter()
            .map(|col| col.iter().sum::<f64>() / n as f64)
            .collect();

        let denom = (n - 1) as f64;
        let mut matrix = DMatrix::zeros(p, p);
        for a in 0..p {
            for b in a..p {
                let (ca, cb) = (&columns[a], &columns[b]);
                let (ma, mb) = (means[a], means[b]);
                let s: f64 = ca
                    .iter()
                    .zip(cb.iter())
                    .map(|(x, y)| (x - ma) * (y - mb))
                    .sum();
                matrix[(a, b)] = s / denom;
                matrix[(b, a)] = s / denom;
            }
        }
        Ok(Self {
            matrix,
            sample_size: n,
        })
    }

    /// Sub-matrix restricted to `variables`, in the given order.
    pub fn slice(&self, variables: &[VarId]) -> DMatrix<f64> {
        let k = variables.len();
        DMatrix::from_fn(k, k, |i, j| {
            self.matrix[(variables[i].index(), variables[j].index())]
        })
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// Full covariance matrix, indexed by [`VarId`].
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }
}

/// Sufficient statistic for one variable subset.
#[derive(Debug, Clone)]
pub enum SufficientStatistics {
    Contingency(ContingencyTable),
    Covariance(DMatrix<f64>),
}

/// Cache counters reported in the execution trace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Run-scoped statistics context over one dataset view.
///
/// Safe to share across worker threads; the cache is guarded by a read-write
/// lock and a racing miss keeps whichever entry was inserted first.
#[derive(Debug)]
pub struct StatisticsEngine<'d> {
    dataset: &'d Dataset,
    covariance: Option<CovarianceMatrix>,
    joint: RwLock<FxHashMap<Vec<VarId>, Arc<JointCounts>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<'d> StatisticsEngine<'d> {
    /// Creates the context. For continuous data the covariance matrix is
    /// computed here, once.
    pub fn new(dataset: &'d Dataset) -> Result<Self, LearnError> {
        let covariance = match dataset.kind() {
            DatasetKind::Continuous => Some(CovarianceMatrix::compute(dataset)?),
            DatasetKind::Categorical => None,
        };
        Ok(Self {
            dataset,
            covariance,
            joint: RwLock::new(FxHashMap::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    pub fn dataset(&self) -> &'d Dataset {
        self.dataset
    }

    /// Sufficient statistic for `variables` in the current sample.
    pub fn statistics(&self, variables: &[VarId]) -> Result<SufficientStatistics, LearnError> {
        match self.dataset.kind() {
            DatasetKind::Categorical => {
                self.contingency(variables).map(SufficientStatistics::Contingency)
            }
            DatasetKind::Continuous => {
                self.covariance_slice(variables).map(SufficientStatistics::Covariance)
            }
        }
    }

    /// Sufficient statistic for variables given by name.
    pub fn statistics_by_name<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> Result<SufficientStatistics, LearnError> {
        let ids = self.dataset.resolve(names)?;
        self.statistics(&ids)
    }

    /// Contingency table for `variables` (child first), derived from the
    /// cached joint counts of the variable set.
    pub fn contingency(&self, variables: &[VarId]) -> Result<ContingencyTable, LearnError> {
        let joint = self.joint_counts(variables)?;
        ContingencyTable::from_joint(self.dataset, &joint, variables)
    }

    /// Joint counts of the set `variables` (order ignored), served from cache.
    pub fn joint_counts(&self, variables: &[VarId]) -> Result<Arc<JointCounts>, LearnError> {
        self.check_variables(variables)?;
        let mut key = variables.to_vec();
        key.sort_unstable();

        let cached = self
            .joint
            .read()
            .map_err(|_| LearnError::Internal("statistics cache lock poisoned".into()))?
            .get(&key)
            .cloned();
        if let Some(joint) = cached {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(joint);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let joint = Arc::new(JointCounts::count(self.dataset, &key)?);
        let mut cache = self
            .joint
            .write()
            .map_err(|_| LearnError::Internal("statistics cache lock poisoned".into()))?;
        Ok(Arc::clone(cache.entry(key).or_insert(joint)))
    }

    /// Evicts cached joint counts over fewer than `min_size` variables.
    ///
    /// Skeleton search calls this between levels: every test of a level
    /// counts sets of the same size, so smaller sets are never requested
    /// again. Hit and miss counters are kept.
    pub fn retain_joint_counts(&self, min_size: usize) -> Result<(), LearnError> {
        let mut cache = self
            .joint
            .write()
            .map_err(|_| LearnError::Internal("statistics cache lock poisoned".into()))?;
        cache.retain(|set, _| set.len() >= min_size);
        Ok(())
    }

    /// Covariance sub-matrix for `variables`.
    pub fn covariance_slice(&self, variables: &[VarId]) -> Result<DMatrix<f64>, LearnError> {
        self.check_variables(variables)?;
        let covariance = self.covariance.as_ref().ok_or_else(|| {
            LearnError::Value("covariance: dataset is not continuous".into())
        })?;
        Ok(covariance.slice(variables))
    }

    pub fn cache_stats(&self) -> CacheStats {
        let entries = self.joint.read().map(|t| t.len()).unwrap_or(0);
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries,
        }
    }

    fn check_variables(&self, variables: &[VarId]) -> Result<(), LearnError> {
        if variables.is_empty() {
            return Err(LearnError::Value(
                "statistics: at least one variable required".into(),
            ));
        }
        for (i, &v) in variables.iter().enumerate() {
            self.dataset.check_id(v)?;
            if variables[..i].contains(&v) {
                return Err(LearnError::DuplicateVariable(self.dataset.name(v).to_string()));
            }
        }
        Ok(())
    }
}
