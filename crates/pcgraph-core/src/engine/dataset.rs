//! # Dataset
//!
//! Immutable tabular sample consumed by the learning core.
//!
//! ## Design
//!
//! - Columns are stored once behind an `Arc` and never mutated. Narrowing the
//!   working sample size, reordering rows or changing the variable processing
//!   order produces a new [`Dataset`] view sharing the same storage, so an
//!   in-flight search never observes a change.
//! - The working sample is the first `sample_size` rows of the view's row
//!   order. Views in storage order hand out borrowed column slices; reordered
//!   views gather the selected rows on access.
//! - Categorical values are stored as `u8` codes `0..k-1` indexing the
//!   variable's domain labels. Continuous values are stored as `f64`.
//! - A dataset is either wholly categorical or wholly continuous
//!   ([`DatasetKind`]); the kind selects the independence test strategy.
//! - Variables are addressed by [`VarId`], the column index at construction.
//!   Ids are stable across views; only the processing order changes.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::engine::errors::LearnError;

/// Default maximum number of distinct values of a categorical variable.
pub const MAX_CATEGORIES: usize = 100;

/// Hard ceiling on categorical cardinality imposed by `u8` value codes.
const CODE_CAPACITY: usize = u8::MAX as usize + 1;

/// Minimum number of rows and of variables in a dataset.
const MIN_ROWS: usize = 2;
const MIN_VARIABLES: usize = 2;

/// A stable identifier for a variable (its column index).
///
/// VarId implements Ord/PartialOrd for stable, deterministic iteration.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VarId(pub u32);

impl VarId {
    /// Column index of this variable.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Type of every variable in a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DatasetKind {
    /// Values are integer codes into a finite domain of labels.
    Categorical,
    /// Values are real numbers.
    Continuous,
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetKind::Categorical => f.write_str("categorical"),
            DatasetKind::Continuous => f.write_str("continuous"),
        }
    }
}

#[derive(Debug)]
enum Columns {
    Categorical {
        domains: Vec<Vec<Arc<str>>>,
        codes: Vec<Vec<u8>>,
    },
    Continuous {
        values: Vec<Vec<f64>>,
    },
}

#[derive(Debug)]
struct Storage {
    names: Vec<Arc<str>>,
    index: FxHashMap<Arc<str>, VarId>,
    rows: usize,
    columns: Columns,
}

/// An immutable, versioned view over tabular observational data.
///
/// Cloning is cheap: storage is reference counted.
#[derive(Debug, Clone)]
pub struct Dataset {
    storage: Arc<Storage>,
    sample_size: usize,
    /// Storage row behind each view row; `None` is storage order.
    rows: Option<Arc<[usize]>>,
    order: Arc<[VarId]>,
    /// Per-variable value counts over the current sample (categorical only).
    value_counts: Arc<[Vec<u64>]>,
}

impl Dataset {
    /// Builds a categorical dataset from column-major value codes.
    ///
    /// `domains[j]` holds the labels of variable `j`; `columns[j][i]` is the
    /// code of row `i`, an index into `domains[j]`.
    pub fn categorical<S: AsRef<str>>(
        names: &[S],
        domains: Vec<Vec<String>>,
        columns: Vec<Vec<u8>>,
    ) -> Result<Self, LearnError> {
        Self::categorical_with_max_categories(names, domains, columns, MAX_CATEGORIES)
    }

    /// Builds a categorical dataset with an explicit cardinality limit.
    pub fn categorical_with_max_categories<S: AsRef<str>>(
        names: &[S],
        domains: Vec<Vec<String>>,
        columns: Vec<Vec<u8>>,
        max_categories: usize,
    ) -> Result<Self, LearnError> {
        if max_categories == 0 || max_categories > CODE_CAPACITY {
            return Err(LearnError::Value(format!(
                "dataset: max_categories must be in 1..={}, got {}",
                CODE_CAPACITY, max_categories
            )));
        }
        let (names, index) = check_names(names)?;
        if domains.len() != names.len() || columns.len() != names.len() {
            return Err(LearnError::Format(format!(
                "dataset: {} names but {} domains and {} columns",
                names.len(),
                domains.len(),
                columns.len()
            )));
        }
        let rows = check_column_lengths(&names, columns.iter().map(Vec::len))?;

        for ((name, domain), column) in names.iter().zip(&domains).zip(&columns) {
            if domain.is_empty() {
                return Err(LearnError::Value(format!(
                    "dataset: variable '{}' has an empty domain",
                    name
                )));
            }
            if domain.len() > max_categories {
                return Err(LearnError::Value(format!(
                    "dataset: variable '{}' has {} categories, maximum is {}",
                    name,
                    domain.len(),
                    max_categories
                )));
            }
            if let Some(bad) = column.iter().find(|&&c| c as usize >= domain.len()) {
                return Err(LearnError::Value(format!(
                    "dataset: variable '{}' has code {} outside its domain of {} values",
                    name,
                    bad,
                    domain.len()
                )));
            }
        }

        let domains: Vec<Vec<Arc<str>>> = domains
            .into_iter()
            .map(|d| d.into_iter().map(Arc::from).collect())
            .collect();
        let storage = Storage {
            names,
            index,
            rows,
            columns: Columns::Categorical {
                domains,
                codes: columns,
            },
        };
        Ok(Self::from_storage(storage))
    }

    /// Builds a continuous dataset from column-major values.
    pub fn continuous<S: AsRef<str>>(
        names: &[S],
        columns: Vec<Vec<f64>>,
    ) -> Result<Self, LearnError> {
        let (names, index) = check_names(names)?;
        if columns.len() != names.len() {
            return Err(LearnError::Format(format!(
                "dataset: {} names but {} columns",
                names.len(),
                columns.len()
            )));
        }
        let rows = check_column_lengths(&names, columns.iter().map(Vec::len))?;
        for (name, column) in names.iter().zip(&columns) {
            if let Some(row) = column.iter().position(|v| !v.is_finite()) {
                return Err(LearnError::Format(format!(
                    "dataset: variable '{}' has non-finite value at row {}",
                    name, row
                )));
            }
        }
        let storage = Storage {
            names,
            index,
            rows,
            columns: Columns::Continuous { values: columns },
        };
        Ok(Self::from_storage(storage))
    }

    /// Builds a dataset from string records (row-major), as produced by a
    /// delimited-text reader.
    ///
    /// Categorical labels are factorised in first-seen order, so the first
    /// label encountered in a column gets code 0. Continuous values are parsed
    /// as `f64`.
    pub fn from_records<H, R, S>(
        kind: DatasetKind,
        header: &[H],
        records: &[R],
    ) -> Result<Self, LearnError>
    where
        H: AsRef<str>,
        R: AsRef<[S]>,
        S: AsRef<str>,
    {
        let width = header.len();
        for (i, record) in records.iter().enumerate() {
            let len = record.as_ref().len();
            if len != width {
                return Err(LearnError::Format(format!(
                    "dataset: record {} has {} fields, header has {}",
                    i, len, width
                )));
            }
        }

        match kind {
            DatasetKind::Categorical => {
                let mut domains: Vec<Vec<String>> = vec![Vec::new(); width];
                let mut lookup: Vec<FxHashMap<String, u8>> = vec![FxHashMap::default(); width];
                let mut columns: Vec<Vec<u8>> = vec![Vec::with_capacity(records.len()); width];
                for record in records {
                    for (j, field) in record.as_ref().iter().enumerate() {
                        let label = field.as_ref().trim();
                        let code = match lookup[j].get(label) {
                            Some(&code) => code,
                            None => {
                                if domains[j].len() >= MAX_CATEGORIES {
                                    return Err(LearnError::Value(format!(
                                        "dataset: variable '{}' has more than {} categories",
                                        header[j].as_ref(),
                                        MAX_CATEGORIES
                                    )));
                                }
                                let code = domains[j].len() as u8;
                                domains[j].push(label.to_string());
                                lookup[j].insert(label.to_string(), code);
                                code
                            }
                        };
                        columns[j].push(code);
                    }
                }
                Self::categorical(header, domains, columns)
            }
            DatasetKind::Continuous => {
                let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(records.len()); width];
                for (i, record) in records.iter().enumerate() {
                    for (j, field) in record.as_ref().iter().enumerate() {
                        let text = field.as_ref().trim();
                        let value: f64 = text.parse().map_err(|_| {
                            LearnError::Format(format!(
                                "dataset: record {} field '{}' is not a number: '{}'",
                                i,
                                header[j].as_ref(),
                                text
                            ))
                        })?;
                        columns[j].push(value);
                    }
                }
                Self::continuous(header, columns)
            }
        }
    }

    fn from_storage(storage: Storage) -> Self {
        let order: Arc<[VarId]> = (0..storage.names.len() as u32).map(VarId).collect();
        let sample_size = storage.rows;
        let value_counts = compute_value_counts(&storage, None, sample_size);
        Self {
            storage: Arc::new(storage),
            sample_size,
            rows: None,
            order,
            value_counts,
        }
    }

    /// Returns a view over the first `n` rows of this view's row order.
    pub fn with_sample_size(&self, n: usize) -> Result<Self, LearnError> {
        if n < MIN_ROWS || n > self.storage.rows {
            return Err(LearnError::Value(format!(
                "dataset: sample size must be in {}..={}, got {}",
                MIN_ROWS, self.storage.rows, n
            )));
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(sample_size = n, total_rows = self.storage.rows, "dataset view resized");

        Ok(Self {
            storage: Arc::clone(&self.storage),
            sample_size: n,
            rows: self.rows.clone(),
            order: Arc::clone(&self.order),
            value_counts: compute_value_counts(&self.storage, self.rows.as_deref(), n),
        })
    }

    /// Returns a view whose row `i` is row `permutation[i]` of this view.
    ///
    /// `permutation` must list every row of the current sample exactly once.
    /// Rows past the sample keep their place, so a later
    /// [`with_sample_size`](Self::with_sample_size) can still widen the view.
    pub fn with_row_order(&self, permutation: &[usize]) -> Result<Self, LearnError> {
        let n = self.sample_size;
        if permutation.len() != n {
            return Err(LearnError::Value(format!(
                "dataset: row order has {} entries, sample has {} rows",
                permutation.len(),
                n
            )));
        }
        let mut seen = vec![false; n];
        for &r in permutation {
            if r >= n || std::mem::replace(&mut seen[r], true) {
                return Err(LearnError::Value(format!(
                    "dataset: row order is not a permutation of 0..{} (entry {})",
                    n, r
                )));
            }
        }

        let current = |i: usize| self.rows.as_ref().map_or(i, |rows| rows[i]);
        let rows: Arc<[usize]> = permutation
            .iter()
            .map(|&r| current(r))
            .chain((n..self.storage.rows).map(current))
            .collect();
        #[cfg(feature = "tracing")]
        tracing::debug!(sample_size = n, "dataset view rows reordered");

        Ok(Self {
            storage: Arc::clone(&self.storage),
            sample_size: n,
            rows: Some(rows),
            order: Arc::clone(&self.order),
            value_counts: Arc::clone(&self.value_counts),
        })
    }

    /// Returns a view processing variables in the given order.
    ///
    /// `order` must name every variable exactly once.
    pub fn with_variable_order<S: AsRef<str>>(&self, order: &[S]) -> Result<Self, LearnError> {
        if order.len() != self.num_variables() {
            return Err(LearnError::Value(format!(
                "dataset: variable order has {} names, dataset has {} variables",
                order.len(),
                self.num_variables()
            )));
        }
        let ids = self.resolve(order)?;
        #[cfg(feature = "tracing")]
        tracing::debug!(
            order = ?order.iter().map(|s| s.as_ref()).collect::<Vec<&str>>(),
            "dataset view reordered"
        );

        Ok(Self {
            storage: Arc::clone(&self.storage),
            sample_size: self.sample_size,
            rows: self.rows.clone(),
            order: ids.into(),
            value_counts: Arc::clone(&self.value_counts),
        })
    }

    /// Resolves names to ids, rejecting unknown and repeated names.
    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<VarId>, LearnError> {
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            let id = self.var_id(name.as_ref())?;
            if ids.contains(&id) {
                return Err(LearnError::DuplicateVariable(name.as_ref().to_string()));
            }
            ids.push(id);
        }
        Ok(ids)
    }

    /// Looks up a variable by name.
    pub fn var_id(&self, name: &str) -> Result<VarId, LearnError> {
        self.storage
            .index
            .get(name)
            .copied()
            .ok_or_else(|| LearnError::InvalidVariable(name.to_string()))
    }

    /// Name of a variable; `"?"` for ids outside the dataset.
    pub fn name(&self, id: VarId) -> &str {
        self.storage
            .names
            .get(id.index())
            .map(|n| &**n)
            .unwrap_or("?")
    }

    /// Shared name table, indexed by [`VarId`].
    pub fn names(&self) -> &[Arc<str>] {
        &self.storage.names
    }

    pub fn kind(&self) -> DatasetKind {
        match self.storage.columns {
            Columns::Categorical { .. } => DatasetKind::Categorical,
            Columns::Continuous { .. } => DatasetKind::Continuous,
        }
    }

    pub fn num_variables(&self) -> usize {
        self.storage.names.len()
    }

    /// Working sample size N.
    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// Number of rows in the underlying storage.
    pub fn total_rows(&self) -> usize {
        self.storage.rows
    }

    /// Variable processing order.
    pub fn variable_order(&self) -> &[VarId] {
        &self.order
    }

    /// Checks that `id` names a variable of this dataset.
    pub fn check_id(&self, id: VarId) -> Result<(), LearnError> {
        if id.index() < self.num_variables() {
            Ok(())
        } else {
            Err(LearnError::InvalidVariable(id.to_string()))
        }
    }

    /// Domain labels of a categorical variable; empty for continuous data.
    pub fn domain(&self, id: VarId) -> &[Arc<str>] {
        match &self.storage.columns {
            Columns::Categorical { domains, .. } => {
                domains.get(id.index()).map(Vec::as_slice).unwrap_or(&[])
            }
            Columns::Continuous { .. } => &[],
        }
    }

    /// Codes of a categorical variable over the current sample, in view
    /// row order.
    pub fn codes(&self, id: VarId) -> Option<Cow<'_, [u8]>> {
        match &self.storage.columns {
            Columns::Categorical { codes, .. } => {
                codes.get(id.index()).map(|c| self.select_rows(c))
            }
            Columns::Continuous { .. } => None,
        }
    }

    /// Values of a continuous variable over the current sample, in view row
    /// order.
    pub fn values(&self, id: VarId) -> Option<Cow<'_, [f64]>> {
        match &self.storage.columns {
            Columns::Continuous { values } => {
                values.get(id.index()).map(|c| self.select_rows(c))
            }
            Columns::Categorical { .. } => None,
        }
    }

    fn select_rows<'a, T: Copy>(&self, column: &'a [T]) -> Cow<'a, [T]> {
        match &self.rows {
            None => Cow::Borrowed(&column[..self.sample_size]),
            Some(rows) => Cow::Owned(
                rows[..self.sample_size]
                    .iter()
                    .map(|&r| column[r])
                    .collect(),
            ),
        }
    }

    /// Counts of each domain value in the current sample, in domain order.
    pub fn value_counts(&self, id: VarId) -> Vec<(Arc<str>, u64)> {
        let domain = self.domain(id);
        match self.value_counts.get(id.index()) {
            Some(counts) => domain.iter().cloned().zip(counts.iter().copied()).collect(),
            None => Vec::new(),
        }
    }

    /// Number of domain values that occur in the current sample.
    pub fn observed_cardinality(&self, id: VarId) -> usize {
        self.value_counts
            .get(id.index())
            .map(|counts| counts.iter().filter(|&&c| c > 0).count())
            .unwrap_or(0)
    }

    /// True when both views share storage and select the same rows and
    /// variable order.
    pub fn same_view(&self, other: &Dataset) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
            && self.sample_size == other.sample_size
            && self.rows == other.rows
            && self.order == other.order
    }
}

fn check_names<S: AsRef<str>>(
    names: &[S],
) -> Result<(Vec<Arc<str>>, FxHashMap<Arc<str>, VarId>), LearnError> {
    if names.len() < MIN_VARIABLES {
        return Err(LearnError::Value(format!(
            "dataset: at least {} variables required, got {}",
            MIN_VARIABLES,
            names.len()
        )));
    }
    if names.len() > u32::MAX as usize {
        return Err(LearnError::Value("dataset: too many variables".into()));
    }
    let mut index = FxHashMap::with_capacity_and_hasher(names.len(), Default::default());
    let mut table = Vec::with_capacity(names.len());
    for (i, name) in names.iter().enumerate() {
        let name: Arc<str> = Arc::from(name.as_ref());
        if name.is_empty() {
            return Err(LearnError::Value(format!("dataset: variable {} has an empty name", i)));
        }
        if index.insert(Arc::clone(&name), VarId(i as u32)).is_some() {
            return Err(LearnError::Value(format!("dataset: duplicate variable name '{}'", name)));
        }
        table.push(name);
    }
    Ok((table, index))
}

fn check_column_lengths(
    names: &[Arc<str>],
    lengths: impl Iterator<Item = usize>,
) -> Result<usize, LearnError> {
    let mut rows = None;
    for (name, len) in names.iter().zip(lengths) {
        match rows {
            None => rows = Some(len),
            Some(expected) if expected != len => {
                return Err(LearnError::Format(format!(
                    "dataset: column '{}' has {} rows, expected {}",
                    name, len, expected
                )));
            }
            Some(_) => {}
        }
    }
    let rows = rows.unwrap_or(0);
    if rows < MIN_ROWS {
        return Err(LearnError::Value(format!(
            "dataset: at least {} rows required, got {}",
            MIN_ROWS, rows
        )));
    }
    Ok(rows)
}

fn compute_value_counts(
    storage: &Storage,
    rows: Option<&[usize]>,
    sample_size: usize,
) -> Arc<[Vec<u64>]> {
    match &storage.columns {
        Columns::Categorical { domains, codes } => domains
            .iter()
            .zip(codes)
            .map(|(domain, column)| {
                let mut counts = vec![0u64; domain.len()];
                match rows {
                    None => column[..sample_size]
                        .iter()
                        .for_each(|&code| counts[code as usize] += 1),
                    Some(rows) => rows[..sample_size]
                        .iter()
                        .for_each(|&r| counts[column[r] as usize] += 1),
                }
                counts
            })
            .collect(),
        Columns::Continuous { .. } => Arc::from(Vec::new()),
    }
}
