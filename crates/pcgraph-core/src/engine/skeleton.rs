//! Skeleton search (PC-stable and SGS).
//!
//! ## Algorithm
//!
//! Starting from the complete undirected graph, level `ℓ = 0, 1, ...` tests
//! every adjacent pair `(X, Y)` against conditioning sets of size `ℓ`:
//!
//! - Each level works on a snapshot of the adjacency taken when the level
//!   starts. Candidate conditioning variables come from the snapshot, and
//!   removals found during the level are applied only after every pair has
//!   been tested. Results therefore do not depend on the order in which pairs
//!   are visited, and pairs within a level can be tested in parallel.
//! - PC-stable draws candidates from the snapshot neighbours of `X` (minus
//!   `Y`), then from those of `Y` (minus `X`), skipping subsets already tried
//!   from `X`'s side. SGS draws from every other variable.
//! - Candidates are ranked by the dataset's processing order and subsets are
//!   enumerated lexicographically. The first subset found independent becomes
//!   the pair's separating set and the edge is removed.
//! - Search stops when no adjacent pair has `ℓ` candidates, or after the
//!   configured maximum level.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::engine::dataset::VarId;
use crate::engine::errors::LearnError;
use crate::engine::independence::IndependenceTest;

/// Candidate conditioning variables for a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SkeletonAlgorithm {
    /// Snapshot neighbours of either endpoint.
    #[default]
    PcStable,
    /// Every other variable.
    Sgs,
}

impl fmt::Display for SkeletonAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkeletonAlgorithm::PcStable => "pc-stable",
            SkeletonAlgorithm::Sgs => "sgs",
        })
    }
}

impl FromStr for SkeletonAlgorithm {
    type Err = LearnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pc-stable" | "pc" => Ok(SkeletonAlgorithm::PcStable),
            "sgs" => Ok(SkeletonAlgorithm::Sgs),
            other => Err(LearnError::Value(format!(
                "unknown skeleton algorithm '{}'",
                other
            ))),
        }
    }
}

/// Separating sets of removed edges, keyed by the id-ordered pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeparatingSets {
    sets: BTreeMap<(VarId, VarId), Vec<VarId>>,
}

impl SeparatingSets {
    fn key(a: VarId, b: VarId) -> (VarId, VarId) {
        (a.min(b), a.max(b))
    }

    /// Records `z` for `(a, b)`. The first set recorded for a pair is kept.
    pub fn insert(&mut self, a: VarId, b: VarId, z: Vec<VarId>) {
        self.sets.entry(Self::key(a, b)).or_insert(z);
    }

    pub fn get(&self, a: VarId, b: VarId) -> Option<&[VarId]> {
        self.sets.get(&Self::key(a, b)).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = ((VarId, VarId), &[VarId])> + '_ {
        self.sets.iter().map(|(&k, v)| (k, v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

/// Per-level search statistics.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LevelTrace {
    /// Conditioning set size.
    pub level: usize,
    /// Adjacent pairs with at least `level` candidates.
    pub pairs_examined: usize,
    pub tests_performed: usize,
    pub edges_removed: usize,
    pub edges_remaining: usize,
    pub elapsed: Duration,
}

/// Undirected skeleton plus the separating set of every removed edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Skeleton {
    adjacency: Vec<BTreeSet<VarId>>,
    separating_sets: SeparatingSets,
    order: Vec<VarId>,
    levels: Vec<LevelTrace>,
}

impl Skeleton {
    /// Complete graph over `n` nodes in id order.
    pub fn complete(n: usize) -> Self {
        let order: Vec<VarId> = (0..n as u32).map(VarId).collect();
        Self::complete_in_order(&order)
    }

    fn complete_in_order(order: &[VarId]) -> Self {
        let n = order.len();
        let adjacency = (0..n)
            .map(|i| {
                (0..n)
                    .filter(|&j| j != i)
                    .map(|j| VarId(j as u32))
                    .collect()
            })
            .collect();
        Self {
            adjacency,
            separating_sets: SeparatingSets::default(),
            order: order.to_vec(),
            levels: Vec::new(),
        }
    }

    /// Removes `a - b` and records `z` as its separating set.
    pub fn remove_edge(&mut self, a: VarId, b: VarId, z: Vec<VarId>) {
        self.unlink(a, b);
        self.separating_sets.insert(a, b, z);
    }

    /// Removes `a - b` without recording a separating set.
    pub(crate) fn unlink(&mut self, a: VarId, b: VarId) {
        if let Some(set) = self.adjacency.get_mut(a.index()) {
            set.remove(&b);
        }
        if let Some(set) = self.adjacency.get_mut(b.index()) {
            set.remove(&a);
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_adjacent(&self, a: VarId, b: VarId) -> bool {
        self.adjacency
            .get(a.index())
            .is_some_and(|set| set.contains(&b))
    }

    pub fn neighbours(&self, v: VarId) -> impl Iterator<Item = VarId> + '_ {
        self.adjacency
            .get(v.index())
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Edges `(a, b)` with `a < b`, in id order.
    pub fn edges(&self) -> impl Iterator<Item = (VarId, VarId)> + '_ {
        self.adjacency.iter().enumerate().flat_map(|(i, set)| {
            let a = VarId(i as u32);
            set.range(a..).filter(move |&&b| b != a).map(move |&b| (a, b))
        })
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(BTreeSet::len).sum::<usize>() / 2
    }

    pub fn separating_set(&self, a: VarId, b: VarId) -> Option<&[VarId]> {
        self.separating_sets.get(a, b)
    }

    pub fn separating_sets(&self) -> &SeparatingSets {
        &self.separating_sets
    }

    /// Processing order the search used.
    pub fn order(&self) -> &[VarId] {
        &self.order
    }

    pub fn levels(&self) -> &[LevelTrace] {
        &self.levels
    }

    pub fn tests_performed(&self) -> usize {
        self.levels.iter().map(|l| l.tests_performed).sum()
    }
}

/// Lexicographic `k`-subsets of `0..n`.
#[derive(Debug)]
struct Combinations {
    n: usize,
    indices: Vec<usize>,
    started: bool,
    done: bool,
}

impl Combinations {
    fn new(n: usize, k: usize) -> Self {
        Self {
            n,
            indices: (0..k).collect(),
            started: false,
            done: k > n,
        }
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.done {
            return None;
        }
        if !self.started {
            self.started = true;
            return Some(self.indices.clone());
        }
        let k = self.indices.len();
        // Rightmost index that can still advance.
        let i = (0..k).rev().find(|&i| self.indices[i] < self.n - k + i);
        match i {
            Some(i) => {
                self.indices[i] += 1;
                for j in i + 1..k {
                    self.indices[j] = self.indices[j - 1] + 1;
                }
                Some(self.indices.clone())
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

/// Outcome of testing one pair at one level.
#[derive(Debug)]
struct PairResult {
    x: VarId,
    y: VarId,
    tests: usize,
    separator: Option<Vec<VarId>>,
}

/// Configured skeleton search over an independence oracle.
pub struct SkeletonSearch<'o> {
    oracle: &'o dyn IndependenceTest,
    algorithm: SkeletonAlgorithm,
    max_level: Option<usize>,
    parallel: bool,
}

impl<'o> SkeletonSearch<'o> {
    pub fn new(oracle: &'o dyn IndependenceTest) -> Self {
        Self {
            oracle,
            algorithm: SkeletonAlgorithm::PcStable,
            max_level: None,
            parallel: true,
        }
    }

    pub fn algorithm(mut self, algorithm: SkeletonAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Largest conditioning set size to try; `None` is unbounded.
    pub fn max_conditioning_set_size(mut self, max: Option<usize>) -> Self {
        self.max_level = max;
        self
    }

    /// Tests the pairs of a level on the rayon pool. Has no effect without
    /// the `parallel` feature.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Runs the search using the dataset's processing order.
    pub fn run(&self) -> Result<Skeleton, LearnError> {
        let dataset = self.oracle.dataset();
        let order = dataset.variable_order().to_vec();
        let n = order.len();
        let mut rank = vec![0usize; n];
        for (r, v) in order.iter().enumerate() {
            rank[v.index()] = r;
        }

        let mut skeleton = Skeleton::complete_in_order(&order);
        let mut level = 0usize;
        loop {
            if self.max_level.is_some_and(|max| level > max) {
                break;
            }
            let started = Instant::now();
            let snapshot = skeleton.adjacency.clone();

            let mut pairs = Vec::new();
            for (i, &x) in order.iter().enumerate() {
                for &y in &order[i + 1..] {
                    if !snapshot[x.index()].contains(&y) {
                        continue;
                    }
                    let enough = match self.algorithm {
                        SkeletonAlgorithm::PcStable => {
                            snapshot[x.index()].len() > level || snapshot[y.index()].len() > level
                        }
                        SkeletonAlgorithm::Sgs => n - 2 >= level,
                    };
                    if enough {
                        pairs.push((x, y));
                    }
                }
            }
            if pairs.is_empty() {
                break;
            }

            self.oracle.begin_level(level)?;
            let results = self.evaluate(&pairs, &snapshot, level, &rank)?;
            let mut tests = 0;
            let mut removed = 0;
            for result in results {
                tests += result.tests;
                if let Some(z) = result.separator {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("removed {} - {} given {:?}", result.x, result.y, z);
                    skeleton.remove_edge(result.x, result.y, z);
                    removed += 1;
                }
            }

            let trace = LevelTrace {
                level,
                pairs_examined: pairs.len(),
                tests_performed: tests,
                edges_removed: removed,
                edges_remaining: skeleton.edge_count(),
                elapsed: started.elapsed(),
            };
            #[cfg(feature = "tracing")]
            tracing::info!(
                "skeleton level {}: {} pairs, {} tests, {} removed, {} remaining",
                trace.level,
                trace.pairs_examined,
                trace.tests_performed,
                trace.edges_removed,
                trace.edges_remaining
            );
            skeleton.levels.push(trace);
            level += 1;
        }
        Ok(skeleton)
    }

    /// Tests every pair of one level against the snapshot. Results come back
    /// in pair order; on failure the error of the earliest failing pair is
    /// returned.
    fn evaluate(
        &self,
        pairs: &[(VarId, VarId)],
        snapshot: &[BTreeSet<VarId>],
        level: usize,
        rank: &[usize],
    ) -> Result<Vec<PairResult>, LearnError> {
        #[cfg(feature = "parallel")]
        if self.parallel {
            let results: Vec<Result<PairResult, LearnError>> = pairs
                .par_iter()
                .map(|&(x, y)| self.test_pair(x, y, snapshot, level, rank))
                .collect();
            return results.into_iter().collect();
        }

        pairs
            .iter()
            .map(|&(x, y)| self.test_pair(x, y, snapshot, level, rank))
            .collect()
    }

    fn test_pair(
        &self,
        x: VarId,
        y: VarId,
        snapshot: &[BTreeSet<VarId>],
        level: usize,
        rank: &[usize],
    ) -> Result<PairResult, LearnError> {
        let ranked = |mut vars: Vec<VarId>| {
            vars.sort_by_key(|v| rank[v.index()]);
            vars
        };
        let sides: Vec<Vec<VarId>> = match self.algorithm {
            SkeletonAlgorithm::PcStable => vec![
                ranked(snapshot[x.index()].iter().copied().filter(|&v| v != y).collect()),
                ranked(snapshot[y.index()].iter().copied().filter(|&v| v != x).collect()),
            ],
            SkeletonAlgorithm::Sgs => vec![ranked(
                (0..rank.len() as u32)
                    .map(VarId)
                    .filter(|&v| v != x && v != y)
                    .collect(),
            )],
        };

        let mut tests = 0;
        for (side_index, candidates) in sides.iter().enumerate() {
            for combo in Combinations::new(candidates.len(), level) {
                let z: Vec<VarId> = combo.iter().map(|&i| candidates[i]).collect();
                // Already tried from X's side.
                if side_index > 0 && z.iter().all(|v| sides[0].contains(v)) {
                    continue;
                }
                tests += 1;
                let outcome = self.oracle.test(x, y, &z)?;
                #[cfg(feature = "tracing")]
                tracing::trace!(
                    "test {} _|_ {} | {:?}: p = {:.4}, independent = {}",
                    x,
                    y,
                    z,
                    outcome.p_value,
                    outcome.independent
                );
                if outcome.independent {
                    return Ok(PairResult {
                        x,
                        y,
                        tests,
                        separator: Some(z),
                    });
                }
            }
        }
        Ok(PairResult {
            x,
            y,
            tests,
            separator: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::dataset::Dataset;
    use crate::engine::independence::{CiOutcome, CiTestKind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Oracle over a fixed list of independences `(x, y, z)`.
    #[derive(Debug)]
    struct ScriptedOracle {
        dataset: Dataset,
        independences: Vec<(u32, u32, Vec<u32>)>,
        calls: AtomicUsize,
        levels_begun: Mutex<Vec<usize>>,
    }

    impl ScriptedOracle {
        fn new(n: usize, independences: Vec<(u32, u32, Vec<u32>)>) -> Self {
            let names: Vec<String> = (0..n).map(|i| format!("V{}", i)).collect();
            let columns = (0..n).map(|i| vec![i as f64, -(i as f64), 1.0]).collect();
            Self {
                dataset: Dataset::continuous(&names, columns).expect("dataset"),
                independences,
                calls: AtomicUsize::new(0),
                levels_begun: Mutex::new(Vec::new()),
            }
        }
    }

    impl IndependenceTest for ScriptedOracle {
        fn test(&self, x: VarId, y: VarId, z: &[VarId]) -> Result<CiOutcome, LearnError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let (a, b) = (x.0.min(y.0), x.0.max(y.0));
            let mut z: Vec<u32> = z.iter().map(|v| v.0).collect();
            z.sort_unstable();
            let independent = self
                .independences
                .iter()
                .any(|(p, q, s)| (*p, *q) == (a, b) && *s == z);
            Ok(CiOutcome {
                independent,
                statistic: 0.0,
                p_value: if independent { 1.0 } else { 0.0 },
                degrees_of_freedom: 1,
            })
        }

        fn kind(&self) -> CiTestKind {
            CiTestKind::FisherZ
        }

        fn alpha(&self) -> f64 {
            0.05
        }

        fn dataset(&self) -> &Dataset {
            &self.dataset
        }

        fn begin_level(&self, level: usize) -> Result<(), LearnError> {
            self.levels_begun.lock().unwrap().push(level);
            Ok(())
        }
    }

    #[test]
    fn combinations_are_lexicographic() {
        let all: Vec<Vec<usize>> = Combinations::new(4, 2).collect();
        assert_eq!(
            all,
            vec![
                vec![0, 1],
                vec![0, 2],
                vec![0, 3],
                vec![1, 2],
                vec![1, 3],
                vec![2, 3]
            ]
        );
        assert_eq!(Combinations::new(3, 0).count(), 1);
        assert_eq!(Combinations::new(2, 3).count(), 0);
    }

    #[test]
    fn oracle_is_told_when_each_level_starts() {
        let oracle = ScriptedOracle::new(4, vec![(0, 2, vec![1]), (0, 3, vec![1, 2])]);
        let skeleton = SkeletonSearch::new(&oracle).parallel(false).run().unwrap();
        let begun = oracle.levels_begun.lock().unwrap().clone();
        let levels: Vec<usize> = skeleton.levels().iter().map(|l| l.level).collect();
        assert_eq!(begun, levels);
        assert_eq!(begun, vec![0, 1, 2]);
    }

    #[test]
    fn chain_is_separated_by_middle_node() {
        // V0 - V1 - V2 with V0 _|_ V2 | V1.
        let oracle = ScriptedOracle::new(3, vec![(0, 2, vec![1])]);
        let skeleton = SkeletonSearch::new(&oracle).parallel(false).run().unwrap();
        assert_eq!(
            skeleton.edges().collect::<Vec<_>>(),
            vec![(VarId(0), VarId(1)), (VarId(1), VarId(2))]
        );
        assert_eq!(skeleton.separating_set(VarId(2), VarId(0)), Some(&[VarId(1)][..]));
        assert_eq!(skeleton.levels().len(), 2);
        assert_eq!(skeleton.levels()[1].edges_removed, 1);
    }

    #[test]
    fn removals_within_a_level_do_not_shrink_candidates() {
        // At level 1, V0 _|_ V3 | V1 and V1 _|_ V3 | V0 both hold. With a
        // snapshot, removing (0,3) does not stop (1,3) from using V0.
        let oracle = ScriptedOracle::new(
            4,
            vec![(0, 3, vec![1]), (1, 3, vec![0]), (2, 3, vec![0])],
        );
        let skeleton = SkeletonSearch::new(&oracle).parallel(false).run().unwrap();
        assert!(!skeleton.is_adjacent(VarId(0), VarId(3)));
        assert!(!skeleton.is_adjacent(VarId(1), VarId(3)));
        assert!(!skeleton.is_adjacent(VarId(2), VarId(3)));
        assert_eq!(skeleton.separating_set(VarId(1), VarId(3)), Some(&[VarId(0)][..]));
    }

    #[test]
    fn max_level_bounds_search() {
        let oracle = ScriptedOracle::new(3, vec![(0, 2, vec![1])]);
        let skeleton = SkeletonSearch::new(&oracle)
            .max_conditioning_set_size(Some(0))
            .parallel(false)
            .run()
            .unwrap();
        assert_eq!(skeleton.edge_count(), 3);
        assert_eq!(skeleton.levels().len(), 1);
    }

    #[test]
    fn duplicate_subsets_are_tested_once() {
        // Complete graph on 3 nodes, nothing independent: level 0 runs 3 tests,
        // level 1 runs one test per pair since both sides offer the same node.
        let oracle = ScriptedOracle::new(3, Vec::new());
        let skeleton = SkeletonSearch::new(&oracle).parallel(false).run().unwrap();
        assert_eq!(skeleton.levels()[0].tests_performed, 3);
        assert_eq!(skeleton.levels()[1].tests_performed, 3);
        assert_eq!(skeleton.tests_performed(), oracle.calls.load(Ordering::Relaxed));
        assert_eq!(skeleton.levels().len(), 2);
    }

    #[test]
    fn sgs_conditions_on_non_neighbours() {
        // V0 _|_ V1 only given V3, and V3 is not adjacent to V0 or V1 after
        // level 0. PC-stable cannot find the separator; SGS can.
        let oracle = ScriptedOracle::new(
            4,
            vec![(0, 1, vec![3]), (0, 3, vec![]), (1, 3, vec![])],
        );
        let pc = SkeletonSearch::new(&oracle).parallel(false).run().unwrap();
        assert!(pc.is_adjacent(VarId(0), VarId(1)));
        let sgs = SkeletonSearch::new(&oracle)
            .algorithm(SkeletonAlgorithm::Sgs)
            .parallel(false)
            .run()
            .unwrap();
        assert!(!sgs.is_adjacent(VarId(0), VarId(1)));
        assert_eq!(sgs.separating_set(VarId(0), VarId(1)), Some(&[VarId(3)][..]));
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn parallel_matches_sequential() {
        let oracle = ScriptedOracle::new(
            5,
            vec![(0, 4, vec![1]), (1, 3, vec![2]), (0, 2, vec![]), (2, 4, vec![1, 3])],
        );
        let sequential = SkeletonSearch::new(&oracle).parallel(false).run().unwrap();
        let parallel = SkeletonSearch::new(&oracle).parallel(true).run().unwrap();
        assert_eq!(
            sequential.edges().collect::<Vec<_>>(),
            parallel.edges().collect::<Vec<_>>()
        );
        assert_eq!(sequential.separating_sets(), parallel.separating_sets());
    }

    #[test]
    fn algorithm_names_parse() {
        assert_eq!("pc-stable".parse::<SkeletonAlgorithm>().unwrap(), SkeletonAlgorithm::PcStable);
        assert_eq!("sgs".parse::<SkeletonAlgorithm>().unwrap(), SkeletonAlgorithm::Sgs);
        assert!("ges".parse::<SkeletonAlgorithm>().is_err());
    }
}
