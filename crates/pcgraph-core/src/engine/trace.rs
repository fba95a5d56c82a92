//! Run diagnostics returned alongside the learned graph.

use std::time::Duration;

use crate::engine::independence::{CiTestKind, IndependenceTest};
use crate::engine::orientation::OrientationReport;
use crate::engine::params::LearnParams;
use crate::engine::skeleton::{LevelTrace, Skeleton, SkeletonAlgorithm};
use crate::engine::statistics::StatisticsEngine;

/// Separating set of one removed edge, by name.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SeparatingSetEntry {
    pub x: String,
    pub y: String,
    pub separator: Vec<String>,
}

/// Summary of a learning run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Trace {
    pub elapsed: Duration,
    pub levels: Vec<LevelTrace>,
    pub tests_performed: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// In id-pair order.
    pub separating_sets: Vec<SeparatingSetEntry>,
    /// Colliders `(x, z, y)` meaning `x -> z <- y`.
    pub colliders: Vec<(String, String, String)>,
    pub collider_conflicts: usize,
    pub propagated_orientations: usize,
    pub test_kind: CiTestKind,
    pub algorithm: SkeletonAlgorithm,
    pub alpha: f64,
    pub sample_size: usize,
}

impl Trace {
    pub(crate) fn collect(
        engine: &StatisticsEngine<'_>,
        oracle: &dyn IndependenceTest,
        params: &LearnParams,
        skeleton: &Skeleton,
        report: &OrientationReport,
        elapsed: Duration,
    ) -> Self {
        let dataset = engine.dataset();
        let cache = engine.cache_stats();
        let name = |v| dataset.name(v).to_string();
        Self {
            elapsed,
            levels: skeleton.levels().to_vec(),
            tests_performed: skeleton.tests_performed(),
            cache_hits: cache.hits,
            cache_misses: cache.misses,
            separating_sets: skeleton
                .separating_sets()
                .iter()
                .map(|((x, y), z)| SeparatingSetEntry {
                    x: name(x),
                    y: name(y),
                    separator: z.iter().map(|&v| name(v)).collect(),
                })
                .collect(),
            colliders: report
                .colliders
                .iter()
                .map(|&(x, z, y)| (name(x), name(z), name(y)))
                .collect(),
            collider_conflicts: report.collider_conflicts,
            propagated_orientations: report.propagated,
            test_kind: oracle.kind(),
            algorithm: params.algorithm,
            alpha: oracle.alpha(),
            sample_size: dataset.sample_size(),
        }
    }

    /// Separating set recorded for the named pair, in either order.
    pub fn separating_set(&self, x: &str, y: &str) -> Option<&[String]> {
        self.separating_sets
            .iter()
            .find(|e| (e.x == x && e.y == y) || (e.x == y && e.y == x))
            .map(|e| e.separator.as_slice())
    }

    /// Deepest conditioning level reached.
    pub fn max_level(&self) -> Option<usize> {
        self.levels.last().map(|l| l.level)
    }
}
