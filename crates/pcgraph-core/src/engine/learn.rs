//! End-to-end structure learning.

use std::time::Instant;

use crate::engine::dataset::Dataset;
use crate::engine::errors::LearnError;
use crate::engine::independence;
use crate::engine::orientation;
use crate::engine::params::LearnParams;
use crate::engine::pdag::Pdag;
use crate::engine::skeleton::SkeletonSearch;
use crate::engine::statistics::StatisticsEngine;
use crate::engine::trace::Trace;

/// Learns a PDAG from `dataset`.
///
/// Runs skeleton search with the configured independence test, then orients
/// colliders and applies the propagation rules. The statistics cache lives
/// for this call only. Any failure aborts the run; no partial graph is
/// returned.
///
/// For a fixed dataset view and parameters the result is identical across
/// calls, with or without the `parallel` feature.
pub fn learn(dataset: &Dataset, params: &LearnParams) -> Result<(Pdag, Trace), LearnError> {
    let started = Instant::now();
    let params = params.clone().validate()?;
    let test_kind = params.test_for(dataset.kind())?;

    let engine = StatisticsEngine::new(dataset)?;
    let oracle = independence::oracle(&engine, test_kind, params.oracle_options())?;
    let skeleton = SkeletonSearch::new(oracle.as_ref())
        .algorithm(params.algorithm)
        .max_conditioning_set_size(params.max_conditioning_set_size)
        .parallel(params.parallel)
        .run()?;

    let (pdag, report) = orientation::orient(&skeleton, dataset.names())?;

    let trace = Trace::collect(
        &engine,
        oracle.as_ref(),
        &params,
        &skeleton,
        &report,
        started.elapsed(),
    );

    #[cfg(feature = "tracing")]
    tracing::info!(
        "learned {} edges ({} directed) from {} rows in {:?}, {} tests",
        pdag.edge_count(),
        pdag.directed_count(),
        trace.sample_size,
        trace.elapsed,
        trace.tests_performed
    );

    Ok((pdag, trace))
}
