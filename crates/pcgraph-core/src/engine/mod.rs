//! The structure-learning engine.
//!
//! This module provides:
//! - **dataset**: immutable categorical or continuous samples and their views
//! - **statistics**: contingency tables and covariance slices, cached per run
//! - **independence**: conditional-independence test oracle
//! - **skeleton**: PC-stable / SGS edge removal with separating sets
//! - **orientation**: colliders and propagation rules
//! - **pdag**: the partially directed output graph
//! - **learn**: the end-to-end pipeline

pub mod dataset;
pub mod errors;
pub mod independence;
pub mod learn;
pub mod orientation;
pub mod params;
pub mod pdag;
pub mod skeleton;
pub mod statistics;
pub mod trace;
