use pcgraph_core::engine::independence::oracle;
use pcgraph_core::{
    learn, CiTestKind, LearnParams, OracleOptions, SkeletonSearch, StatisticsEngine,
};

use crate::fixtures;

#[test]
fn independent_variables_have_no_edge() {
    let data = fixtures::independent_pair();
    let (pdag, trace) = learn(&data, &LearnParams::default()).unwrap();
    assert_eq!(pdag.edge_count(), 0);
    assert_eq!(pdag.to_string(), "");
    assert_eq!(trace.separating_set("A", "B"), Some(&[][..]));
    assert_eq!(trace.levels.len(), 1);
}

#[test]
fn collider_is_oriented() {
    let data = fixtures::collider();
    let (pdag, trace) = learn(&data, &LearnParams::default()).unwrap();
    assert_eq!(
        pdag.edge_triples(),
        vec![
            ("A".to_string(), "->", "C".to_string()),
            ("B".to_string(), "->", "C".to_string()),
        ]
    );
    assert_eq!(trace.separating_set("A", "B"), Some(&[][..]));
    assert_eq!(trace.collider_conflicts, 0);
    assert_eq!(trace.propagated_orientations, 0);
}

#[test]
fn chain_is_left_undirected() {
    let data = fixtures::chain();
    let (pdag, trace) = learn(&data, &LearnParams::default()).unwrap();
    assert_eq!(pdag.to_string(), "(A, -, B)\n(B, -, C)\n");
    assert_eq!(pdag.directed_count(), 0);
    assert_eq!(trace.separating_set("A", "C"), Some(&["B".to_string()][..]));
    assert!(trace.colliders.is_empty());
}

#[test]
fn chi_square_test_recovers_same_structures() {
    let params = LearnParams {
        test: Some(CiTestKind::ChiSquare),
        ..LearnParams::default()
    };
    let (collider, _) = learn(&fixtures::collider(), &params).unwrap();
    assert_eq!(collider.to_string(), "(A, ->, C)\n(B, ->, C)\n");
    let (chain, _) = learn(&fixtures::chain(), &params).unwrap();
    assert_eq!(chain.to_string(), "(A, -, B)\n(B, -, C)\n");
}

#[test]
fn sgs_agrees_on_small_structures() {
    let params = LearnParams {
        algorithm: "sgs".parse().unwrap(),
        ..LearnParams::default()
    };
    let (collider, _) = learn(&fixtures::collider(), &params).unwrap();
    assert_eq!(collider.to_string(), "(A, ->, C)\n(B, ->, C)\n");
    let (chain, trace) = learn(&fixtures::chain(), &params).unwrap();
    assert_eq!(chain.to_string(), "(A, -, B)\n(B, -, C)\n");
    assert_eq!(trace.separating_set("C", "A"), Some(&["B".to_string()][..]));
}

#[test]
fn oracle_sees_chain_independence_only_given_middle() {
    let data = fixtures::chain();
    let engine = StatisticsEngine::new(&data).unwrap();
    let test = oracle(&engine, CiTestKind::GTest, OracleOptions::default()).unwrap();
    let marginal = test.test_named("A", "C", &[]).unwrap();
    let given_b = test.test_named("A", "C", &["B"]).unwrap();
    assert!(!marginal.independent);
    assert!(given_b.independent);
    assert_eq!(given_b.p_value, 1.0);
}

#[test]
fn statistics_cache_is_reused_within_run() {
    let data = fixtures::collider_with_weak_pair();
    let (_, trace) = learn(&data, &LearnParams::default()).unwrap();
    // A _|_ C | B and B _|_ C | A share the counts over {A, B, C}.
    assert!(trace.cache_hits > 0);
    assert_eq!(
        trace.cache_misses as usize + trace.cache_hits as usize,
        trace.tests_performed
    );
}

#[test]
fn statistics_cache_only_holds_current_level() {
    let data = fixtures::collider_with_weak_pair();
    let engine = StatisticsEngine::new(&data).unwrap();
    let test = oracle(&engine, CiTestKind::GTest, OracleOptions::default()).unwrap();
    let skeleton = SkeletonSearch::new(test.as_ref())
        .parallel(false)
        .run()
        .unwrap();
    let levels = skeleton.levels();
    assert!(levels.len() >= 2);
    let last = levels.last().unwrap();
    let stats = engine.cache_stats();
    // Only sets counted during the deepest level survive.
    assert!(stats.entries <= last.tests_performed);
    assert!((stats.entries as u64) < stats.misses);
}
