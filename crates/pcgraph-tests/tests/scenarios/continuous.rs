use pcgraph_core::{learn, CiTestKind, LearnParams};

use crate::fixtures;

const N: usize = 500;

#[test]
fn independent_gaussians_have_no_edge() {
    let data = fixtures::gaussian_independent(N, 1);
    let (pdag, trace) = learn(&data, &LearnParams::default()).unwrap();
    assert_eq!(pdag.edge_count(), 0);
    assert_eq!(trace.test_kind, CiTestKind::FisherZ);
}

#[test]
fn gaussian_collider_is_oriented() {
    let data = fixtures::gaussian_collider(N, 2);
    let (pdag, trace) = learn(&data, &LearnParams::default()).unwrap();
    assert_eq!(pdag.to_string(), "(A, ->, C)\n(B, ->, C)\n");
    assert_eq!(trace.separating_set("A", "B"), Some(&[][..]));
}

#[test]
fn gaussian_chain_is_left_undirected() {
    let data = fixtures::gaussian_chain(N, 3);
    let (pdag, trace) = learn(&data, &LearnParams::default()).unwrap();
    assert_eq!(pdag.to_string(), "(A, -, B)\n(B, -, C)\n");
    assert_eq!(trace.separating_set("A", "C"), Some(&["B".to_string()][..]));
}

#[test]
fn gaussian_mi_test_recovers_collider() {
    let data = fixtures::gaussian_collider(N, 4);
    let params = LearnParams {
        test: Some(CiTestKind::GaussianMi),
        ..LearnParams::default()
    };
    let (pdag, _) = learn(&data, &params).unwrap();
    assert_eq!(pdag.to_string(), "(A, ->, C)\n(B, ->, C)\n");
}

#[test]
fn narrowed_sample_size_is_respected() {
    let data = fixtures::gaussian_chain(N, 5).with_sample_size(200).unwrap();
    let (_, trace) = learn(&data, &LearnParams::default()).unwrap();
    assert_eq!(trace.sample_size, 200);
}
