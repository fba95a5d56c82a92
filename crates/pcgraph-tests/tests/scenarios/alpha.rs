use pcgraph_core::{learn, Dataset, LearnParams};

use crate::fixtures;

const ALPHAS: [f64; 6] = [0.2, 0.1, 0.05, 0.02, 0.01, 0.001];

fn edge_counts(data: &Dataset) -> Vec<usize> {
    ALPHAS
        .iter()
        .map(|&alpha| {
            let params = LearnParams {
                alpha,
                ..LearnParams::default()
            };
            learn(data, &params).unwrap().0.edge_count()
        })
        .collect()
}

#[test]
fn weak_association_is_dropped_at_small_alpha() {
    let data = fixtures::weak_pair();
    let kept = LearnParams {
        alpha: 0.05,
        ..LearnParams::default()
    };
    let dropped = LearnParams {
        alpha: 0.01,
        ..LearnParams::default()
    };
    assert_eq!(learn(&data, &kept).unwrap().0.edge_count(), 1);
    assert_eq!(learn(&data, &dropped).unwrap().0.edge_count(), 0);
}

#[test]
fn smaller_alpha_never_adds_edges() {
    for data in [
        fixtures::weak_pair(),
        fixtures::chain(),
        fixtures::collider(),
        fixtures::collider_with_weak_pair(),
    ] {
        let counts = edge_counts(&data);
        for w in counts.windows(2) {
            assert!(w[1] <= w[0], "edge counts not monotone in alpha: {:?}", counts);
        }
    }
}

#[test]
fn weak_pair_beside_collider_depends_on_alpha() {
    let data = fixtures::collider_with_weak_pair();
    let counts = edge_counts(&data);
    // D - E has p about 0.016.
    assert_eq!(counts, vec![3, 3, 3, 3, 2, 2]);
}
