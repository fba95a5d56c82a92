//! Deterministic synthetic datasets shared by the integration suites.
//!
//! Categorical designs are exact: cell counts are chosen so that every
//! independence that should hold has a G statistic of exactly zero and every
//! dependence is overwhelming. Continuous designs use a seeded generator and
//! Gram-Schmidt orthogonalisation so that the intended independences hold
//! exactly in the sample.

#![allow(dead_code)]

use pcgraph_core::{Dataset, VarId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Builds a binary dataset from `(values, count)` cells.
pub fn binary_design(names: &[&str], cells: &[(&[u8], usize)]) -> Dataset {
    let mut columns = vec![Vec::new(); names.len()];
    for (values, count) in cells {
        assert_eq!(values.len(), names.len());
        for _ in 0..*count {
            for (column, &v) in columns.iter_mut().zip(values.iter()) {
                column.push(v);
            }
        }
    }
    let domains = names
        .iter()
        .map(|_| vec!["0".to_string(), "1".to_string()])
        .collect();
    Dataset::categorical(names, domains, columns).expect("binary design")
}

/// A and B independent and balanced.
pub fn independent_pair() -> Dataset {
    binary_design(
        &["A", "B"],
        &[(&[0, 0], 250), (&[0, 1], 250), (&[1, 0], 250), (&[1, 1], 250)],
    )
}

/// A -> C <- B with C = A or B.
pub fn collider() -> Dataset {
    binary_design(
        &["A", "B", "C"],
        &[
            (&[0, 0, 0], 100),
            (&[0, 1, 1], 100),
            (&[1, 0, 1], 100),
            (&[1, 1, 1], 100),
        ],
    )
}

/// A -> B -> C; B agrees with A in 75% of rows and C agrees with B in 75%.
pub fn chain() -> Dataset {
    binary_design(
        &["A", "B", "C"],
        &[
            (&[0, 0, 0], 225),
            (&[0, 0, 1], 75),
            (&[0, 1, 0], 25),
            (&[0, 1, 1], 75),
            (&[1, 0, 0], 75),
            (&[1, 0, 1], 25),
            (&[1, 1, 0], 75),
            (&[1, 1, 1], 225),
        ],
    )
}

/// A and B weakly associated: G is about 5.14 on 1 dof (p about 0.023).
pub fn weak_pair() -> Dataset {
    binary_design(
        &["A", "B"],
        &[(&[0, 0], 58), (&[0, 1], 42), (&[1, 0], 42), (&[1, 1], 58)],
    )
}

/// Collider A -> C <- B plus a pair D, E independent of it and weakly
/// associated with each other: the D, E table is [[112, 88], [88, 112]],
/// G about 5.77 on 1 dof (p about 0.016).
pub fn collider_with_weak_pair() -> Dataset {
    let mut cells: Vec<(Vec<u8>, usize)> = Vec::new();
    for abc in [[0u8, 0, 0], [0, 1, 1], [1, 0, 1], [1, 1, 1]] {
        for (de, n) in [([0u8, 0], 28usize), ([0, 1], 22), ([1, 0], 22), ([1, 1], 28)] {
            let mut values = abc.to_vec();
            values.extend_from_slice(&de);
            cells.push((values, n));
        }
    }
    let borrowed: Vec<(&[u8], usize)> = cells.iter().map(|(v, n)| (v.as_slice(), *n)).collect();
    binary_design(&["A", "B", "C", "D", "E"], &borrowed)
}

pub fn normal_vec(rng: &mut StdRng, n: usize) -> Vec<f64> {
    rng.sample_iter(StandardNormal).take(n).collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn centered(v: &[f64]) -> Vec<f64> {
    let mean = v.iter().sum::<f64>() / v.len() as f64;
    v.iter().map(|x| x - mean).collect()
}

/// Centres `v` and removes its projection on the span of the centred
/// `against` vectors, so its sample correlation with each is zero.
pub fn orthogonalize(v: &[f64], against: &[&[f64]]) -> Vec<f64> {
    let mut basis: Vec<Vec<f64>> = Vec::new();
    for u in against {
        let mut w = centered(u);
        for b in &basis {
            let k = dot(&w, b) / dot(b, b);
            w.iter_mut().zip(b).for_each(|(x, y)| *x -= k * y);
        }
        basis.push(w);
    }
    let mut out = centered(v);
    for b in &basis {
        let k = dot(&out, b) / dot(b, b);
        out.iter_mut().zip(b).for_each(|(x, y)| *x -= k * y);
    }
    out
}

pub fn continuous(names: &[&str], columns: Vec<Vec<f64>>) -> Dataset {
    Dataset::continuous(names, columns).expect("continuous design")
}

/// A and B with exactly zero sample correlation.
pub fn gaussian_independent(n: usize, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let a = normal_vec(&mut rng, n);
    let b = orthogonalize(&normal_vec(&mut rng, n), &[&a]);
    continuous(&["A", "B"], vec![a, b])
}

/// A -> C <- B with A and B exactly uncorrelated.
pub fn gaussian_collider(n: usize, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let a = normal_vec(&mut rng, n);
    let b = orthogonalize(&normal_vec(&mut rng, n), &[&a]);
    let noise = normal_vec(&mut rng, n);
    let c = (0..n).map(|i| a[i] + b[i] + 0.5 * noise[i]).collect();
    continuous(&["A", "B", "C"], vec![a, b, c])
}

/// A -> B -> C with A and C exactly uncorrelated given B.
pub fn gaussian_chain(n: usize, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let a = normal_vec(&mut rng, n);
    let e1 = normal_vec(&mut rng, n);
    let b: Vec<f64> = (0..n).map(|i| a[i] + 0.7 * e1[i]).collect();
    let e2 = orthogonalize(&normal_vec(&mut rng, n), &[&a, &b]);
    let c = (0..n).map(|i| b[i] + 0.7 * e2[i]).collect();
    continuous(&["A", "B", "C"], vec![a, b, c])
}

/// Random binary data with no built-in structure.
pub fn random_binary(names: &[&str], n: usize, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let columns = names
        .iter()
        .map(|_| (0..n).map(|_| rng.gen_range(0..2u8)).collect())
        .collect();
    let domains = names
        .iter()
        .map(|_| vec!["0".to_string(), "1".to_string()])
        .collect();
    Dataset::categorical(names, domains, columns).expect("random design")
}

pub fn id(dataset: &Dataset, name: &str) -> VarId {
    dataset.var_id(name).expect("known variable")
}
