//! Edge orientation: colliders from separating sets, then Meek's rules.

use std::sync::Arc;

use crate::engine::dataset::VarId;
use crate::engine::errors::LearnError;
use crate::engine::pdag::{EdgeType, OrientOutcome, Pdag};
use crate::engine::skeleton::Skeleton;

/// What orientation did to the skeleton.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrientationReport {
    /// Colliders `(x, z, y)` meaning `x -> z <- y`, in detection order.
    pub colliders: Vec<(VarId, VarId, VarId)>,
    /// Collider orientations refused because the edge was already directed
    /// the other way.
    pub collider_conflicts: usize,
    /// Edges directed by the propagation rules.
    pub propagated: usize,
}

/// Turns a skeleton into a PDAG.
///
/// Every unshielded triple `x - z - y` whose separating set for `(x, y)`
/// lacks `z` becomes a collider. Triples are visited by `z` in the
/// skeleton's processing order, then by `(x, y)` in that order; when two
/// colliders disagree on an edge the first one wins. Colliders are read off
/// the undirected skeleton and its separating sets, so earlier orientations
/// never influence which triples qualify. The propagation rules then run to
/// a fixed point.
///
/// Fails with [`LearnError::InconsistentOrientation`] if the result has a
/// directed cycle, and with [`LearnError::Internal`] if a non-adjacent pair
/// has no separating set.
pub fn orient(
    skeleton: &Skeleton,
    names: &[Arc<str>],
) -> Result<(Pdag, OrientationReport), LearnError> {
    if names.len() != skeleton.num_nodes() {
        return Err(LearnError::Internal(format!(
            "orientation: {} names for {} nodes",
            names.len(),
            skeleton.num_nodes()
        )));
    }
    let mut pdag = Pdag::from_names(names.to_vec());
    for (a, b) in skeleton.edges() {
        pdag.add_undirected(a, b)?;
    }

    let mut report = OrientationReport::default();
    let order = skeleton.order();
    let mut rank = vec![0usize; order.len()];
    for (r, v) in order.iter().enumerate() {
        rank[v.index()] = r;
    }

    for &z in order {
        let mut around: Vec<VarId> = skeleton.neighbours(z).collect();
        around.sort_by_key(|v| rank[v.index()]);
        for (i, &x) in around.iter().enumerate() {
            for &y in &around[i + 1..] {
                if skeleton.is_adjacent(x, y) {
                    continue;
                }
                let separator = skeleton.separating_set(x, y).ok_or_else(|| {
                    LearnError::Internal(format!(
                        "no separating set for non-adjacent pair ({}, {})",
                        pdag.name(x),
                        pdag.name(y)
                    ))
                })?;
                if separator.contains(&z) {
                    continue;
                }
                report.colliders.push((x, z, y));
                for from in [x, y] {
                    if pdag.orient(from, z)? == OrientOutcome::Conflict {
                        report.collider_conflicts += 1;
                        #[cfg(feature = "tracing")]
                        tracing::warn!(
                            "collider {} -> {} conflicts with an earlier orientation",
                            pdag.name(from),
                            pdag.name(z)
                        );
                    }
                }
            }
        }
    }

    report.propagated = apply_propagation_rules(&mut pdag)?;
    #[cfg(feature = "tracing")]
    tracing::debug!(
        "orientation: {} colliders, {} conflicts, {} propagated",
        report.colliders.len(),
        report.collider_conflicts,
        report.propagated
    );

    if let Some(cycle) = pdag.find_directed_cycle() {
        return Err(LearnError::InconsistentOrientation {
            cycle: pdag.path_names(&cycle),
        });
    }
    Ok((pdag, report))
}

/// Applies Meek's rules R1-R4 until none fires; returns how many edges were
/// directed. Running it again on its own output directs nothing.
///
/// Only undirected edges are oriented, so any other outcome from
/// [`Pdag::orient`] is reported as [`LearnError::Internal`].
pub fn apply_propagation_rules(pdag: &mut Pdag) -> Result<usize, LearnError> {
    let mut directed = 0;
    loop {
        let mut changed = false;
        let undirected: Vec<(VarId, VarId)> = pdag
            .edges()
            .filter(|e| e.kind == EdgeType::Undirected)
            .map(|e| (e.from, e.to))
            .collect();
        for (u, v) in undirected {
            if !pdag.has_undirected(u, v) {
                continue;
            }
            for (a, b) in [(u, v), (v, u)] {
                if implied_direction(pdag, a, b) {
                    match pdag.orient(a, b)? {
                        OrientOutcome::Oriented => {
                            directed += 1;
                            changed = true;
                        }
                        outcome => {
                            return Err(LearnError::Internal(format!(
                                "propagation: orienting undirected edge {} - {} gave {:?}",
                                pdag.name(a),
                                pdag.name(b),
                                outcome
                            )));
                        }
                    }
                    break;
                }
            }
        }
        if !changed {
            return Ok(directed);
        }
    }
}

/// True when one of R1-R4 directs the undirected edge `a - b` as `a -> b`.
fn implied_direction(pdag: &Pdag, a: VarId, b: VarId) -> bool {
    rule1(pdag, a, b) || rule2(pdag, a, b) || rule3(pdag, a, b) || rule4(pdag, a, b)
}

/// R1: `c -> a - b`, `c` and `b` non-adjacent.
fn rule1(pdag: &Pdag, a: VarId, b: VarId) -> bool {
    pdag.parents(a)
        .into_iter()
        .any(|c| c != b && !pdag.is_adjacent(c, b))
}

/// R2: `a -> c -> b` with `a - b`.
fn rule2(pdag: &Pdag, a: VarId, b: VarId) -> bool {
    pdag.children(a).into_iter().any(|c| pdag.has_directed(c, b))
}

/// R3: `a - c -> b`, `a - d -> b`, `c` and `d` non-adjacent.
fn rule3(pdag: &Pdag, a: VarId, b: VarId) -> bool {
    let via: Vec<VarId> = pdag
        .undirected_neighbours(a)
        .into_iter()
        .filter(|&c| c != b && pdag.has_directed(c, b))
        .collect();
    via.iter().enumerate().any(|(i, &c)| {
        via[i + 1..].iter().any(|&d| !pdag.is_adjacent(c, d))
    })
}

/// R4: `a - c -> d -> b`, `a` adjacent to `d`, `c` and `b` non-adjacent.
fn rule4(pdag: &Pdag, a: VarId, b: VarId) -> bool {
    pdag.undirected_neighbours(a)
        .into_iter()
        .filter(|&c| c != b && !pdag.is_adjacent(c, b))
        .any(|c| {
            pdag.children(c)
                .into_iter()
                .any(|d| d != a && pdag.is_adjacent(a, d) && pdag.has_directed(d, b))
        })
}
