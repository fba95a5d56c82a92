//! Partially directed acyclic graph over dataset variables.
//!
//! Each adjacent pair carries exactly one mark: undirected, or directed one
//! way. Edges are keyed by the id-ordered pair so the edge set iterates in a
//! stable order and equality is structural.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::engine::dataset::VarId;
use crate::engine::errors::LearnError;

/// Printable operator for a directed edge.
pub const DIRECTED_OP: &str = "->";
/// Printable operator for an undirected edge.
pub const UNDIRECTED_OP: &str = "-";

/// Type of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EdgeType {
    Directed,
    Undirected,
}

impl EdgeType {
    pub fn op(self) -> &'static str {
        match self {
            EdgeType::Directed => DIRECTED_OP,
            EdgeType::Undirected => UNDIRECTED_OP,
        }
    }
}

/// One edge. For directed edges `from -> to`; undirected edges have
/// `from < to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Edge {
    pub from: VarId,
    pub to: VarId,
    pub kind: EdgeType,
}

/// Mark stored against the id-ordered pair `(lo, hi)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Undirected,
    /// `lo -> hi`
    Forward,
    /// `hi -> lo`
    Backward,
}

/// Result of [`Pdag::orient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrientOutcome {
    /// An undirected edge was given the requested direction.
    Oriented,
    /// The edge already had the requested direction.
    Unchanged,
    /// The edge is directed the other way; it was left as is.
    Conflict,
}

#[inline]
fn key(a: VarId, b: VarId) -> (VarId, VarId) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// A PDAG over a fixed, named node set.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(into = "PdagRepr", try_from = "PdagRepr")
)]
pub struct Pdag {
    names: Vec<Arc<str>>,
    edges: BTreeMap<(VarId, VarId), Mark>,
    neighbours: Vec<BTreeSet<VarId>>,
}

impl Pdag {
    /// Empty graph over `names`; `VarId(i)` is `names[i]`.
    pub fn new<S: AsRef<str>>(names: &[S]) -> Self {
        Self::from_names(names.iter().map(|s| Arc::from(s.as_ref())).collect())
    }

    pub(crate) fn from_names(names: Vec<Arc<str>>) -> Self {
        let neighbours = vec![BTreeSet::new(); names.len()];
        Self {
            names,
            edges: BTreeMap::new(),
            neighbours,
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[Arc<str>] {
        &self.names
    }

    /// Name of `id`, or `"?"` for an id outside the graph.
    pub fn name(&self, id: VarId) -> &str {
        self.names.get(id.index()).map(|s| s.as_ref()).unwrap_or("?")
    }

    pub fn var_id(&self, name: &str) -> Option<VarId> {
        self.names
            .iter()
            .position(|n| n.as_ref() == name)
            .map(|i| VarId(i as u32))
    }

    fn check_pair(&self, a: VarId, b: VarId) -> Result<(), LearnError> {
        for v in [a, b] {
            if v.index() >= self.names.len() {
                return Err(LearnError::InvalidVariable(v.to_string()));
            }
        }
        if a == b {
            return Err(LearnError::Value(format!(
                "self-loop on '{}' is not allowed",
                self.name(a)
            )));
        }
        Ok(())
    }

    fn set(&mut self, a: VarId, b: VarId, mark: Mark) {
        self.edges.insert(key(a, b), mark);
        self.neighbours[a.index()].insert(b);
        self.neighbours[b.index()].insert(a);
    }

    /// Inserts `a - b`, replacing any existing mark.
    pub fn add_undirected(&mut self, a: VarId, b: VarId) -> Result<(), LearnError> {
        self.check_pair(a, b)?;
        self.set(a, b, Mark::Undirected);
        Ok(())
    }

    /// Inserts `a -> b`, replacing any existing mark.
    pub fn add_directed(&mut self, a: VarId, b: VarId) -> Result<(), LearnError> {
        self.check_pair(a, b)?;
        self.set(a, b, if a < b { Mark::Forward } else { Mark::Backward });
        Ok(())
    }

    /// Removes the edge between `a` and `b`; returns whether one existed.
    pub fn remove_edge(&mut self, a: VarId, b: VarId) -> bool {
        let removed = self.edges.remove(&key(a, b)).is_some();
        if removed {
            self.neighbours[a.index()].remove(&b);
            self.neighbours[b.index()].remove(&a);
        }
        removed
    }

    /// Directs an existing edge `a -> b`. An edge already directed `b -> a`
    /// is left untouched and reported as a conflict.
    pub fn orient(&mut self, a: VarId, b: VarId) -> Result<OrientOutcome, LearnError> {
        let wanted = if a < b { Mark::Forward } else { Mark::Backward };
        let mark = self.edges.get_mut(&key(a, b)).ok_or_else(|| {
            LearnError::Internal(format!(
                "cannot orient {} -> {}: not adjacent",
                a, b
            ))
        })?;
        Ok(match *mark {
            Mark::Undirected => {
                *mark = wanted;
                OrientOutcome::Oriented
            }
            m if m == wanted => OrientOutcome::Unchanged,
            _ => OrientOutcome::Conflict,
        })
    }

    /// Type of the edge between `a` and `b`, if any.
    pub fn edge_type(&self, a: VarId, b: VarId) -> Option<EdgeType> {
        self.edges.get(&key(a, b)).map(|m| match m {
            Mark::Undirected => EdgeType::Undirected,
            _ => EdgeType::Directed,
        })
    }

    pub fn is_adjacent(&self, a: VarId, b: VarId) -> bool {
        self.edges.contains_key(&key(a, b))
    }

    /// True when `a -> b`.
    pub fn has_directed(&self, a: VarId, b: VarId) -> bool {
        let wanted = if a < b { Mark::Forward } else { Mark::Backward };
        a != b && self.edges.get(&key(a, b)) == Some(&wanted)
    }

    pub fn has_undirected(&self, a: VarId, b: VarId) -> bool {
        self.edges.get(&key(a, b)) == Some(&Mark::Undirected)
    }

    /// All nodes adjacent to `v`, in id order.
    pub fn neighbours(&self, v: VarId) -> impl Iterator<Item = VarId> + '_ {
        self.neighbours
            .get(v.index())
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Nodes `p` with `p -> v`.
    pub fn parents(&self, v: VarId) -> Vec<VarId> {
        self.neighbours(v).filter(|&p| self.has_directed(p, v)).collect()
    }

    /// Nodes `c` with `v -> c`.
    pub fn children(&self, v: VarId) -> Vec<VarId> {
        self.neighbours(v).filter(|&c| self.has_directed(v, c)).collect()
    }

    /// Nodes `u` with `v - u`.
    pub fn undirected_neighbours(&self, v: VarId) -> Vec<VarId> {
        self.neighbours(v).filter(|&u| self.has_undirected(v, u)).collect()
    }

    /// Edges in id-pair order.
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.edges.iter().map(|(&(lo, hi), mark)| match mark {
            Mark::Undirected => Edge {
                from: lo,
                to: hi,
                kind: EdgeType::Undirected,
            },
            Mark::Forward => Edge {
                from: lo,
                to: hi,
                kind: EdgeType::Directed,
            },
            Mark::Backward => Edge {
                from: hi,
                to: lo,
                kind: EdgeType::Directed,
            },
        })
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn directed_count(&self) -> usize {
        self.edges.values().filter(|m| **m != Mark::Undirected).count()
    }

    pub fn undirected_count(&self) -> usize {
        self.edge_count() - self.directed_count()
    }

    /// `(A, op, B)` triples sorted by `A`, then `B`; undirected edges list
    /// the lexicographically smaller name first.
    pub fn edge_triples(&self) -> Vec<(String, &'static str, String)> {
        let mut triples: Vec<_> = self
            .edges()
            .map(|e| {
                let (a, b) = (self.name(e.from), self.name(e.to));
                match e.kind {
                    EdgeType::Undirected if b < a => (b.to_string(), e.kind.op(), a.to_string()),
                    _ => (a.to_string(), e.kind.op(), b.to_string()),
                }
            })
            .collect();
        triples.sort_by(|x, y| (&x.0, &x.2, x.1).cmp(&(&y.0, &y.2, y.1)));
        triples
    }

    /// A directed cycle `v0 -> v1 -> ... -> v0` if the directed subgraph has
    /// one. The first node is repeated at the end.
    pub fn find_directed_cycle(&self) -> Option<Vec<VarId>> {
        #[derive(Clone, Copy, PartialEq)]
        enum State {
            New,
            OnStack,
            Done,
        }

        let n = self.names.len();
        let mut state = vec![State::New; n];
        for root in 0..n {
            if state[root] != State::New {
                continue;
            }
            // Iterative DFS; each frame holds a node and its remaining children.
            let mut path: Vec<VarId> = Vec::new();
            let mut stack: Vec<(VarId, Vec<VarId>)> = Vec::new();
            let root = VarId(root as u32);
            state[root.index()] = State::OnStack;
            path.push(root);
            stack.push((root, self.children(root)));

            while let Some((_, pending)) = stack.last_mut() {
                match pending.pop() {
                    Some(next) => match state[next.index()] {
                        State::New => {
                            state[next.index()] = State::OnStack;
                            path.push(next);
                            let children = self.children(next);
                            stack.push((next, children));
                        }
                        State::OnStack => {
                            let start = path.iter().position(|&v| v == next)?;
                            let mut cycle = path[start..].to_vec();
                            cycle.push(next);
                            return Some(cycle);
                        }
                        State::Done => {}
                    },
                    None => {
                        if let Some((node, _)) = stack.pop() {
                            state[node.index()] = State::Done;
                            path.pop();
                        }
                    }
                }
            }
        }
        None
    }

    /// Names along `ids`.
    pub fn path_names(&self, ids: &[VarId]) -> Vec<String> {
        ids.iter().map(|&v| self.name(v).to_string()).collect()
    }
}

impl fmt::Display for Pdag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (a, op, b) in self.edge_triples() {
            writeln!(f, "({}, {}, {})", a, op, b)?;
        }
        Ok(())
    }
}

#[cfg(feature = "serde")]
#[derive(serde::Serialize, serde::Deserialize)]
struct PdagRepr {
    names: Vec<String>,
    edges: Vec<Edge>,
}

#[cfg(feature = "serde")]
impl From<Pdag> for PdagRepr {
    fn from(pdag: Pdag) -> Self {
        Self {
            names: pdag.names.iter().map(|s| s.to_string()).collect(),
            edges: pdag.edges().collect(),
        }
    }
}

#[cfg(feature = "serde")]
impl TryFrom<PdagRepr> for Pdag {
    type Error = LearnError;

    fn try_from(repr: PdagRepr) -> Result<Self, Self::Error> {
        let mut pdag = Pdag::new(&repr.names);
        for edge in repr.edges {
            match edge.kind {
                EdgeType::Directed => pdag.add_directed(edge.from, edge.to)?,
                EdgeType::Undirected => pdag.add_undirected(edge.from, edge.to)?,
            }
        }
        Ok(pdag)
    }
}
