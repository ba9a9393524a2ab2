//! The partitioner contract and a default greedy implementation.
//!
//! Sophisticated partitioning heuristics are external collaborators; the
//! crate only fixes the contract and ships a BFS-based partitioner good
//! enough for tests and small models.

use rustc_hash::FxHashMap;

use crate::error::{ModelError, Result};
use crate::graph::Graph;
use crate::Tag;

/// Assigns graph vertices to partitions and proposes load-rebalancing moves.
pub trait Partitioner: Send {
    /// Assigns every vertex of `graph` to one of `num_partitions` partitions.
    /// Returns a map from vertex tag to partition id in `0..num_partitions`.
    fn partition(&mut self, graph: &Graph, num_partitions: usize) -> Result<FxHashMap<usize, usize>>;

    /// Consulted with the subdomain connectivity graph (vertex weights are
    /// measured subdomain costs). Returns `(overloaded, underloaded)`
    /// subdomain pairs that should shed load; an empty list means the
    /// partition is considered balanced.
    fn balance(&mut self, _subdomain_graph: &Graph) -> Result<Vec<(Tag, Tag)>> {
        Ok(Vec::new())
    }
}

/// Grows partitions by breadth-first search from minimum-degree seeds.
///
/// Each partition is filled up to `ceil(n / k)` vertices before the next one
/// is started, so partition sizes differ by at most one. Disconnected
/// components are handled by reseeding, the same traversal restart used for
/// Cuthill-McKee style orderings.
#[derive(Debug, Clone, Default)]
pub struct GreedyBfsPartitioner {
    /// A subdomain is considered overloaded when its cost exceeds the
    /// lightest subdomain's cost by this factor.
    pub imbalance_factor: f64,
}

impl GreedyBfsPartitioner {
    pub fn new() -> Self {
        Self {
            imbalance_factor: 1.5,
        }
    }
}

impl Partitioner for GreedyBfsPartitioner {
    fn partition(&mut self, graph: &Graph, num_partitions: usize) -> Result<FxHashMap<usize, usize>> {
        let n = graph.num_vertices();
        if num_partitions == 0 || num_partitions > n {
            return Err(ModelError::Partitioner(format!(
                "cannot split {} vertices into {} partitions",
                n, num_partitions
            )));
        }

        // Ceiling division so that the last partition is never starved.
        let target = (n + num_partitions - 1) / num_partitions;
        let mut assignment = FxHashMap::default();
        let mut current = 0usize;
        let mut filled = 0usize;
        let mut queue = std::collections::VecDeque::new();

        let place = |tag: usize,
                         assignment: &mut FxHashMap<usize, usize>,
                         current: &mut usize,
                         filled: &mut usize| {
            assignment.insert(tag, *current);
            *filled += 1;
            if *filled == target && *current + 1 < num_partitions {
                *current += 1;
                *filled = 0;
            }
        };

        while assignment.len() < n {
            // Seed from the unassigned vertex of least degree.
            let seed = graph
                .vertices()
                .iter()
                .filter(|v| !assignment.contains_key(&v.tag()))
                .min_by_key(|v| v.degree())
                .map(|v| v.tag())
                .expect("unassigned vertex must exist while the loop runs");
            queue.push_back(seed);

            while let Some(tag) = queue.pop_front() {
                if assignment.contains_key(&tag) {
                    continue;
                }
                place(tag, &mut assignment, &mut current, &mut filled);
                let vertex = graph.vertex(tag).expect("queued tags come from the graph");
                for adjacent in vertex.adjacency() {
                    if !assignment.contains_key(&adjacent) {
                        queue.push_back(adjacent);
                    }
                }
            }
        }

        Ok(assignment)
    }

    fn balance(&mut self, subdomain_graph: &Graph) -> Result<Vec<(Tag, Tag)>> {
        let mut vertices: Vec<_> = subdomain_graph.vertices().iter().collect();
        if vertices.len() < 2 {
            return Ok(Vec::new());
        }
        vertices.sort_by(|a, b| a.weight().total_cmp(&b.weight()));
        let lightest = vertices[0];
        let heaviest = vertices[vertices.len() - 1];
        if heaviest.weight() > self.imbalance_factor * lightest.weight().max(f64::EPSILON) {
            Ok(vec![(heaviest.ref_tag(), lightest.ref_tag())])
        } else {
            Ok(Vec::new())
        }
    }
}
