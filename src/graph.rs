//! Weighted connectivity graphs over elements or subdomains.
//!
//! Graphs are built fresh on every partition or balance request and handed to
//! the external [`Partitioner`](crate::partitioner::Partitioner). Adjacency is
//! undirected: inserting an edge always inserts it in both directions.

use std::collections::BTreeSet;

use itertools::Itertools;
use nalgebra_sparse::pattern::SparsityPattern;
use rustc_hash::FxHashMap;

use crate::domain::Domain;
use crate::subdomain::Subdomain;
use crate::Tag;

/// A graph vertex: identity, the model entity it stands for, a scalar cost
/// weight and its adjacency set.
#[derive(Debug, Clone)]
pub struct Vertex {
    tag: usize,
    /// Tag of the element or subdomain this vertex represents.
    ref_tag: Tag,
    weight: f64,
    adjacency: BTreeSet<usize>,
}

impl Vertex {
    pub fn new(tag: usize, ref_tag: Tag, weight: f64) -> Self {
        Self {
            tag,
            ref_tag,
            weight,
            adjacency: BTreeSet::new(),
        }
    }

    pub fn tag(&self) -> usize {
        self.tag
    }

    pub fn ref_tag(&self) -> Tag {
        self.ref_tag
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn adjacency(&self) -> impl Iterator<Item = usize> + '_ {
        self.adjacency.iter().copied()
    }

    pub fn degree(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_adjacent_to(&self, other: usize) -> bool {
        self.adjacency.contains(&other)
    }
}

/// An undirected weighted graph keyed by vertex tag.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    vertices: Vec<Vertex>,
    index: FxHashMap<usize, usize>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a vertex. Returns `false` if the tag is already present.
    pub fn add_vertex(&mut self, vertex: Vertex) -> bool {
        if self.index.contains_key(&vertex.tag) {
            return false;
        }
        self.index.insert(vertex.tag, self.vertices.len());
        self.vertices.push(vertex);
        true
    }

    /// Inserts the undirected edge `a -- b`.
    ///
    /// # Panics
    ///
    /// Panics if either endpoint has not been added; edges between unknown
    /// vertices indicate a graph-construction bug.
    pub fn add_edge(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        let ia = *self.index.get(&a).expect("edge endpoint must be a known vertex");
        let ib = *self.index.get(&b).expect("edge endpoint must be a known vertex");
        self.vertices[ia].adjacency.insert(b);
        self.vertices[ib].adjacency.insert(a);
    }

    pub fn vertex(&self, tag: usize) -> Option<&Vertex> {
        self.index.get(&tag).map(|&i| &self.vertices[i])
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_edges(&self) -> usize {
        self.vertices.iter().map(Vertex::degree).sum::<usize>() / 2
    }

    /// Builds the element connectivity graph of a domain: one vertex per
    /// element (weight 1), with elements adjacent whenever they share a node.
    pub fn element_connectivity(domain: &Domain) -> Graph {
        let mut graph = Graph::new();
        for element in domain.elements() {
            graph.add_vertex(Vertex::new(element.tag(), element.tag(), 1.0));
        }

        // Invert the element -> node map so that each node lists the elements
        // touching it; every pair in such a list becomes an edge.
        let mut node_elements: FxHashMap<Tag, Vec<Tag>> = FxHashMap::default();
        for element in domain.elements() {
            for &node in element.node_tags() {
                node_elements.entry(node).or_default().push(element.tag());
            }
        }
        for elements in node_elements.values() {
            for (a, b) in elements.iter().copied().tuple_combinations() {
                graph.add_edge(a, b);
            }
        }
        graph
    }

    /// Builds the subdomain connectivity graph: one vertex per subdomain,
    /// weighted by its measured analysis cost, with subdomains adjacent
    /// whenever they share an external node. This is the input of
    /// [`Partitioner::balance`](crate::partitioner::Partitioner::balance).
    pub fn subdomain_connectivity(subdomains: &[Subdomain]) -> Graph {
        let mut graph = Graph::new();
        for subdomain in subdomains {
            graph.add_vertex(Vertex::new(subdomain.tag(), subdomain.tag(), subdomain.cost()));
        }

        let mut node_subdomains: FxHashMap<Tag, Vec<Tag>> = FxHashMap::default();
        for subdomain in subdomains {
            for &node in subdomain.external_node_tags() {
                node_subdomains.entry(node).or_default().push(subdomain.tag());
            }
        }
        for sharers in node_subdomains.values() {
            for (a, b) in sharers.iter().copied().tuple_combinations() {
                graph.add_edge(a, b);
            }
        }
        graph
    }

    /// Exports the adjacency structure (including the diagonal) as a CSR
    /// sparsity pattern, the exchange format expected by external solvers and
    /// reordering code. Row `i` corresponds to `self.vertices()[i]`.
    pub fn sparsity_pattern(&self) -> SparsityPattern {
        let n = self.num_vertices();
        // Vertex tag -> dense row index.
        let row_of: FxHashMap<usize, usize> = self
            .vertices
            .iter()
            .enumerate()
            .map(|(i, v)| (v.tag, i))
            .collect();

        let mut offsets = Vec::with_capacity(n + 1);
        let mut indices = Vec::new();
        offsets.push(0);
        for vertex in &self.vertices {
            let mut row: Vec<usize> = vertex.adjacency.iter().map(|t| row_of[t]).collect();
            row.push(row_of[&vertex.tag]);
            row.sort_unstable();
            indices.extend(row);
            offsets.push(indices.len());
        }

        SparsityPattern::try_from_offsets_and_indices(n, n, offsets, indices)
            .expect("adjacency sets always produce a valid pattern")
    }
}
