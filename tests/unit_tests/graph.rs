use proptest::prelude::*;

use parfem::element::LinearSpring;
use parfem::graph::Graph;
use parfem::node::Node;
use parfem::subdomain::Subdomain;

use super::models::spring_chain;

#[test]
fn chain_elements_are_adjacent_through_shared_nodes() {
    let domain = spring_chain(4, 1.0);
    let graph = Graph::element_connectivity(&domain);

    assert_eq!(graph.num_vertices(), 3);
    assert_eq!(graph.num_edges(), 2);
    assert!(graph.vertex(1).unwrap().is_adjacent_to(2));
    assert!(graph.vertex(2).unwrap().is_adjacent_to(3));
    assert!(!graph.vertex(1).unwrap().is_adjacent_to(3));
}

#[test]
fn subdomain_connectivity_links_subdomains_sharing_external_nodes() {
    let mut a = Subdomain::new(1);
    a.add_external_node(Node::new(10, 1, &[0.0])).unwrap();
    let mut b = Subdomain::new(2);
    b.add_external_node(Node::new(10, 1, &[0.0])).unwrap();
    let mut c = Subdomain::new(3);
    c.add_external_node(Node::new(20, 1, &[1.0])).unwrap();

    let graph = Graph::subdomain_connectivity(&[a, b, c]);
    assert_eq!(graph.num_vertices(), 3);
    assert_eq!(graph.num_edges(), 1);
    assert!(graph.vertex(1).unwrap().is_adjacent_to(2));
    assert!(!graph.vertex(1).unwrap().is_adjacent_to(3));
}

proptest! {
    /// Every edge of an element connectivity graph is present in both
    /// directions, for arbitrary two-node element meshes.
    #[test]
    fn element_connectivity_is_symmetric(
        pairs in proptest::collection::vec(
            (1usize..=8, 1usize..=8).prop_filter("springs need two distinct nodes", |(a, b)| a != b),
            1..12,
        )
    ) {
        let mut domain = parfem::domain::Domain::new();
        for tag in 1..=8 {
            domain.add_node(Node::new(tag, 1, &[tag as f64])).unwrap();
        }
        for (i, &(a, b)) in pairs.iter().enumerate() {
            domain
                .add_element(Box::new(LinearSpring::new(i + 1, a, b, 1.0).unwrap()))
                .unwrap();
        }

        let graph = Graph::element_connectivity(&domain);
        prop_assert_eq!(graph.num_vertices(), pairs.len());
        for vertex in graph.vertices() {
            for adjacent in vertex.adjacency() {
                prop_assert!(
                    graph.vertex(adjacent).unwrap().is_adjacent_to(vertex.tag()),
                    "edge {} -> {} has no reverse",
                    vertex.tag(),
                    adjacent
                );
            }
        }
    }
}
