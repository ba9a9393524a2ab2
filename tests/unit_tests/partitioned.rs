use std::sync::{Arc, Mutex};

use nalgebra::DVector;

use parfem::constraint::SpConstraint;
use parfem::domain::{Domain, NodalLoad};
use parfem::element::LinearSpring;
use parfem::error::ModelError;
use parfem::handler::{ConstraintHandler, PlainHandler};
use parfem::node::Node;
use parfem::partitioned::PartitionedDomain;
use parfem::partitioner::GreedyBfsPartitioner;
use parfem::recorder::Recorder;
use parfem::subdomain::Subdomain;
use parfem::Tag;

fn plain() -> Box<dyn ConstraintHandler> {
    Box::new(PlainHandler::new())
}

/// A 10-element spring chain (nodes 1..=11) with the first node fixed and a
/// unit load at the tip.
fn chain_model() -> PartitionedDomain {
    let mut pd = PartitionedDomain::new(Box::new(GreedyBfsPartitioner::new()));
    for tag in 1..=11 {
        pd.add_node(Node::new(tag, 1, &[tag as f64 - 1.0])).unwrap();
    }
    for tag in 1..=10 {
        pd.add_element(Box::new(LinearSpring::new(tag, tag, tag + 1, 1.0).unwrap()))
            .unwrap();
    }
    pd.add_sp_constraint(SpConstraint::new(1, 1, 0, 0.0)).unwrap();
    pd.add_nodal_load(NodalLoad::constant(1, 11, DVector::from_column_slice(&[1.0])))
        .unwrap();
    pd
}

#[test]
fn partitioning_preserves_the_element_count() {
    let mut pd = chain_model();
    assert_eq!(pd.num_elements(), 10);

    pd.build_element_graph().unwrap();
    pd.partition(2, false, 0, &plain).unwrap();

    assert_eq!(pd.num_subdomains(), 2);
    assert_eq!(pd.num_elements(), 10);
    assert_eq!(pd.ungrouped().num_elements(), 0);

    pd.commit().unwrap();
    assert_eq!(pd.num_elements(), 10);
}

#[test]
fn using_main_keeps_one_share_ungrouped() {
    let mut pd = chain_model();
    pd.build_element_graph().unwrap();
    pd.partition(2, true, 0, &plain).unwrap();

    assert_eq!(pd.num_subdomains(), 1);
    assert_eq!(pd.num_elements(), 10);
    assert!(pd.ungrouped().num_elements() > 0);
}

#[test]
fn interior_nodes_move_and_shared_nodes_are_cloned() {
    let mut pd = chain_model();
    pd.build_element_graph().unwrap();
    pd.partition(2, false, 0, &plain).unwrap();

    // The fixed node and the loaded node are pinned to the parent; the
    // cut node is shared, so its master also stays.
    assert!(pd.ungrouped().has_node(1));
    assert!(pd.ungrouped().has_node(11));

    for subdomain in pd.subdomains() {
        for &external in subdomain.external_node_tags() {
            assert!(
                pd.ungrouped().has_node(external),
                "external node {} lost its master copy",
                external
            );
        }
    }

    // Every interior chain node now lives in exactly one place.
    let owners = |tag: Tag| -> usize {
        usize::from(pd.ungrouped().has_node(tag))
            + pd.subdomains().iter().filter(|s| s.has_node(tag)).count()
    };
    for tag in 2..=10 {
        assert!(owners(tag) >= 1, "node {} vanished", tag);
    }
    let interior: usize = (2..=10)
        .filter(|&tag| !pd.ungrouped().has_node(tag) && owners(tag) == 1)
        .count();
    assert!(interior > 0, "no node became subdomain-internal");
}

#[test]
fn shared_interface_nodes_cannot_be_removed_from_the_parent() {
    let mut pd = chain_model();
    pd.build_element_graph().unwrap();
    pd.partition(2, false, 0, &plain).unwrap();

    // Every external node has clones inside a subdomain, so its master must
    // stay put; the next handling pass still resolves the interface.
    let shared = pd.subdomains()[0].external_node_tags()[0];
    assert!(matches!(
        pd.remove_node(shared),
        Err(ModelError::NodeShared(tag)) if tag == shared
    ));
    assert!(pd.ungrouped().has_node(shared));
    for subdomain in pd.subdomains() {
        for &external in subdomain.external_node_tags() {
            assert!(pd.ungrouped().has_node(external));
        }
    }
}

#[test]
fn new_step_advances_every_partition_clock() {
    let mut pd = chain_model();
    pd.build_element_graph().unwrap();
    pd.partition(2, false, 0, &plain).unwrap();

    pd.new_step(0.25);
    assert_eq!(pd.ungrouped().current_time(), 0.25);
    for subdomain in pd.subdomains() {
        assert_eq!(subdomain.domain().current_time(), 0.25);
    }
}

#[test]
fn partition_twice_is_rejected() {
    let mut pd = chain_model();
    pd.build_element_graph().unwrap();
    pd.partition(2, false, 0, &plain).unwrap();
    assert!(matches!(
        pd.partition(2, false, 0, &plain),
        Err(ModelError::AlreadyPartitioned)
    ));
    assert!(matches!(
        pd.build_element_graph(),
        Err(ModelError::AlreadyPartitioned)
    ));
}

#[test]
fn constraints_and_loads_probe_subdomains_for_their_node() {
    let mut pd = chain_model();
    pd.build_element_graph().unwrap();
    pd.partition(2, false, 0, &plain).unwrap();

    // Find a node that moved inside a subdomain and constrain it.
    let internal = (2..=10)
        .find(|&tag| !pd.ungrouped().has_node(tag))
        .expect("partitioning moved at least one node inside");
    pd.add_sp_constraint(SpConstraint::new(99, internal, 0, 0.0)).unwrap();
    pd.add_nodal_load(NodalLoad::constant(99, internal, DVector::from_column_slice(&[1.0])))
        .unwrap();

    let owner = pd
        .subdomains()
        .iter()
        .find(|s| s.has_node(internal))
        .expect("an internal node is owned by some subdomain");
    assert!(owner.domain().sp_constraint(99).is_some());
    assert_eq!(owner.domain().nodal_loads().len(), 1);

    assert!(matches!(
        pd.add_sp_constraint(SpConstraint::new(100, 1234, 0, 0.0)),
        Err(ModelError::NodeNotInModel(1234))
    ));
}

#[test]
fn removals_scan_the_subdomains() {
    let mut pd = chain_model();
    pd.build_element_graph().unwrap();
    pd.partition(2, false, 0, &plain).unwrap();

    // All elements moved into subdomains; removal must still find them.
    pd.remove_element(5).unwrap();
    assert_eq!(pd.num_elements(), 9);
    assert!(matches!(
        pd.remove_element(5),
        Err(ModelError::ElementNotFound(5))
    ));
}

#[test]
fn subdomain_round_trip_restores_the_count() {
    let mut pd = PartitionedDomain::new(Box::new(GreedyBfsPartitioner::new()));
    assert_eq!(pd.num_subdomains(), 0);
    pd.add_subdomain(Subdomain::new(5)).unwrap();
    assert_eq!(pd.num_subdomains(), 1);
    assert!(matches!(
        pd.add_subdomain(Subdomain::new(5)),
        Err(ModelError::DuplicateTag(5))
    ));
    pd.remove_subdomain(5).unwrap();
    assert_eq!(pd.num_subdomains(), 0);
}

/// Counts how many stores (parent and subdomains) invoked it.
#[derive(Clone)]
struct CountingRecorder {
    calls: Arc<Mutex<Vec<usize>>>,
}

impl Recorder for CountingRecorder {
    fn record(&mut self, domain: &Domain) -> eyre::Result<()> {
        self.calls.lock().unwrap().push(domain.num_nodes());
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Recorder> {
        Box::new(self.clone())
    }
}

#[test]
fn recorders_are_replicated_onto_every_subdomain() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut pd = chain_model();
    pd.add_recorder(Box::new(CountingRecorder { calls: calls.clone() }));

    pd.build_element_graph().unwrap();
    pd.partition(2, false, 0, &plain).unwrap();
    pd.commit().unwrap();

    // One invocation for the parent store and one per subdomain.
    assert_eq!(calls.lock().unwrap().len(), 3);
}
