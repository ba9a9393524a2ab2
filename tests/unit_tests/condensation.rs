use nalgebra::DVector;

use parfem::constraint::SpConstraint;
use parfem::domain::NodalLoad;
use parfem::element::LinearSpring;
use parfem::handler::{ConstraintHandler, PlainHandler};
use parfem::node::Node;
use parfem::partitioned::PartitionedDomain;
use parfem::partitioner::GreedyBfsPartitioner;

use super::models::{spring_chain, static_analysis};

fn plain() -> Box<dyn ConstraintHandler> {
    Box::new(PlainHandler::new())
}

#[test]
fn partitioned_solve_matches_the_monolithic_solution() {
    // Monolithic reference: three springs of stiffness 2, fixed base, unit
    // tip load.
    let mut reference = spring_chain(4, 2.0);
    reference
        .add_sp_constraint(SpConstraint::new(1, 1, 0, 0.0))
        .unwrap();
    reference
        .add_nodal_load(NodalLoad::constant(1, 4, DVector::from_column_slice(&[1.0])))
        .unwrap();
    let mut analysis = static_analysis(plain());
    reference.apply_load(1.0);
    analysis.analyze_step(&mut reference, &mut [], None).unwrap();

    // The same model split into two subdomains solved through condensed
    // macro-elements.
    let mut pd = PartitionedDomain::new(Box::new(GreedyBfsPartitioner::new()));
    for tag in 1..=4 {
        pd.add_node(Node::new(tag, 1, &[tag as f64 - 1.0])).unwrap();
    }
    for tag in 1..=3 {
        pd.add_element(Box::new(LinearSpring::new(tag, tag, tag + 1, 2.0).unwrap()))
            .unwrap();
    }
    pd.add_sp_constraint(SpConstraint::new(1, 1, 0, 0.0)).unwrap();
    pd.add_nodal_load(NodalLoad::constant(1, 4, DVector::from_column_slice(&[1.0])))
        .unwrap();
    pd.build_element_graph().unwrap();
    pd.partition(2, false, 0, &plain).unwrap();

    let mut parent_analysis = static_analysis(plain());
    pd.analyze_step(&mut parent_analysis, 1.0).unwrap();

    for tag in 1..=4 {
        let expected = reference.node(tag).unwrap().trial_disp()[0];
        let actual = pd
            .node(tag)
            .unwrap_or_else(|| panic!("node {} disappeared from the partition", tag))
            .trial_disp()[0];
        assert!(
            (actual - expected).abs() < 1e-10,
            "node {}: partitioned {} vs monolithic {}",
            tag,
            actual,
            expected
        );
    }

    // A converged partition stays put on the next step.
    pd.commit().unwrap();
    pd.analyze_step(&mut parent_analysis, 1.0).unwrap();
    for tag in 1..=4 {
        let expected = reference.node(tag).unwrap().trial_disp()[0];
        let actual = pd.node(tag).unwrap().trial_disp()[0];
        assert!((actual - expected).abs() < 1e-10);
    }
}

#[test]
fn subdomain_costs_feed_the_balance_graph() {
    let mut pd = PartitionedDomain::new(Box::new(GreedyBfsPartitioner::new()));
    for tag in 1..=5 {
        pd.add_node(Node::new(tag, 1, &[tag as f64])).unwrap();
    }
    for tag in 1..=4 {
        pd.add_element(Box::new(LinearSpring::new(tag, tag, tag + 1, 1.0).unwrap()))
            .unwrap();
    }
    pd.add_sp_constraint(SpConstraint::new(1, 1, 0, 0.0)).unwrap();
    pd.add_nodal_load(NodalLoad::constant(1, 5, DVector::from_column_slice(&[1.0])))
        .unwrap();
    pd.build_element_graph().unwrap();
    pd.partition(2, false, 0, &plain).unwrap();

    let mut analysis = static_analysis(plain());
    pd.analyze_step(&mut analysis, 1.0).unwrap();

    for subdomain in pd.subdomains() {
        assert!(
            subdomain.cost() > 0.0,
            "subdomain {} did no measured work",
            subdomain.tag()
        );
    }
    // The rebalance consultation runs as part of commit.
    pd.commit().unwrap();
}
