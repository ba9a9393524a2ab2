//! Shared model builders for the assembly and substructuring tests.

use parfem::analysis::{DenseSoe, StaticAnalysis, StaticIntegrator};
use parfem::domain::Domain;
use parfem::element::LinearSpring;
use parfem::handler::ConstraintHandler;
use parfem::node::Node;

/// A chain of `n` nodes (tags `1..=n`, one DOF each) joined by `n - 1`
/// springs of stiffness `k` (element tags `1..n`).
pub fn spring_chain(n: usize, k: f64) -> Domain {
    let mut domain = Domain::new();
    for tag in 1..=n {
        domain
            .add_node(Node::new(tag, 1, &[tag as f64 - 1.0]))
            .unwrap();
    }
    for tag in 1..n {
        domain
            .add_element(Box::new(LinearSpring::new(tag, tag, tag + 1, k).unwrap()))
            .unwrap();
    }
    domain
}

pub fn static_analysis(handler: Box<dyn ConstraintHandler>) -> StaticAnalysis {
    StaticAnalysis::new(
        handler,
        Box::new(StaticIntegrator::new()),
        Box::new(DenseSoe::new()),
    )
}
