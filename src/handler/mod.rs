//! The constraint handler family.
//!
//! A handler consumes the domain's node, element and constraint sets and
//! populates an [`AnalysisModel`]: one DOF group per node and one FE element
//! per mesh element, subdomain and constraint equation. The four variants
//! differ only in how constraints are represented: direct elimination
//! (Plain), penalty terms (Penalty), extra multiplier equations (Lagrange)
//! or exact coordinate transformation (Transformation), and are numerically
//! interchangeable on models they all support.

mod lagrange;
mod penalty;
mod plain;
mod transformation;

pub use lagrange::LagrangeHandler;
pub use penalty::PenaltyHandler;
pub use plain::PlainHandler;
pub use transformation::TransformationHandler;

use crate::analysis::AnalysisModel;
use crate::domain::Domain;
use crate::error::Result;
use crate::fe::{FeDof, FeElement, FeSource};
use crate::subdomain::Subdomain;
use crate::Tag;

/// Turns the constraint set into DOF groups and FE elements.
///
/// By the end of `handle` every node has exactly one DOF group (entries
/// numbered, eliminated, or reserved for the trailing boundary block) and
/// every element, subdomain and constraint equation has its assembly object.
/// Returns the number of boundary DOFs set aside for the optional boundary
/// node list.
pub trait ConstraintHandler: Send {
    fn handle(
        &mut self,
        domain: &Domain,
        subdomains: &[Subdomain],
        model: &mut AnalysisModel,
        boundary: Option<&[Tag]>,
    ) -> Result<usize>;

    /// Method identity, used for diagnostics and serialization.
    fn method(&self) -> &'static str;
}

/// Creates one ordinary DOF group per domain node.
pub(crate) fn create_node_groups(domain: &Domain, model: &mut AnalysisModel) {
    for node in domain.nodes() {
        model.add_node_group(node.tag(), node.num_dofs());
    }
}

/// Flags the still-unclaimed DOFs of the boundary nodes for the trailing
/// equation block. Returns the number of DOFs set aside.
pub(crate) fn mark_boundary(model: &mut AnalysisModel, boundary: Option<&[Tag]>) -> usize {
    let Some(boundary) = boundary else { return 0 };
    let mut count = 0;
    for &node in boundary {
        let index = model.node_group_index(node);
        count += model.groups_mut()[index].mark_boundary_last();
    }
    count
}

/// DOF list of an ordinary element: the full concatenation of its nodes'
/// groups, in element-local order.
///
/// # Panics
///
/// Panics if the element's DOF count disagrees with the sum of its nodes'
/// DOF counts; elements are expected to attach to every DOF of their nodes.
pub(crate) fn element_dofs(domain: &Domain, model: &AnalysisModel, element: Tag) -> Vec<FeDof> {
    let element = domain
        .element(element)
        .unwrap_or_else(|| panic!("element {} disappeared while handling", element));
    let mut dofs = Vec::with_capacity(element.num_dofs());
    for &node in element.node_tags() {
        let group = model.node_group_index(node);
        for d in 0..model.group(group).num_dofs() {
            dofs.push((group, d));
        }
    }
    assert_eq!(
        dofs.len(),
        element.num_dofs(),
        "element {} spans {} node DOFs but declares {}",
        element.tag(),
        dofs.len(),
        element.num_dofs()
    );
    dofs
}

/// Creates the FE element of every mesh element and every subdomain
/// macro-element.
pub(crate) fn create_element_fes(
    domain: &Domain,
    subdomains: &[Subdomain],
    model: &mut AnalysisModel,
) {
    let element_tags: Vec<Tag> = domain.elements().map(|e| e.tag()).collect();
    for tag in element_tags {
        let dofs = element_dofs(domain, model, tag);
        model.add_fe(FeElement::new(FeSource::Element(tag), dofs));
    }
    for subdomain in subdomains {
        let mut dofs = Vec::new();
        for &node in subdomain.external_node_tags() {
            let group = model.node_group_index(node);
            for d in 0..model.group(group).num_dofs() {
                dofs.push((group, d));
            }
        }
        model.add_fe(FeElement::new(FeSource::Subdomain(subdomain.tag()), dofs));
    }
}

/// Shared tail of every handler: number equations, derive the FE index
/// arrays.
pub(crate) fn finish(model: &mut AnalysisModel) {
    model.number_equations();
    model.finalize_ids();
}
