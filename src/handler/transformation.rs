//! Exact constraint elimination by coordinate transformation.

use log::warn;
use rustc_hash::FxHashMap;

use crate::analysis::AnalysisModel;
use crate::constraint::MpConstraint;
use crate::domain::Domain;
use crate::error::Result;
use crate::fe::transformation::build_plan;
use crate::fe::{FeElement, FeSource};
use crate::handler::{self, ConstraintHandler};
use crate::subdomain::Subdomain;
use crate::Tag;

/// Eliminates MP/MRMP-constrained DOFs exactly by mapping them through the
/// constraint matrix onto the retained nodes' equations. Elements touching a
/// constrained node are wrapped so that `Tᵀ K T` is assembled against the
/// modified DOF list. The equation count drops by the eliminated-DOF count,
/// as under plain handling, but general constraint matrices are supported.
/// SP constraints are eliminated directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformationHandler;

impl TransformationHandler {
    pub fn new() -> Self {
        Self
    }
}

impl ConstraintHandler for TransformationHandler {
    fn handle(
        &mut self,
        domain: &Domain,
        subdomains: &[Subdomain],
        model: &mut AnalysisModel,
        boundary: Option<&[Tag]>,
    ) -> Result<usize> {
        model.clear_all();

        // One MP constraint may claim a node; the first wins, later ones are
        // ignored with a warning.
        let mut constraint_of: FxHashMap<Tag, &MpConstraint> = FxHashMap::default();
        for mp in domain.mp_constraints() {
            if constraint_of.contains_key(&mp.constrained_node()) {
                warn!(
                    "MP constraint {}: node {} is already constrained by another MP constraint, ignoring",
                    mp.tag(),
                    mp.constrained_node()
                );
                continue;
            }
            constraint_of.insert(mp.constrained_node(), mp);
        }

        for node in domain.nodes() {
            if constraint_of.contains_key(&node.tag()) {
                model.add_transformed_group(node.tag(), node.num_dofs());
            } else {
                model.add_node_group(node.tag(), node.num_dofs());
            }
        }

        for (&node, mp) in &constraint_of {
            let group = model.node_group_index(node);
            for &dof in mp.constrained_dofs() {
                if !model.groups_mut()[group].mark_eliminated(dof) {
                    warn!(
                        "MP constraint {}: DOF {} of node {} is already claimed, skipping",
                        mp.tag(),
                        dof,
                        node
                    );
                }
            }
        }

        for sp in domain.sp_constraints() {
            let group = model.node_group_index(sp.node());
            if !model.groups_mut()[group].mark_eliminated(sp.dof()) {
                warn!(
                    "SP constraint {}: DOF {} of node {} is already claimed, skipping",
                    sp.tag(),
                    sp.dof(),
                    sp.node()
                );
            }
        }

        let boundary_count = handler::mark_boundary(model, boundary);

        for element in domain.elements() {
            let touches_constrained = element
                .node_tags()
                .iter()
                .any(|tag| constraint_of.contains_key(tag));
            if !touches_constrained {
                let dofs = handler::element_dofs(domain, model, element.tag());
                model.add_fe(FeElement::new(FeSource::Element(element.tag()), dofs));
                continue;
            }

            let element_nodes: Vec<(Tag, usize)> = element
                .node_tags()
                .iter()
                .map(|&tag| {
                    let node = domain
                        .node(tag)
                        .unwrap_or_else(|| panic!("node {} disappeared while handling", tag));
                    (tag, node.num_dofs())
                })
                .collect();
            let plan = build_plan(&element_nodes, |tag| constraint_of.get(&tag).copied());
            let dofs = plan
                .dofs
                .iter()
                .map(|&(node, dof)| (model.node_group_index(node), dof))
                .collect();
            model.add_fe(FeElement::with_transform(
                FeSource::TransformationElement(element.tag()),
                dofs,
                plan.t,
            ));
        }

        // Subdomain macro-elements assemble against untransformed interface
        // DOFs; constraining an interface node is not supported here.
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

        handler::finish(model);
        Ok(boundary_count)
    }

    fn method(&self) -> &'static str {
        "transformation"
    }
}
