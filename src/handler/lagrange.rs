//! Exact constraint enforcement by Lagrange multipliers.

use crate::analysis::AnalysisModel;
use crate::domain::Domain;
use crate::error::Result;
use crate::fe::{FeElement, FeSource};
use crate::handler::{self, ConstraintHandler};
use crate::subdomain::Subdomain;
use crate::Tag;

/// Allocates one synthetic multiplier DOF group per constraint (one
/// multiplier per constraint equation) and couples it to the constrained
/// and retained DOFs with terms of magnitude `alpha`. The equation count
/// grows by one per SP constraint and by the constraint-matrix row count per
/// MP/MRMP constraint.
#[derive(Debug, Clone, Copy)]
pub struct LagrangeHandler {
    alpha: f64,
}

impl LagrangeHandler {
    /// `alpha` scales the coupling terms for conditioning; the constraint is
    /// enforced exactly regardless of its value.
    pub fn new(alpha: f64) -> Self {
        assert!(alpha > 0.0, "coupling factor must be positive");
        Self { alpha }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}

impl ConstraintHandler for LagrangeHandler {
    fn handle(
        &mut self,
        domain: &Domain,
        subdomains: &[Subdomain],
        model: &mut AnalysisModel,
        boundary: Option<&[Tag]>,
    ) -> Result<usize> {
        model.clear_all();
        handler::create_node_groups(domain, model);
        let boundary_count = handler::mark_boundary(model, boundary);
        handler::create_element_fes(domain, subdomains, model);

        for sp in domain.sp_constraints() {
            let node_group = model.node_group_index(sp.node());
            let multiplier = model.add_lagrange_group(sp.tag(), true, 1);
            model.add_fe(FeElement::new(
                FeSource::LagrangeSp {
                    sp: sp.tag(),
                    group: multiplier,
                    alpha: self.alpha,
                },
                vec![(node_group, sp.dof()), (multiplier, 0)],
            ));
        }

        for mp in domain.mp_constraints() {
            let constrained = model.node_group_index(mp.constrained_node());
            let multiplier = model.add_lagrange_group(mp.tag(), false, mp.num_constrained_dofs());

            let mut dofs: Vec<_> = mp.constrained_dofs().iter().map(|&d| (constrained, d)).collect();
            for (node, dof) in mp.retained_pairs() {
                dofs.push((model.node_group_index(node), dof));
            }
            for d in 0..mp.num_constrained_dofs() {
                dofs.push((multiplier, d));
            }
            model.add_fe(FeElement::new(
                FeSource::LagrangeMp {
                    mp: mp.tag(),
                    group: multiplier,
                    alpha: self.alpha,
                },
                dofs,
            ));
        }

        handler::finish(model);
        Ok(boundary_count)
    }

    fn method(&self) -> &'static str {
        "lagrange"
    }
}
