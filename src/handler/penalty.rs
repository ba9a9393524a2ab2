//! Approximate constraint enforcement by penalty terms.

use crate::analysis::AnalysisModel;
use crate::domain::Domain;
use crate::error::Result;
use crate::fe::{FeElement, FeSource};
use crate::handler::{self, ConstraintHandler};
use crate::subdomain::Subdomain;
use crate::Tag;

/// Leaves every DOF numbered as if unconstrained and appends one synthetic
/// penalty FE element per constraint; violations are resisted in proportion
/// to `alpha`. The equation count is unchanged by constraints.
#[derive(Debug, Clone, Copy)]
pub struct PenaltyHandler {
    alpha: f64,
}

impl PenaltyHandler {
    /// `alpha` should dominate the largest stiffness in the model by several
    /// orders of magnitude.
    pub fn new(alpha: f64) -> Self {
        assert!(alpha > 0.0, "penalty factor must be positive");
        Self { alpha }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}

impl ConstraintHandler for PenaltyHandler {
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
            let group = model.node_group_index(sp.node());
            model.add_fe(FeElement::new(
                FeSource::PenaltySp {
                    sp: sp.tag(),
                    alpha: self.alpha,
                },
                vec![(group, sp.dof())],
            ));
        }

        for mp in domain.mp_constraints() {
            let constrained = model.node_group_index(mp.constrained_node());
            let mut dofs: Vec<_> = mp.constrained_dofs().iter().map(|&d| (constrained, d)).collect();
            for (node, dof) in mp.retained_pairs() {
                dofs.push((model.node_group_index(node), dof));
            }
            model.add_fe(FeElement::new(
                FeSource::PenaltyMp {
                    mp: mp.tag(),
                    alpha: self.alpha,
                },
                dofs,
            ));
        }

        handler::finish(model);
        Ok(boundary_count)
    }

    fn method(&self) -> &'static str {
        "penalty"
    }
}
