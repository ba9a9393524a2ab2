//! Direct elimination of trivially removable constraints.

use log::warn;

use crate::analysis::AnalysisModel;
use crate::domain::Domain;
use crate::error::Result;
use crate::handler::{self, ConstraintHandler};
use crate::subdomain::Subdomain;
use crate::Tag;

/// Handles SP constraints (and identity MP constraints) by flagging the
/// constrained DOFs as eliminated; no synthetic FE elements are created and
/// the equation count drops by one per eliminated DOF.
///
/// An MP/MRMP constraint whose matrix is not the identity cannot be
/// represented this way. It is *ignored with a warning* and its constrained
/// DOFs stay numbered, a documented limitation of plain handling, kept
/// because changing it would change solved results.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainHandler;

impl PlainHandler {
    pub fn new() -> Self {
        Self
    }
}

impl ConstraintHandler for PlainHandler {
    fn handle(
        &mut self,
        domain: &Domain,
        subdomains: &[Subdomain],
        model: &mut AnalysisModel,
        boundary: Option<&[Tag]>,
    ) -> Result<usize> {
        model.clear_all();
        handler::create_node_groups(domain, model);

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

        for mp in domain.mp_constraints() {
            if !mp.is_identity() {
                warn!(
                    "MP constraint {}: matrix is not the identity, plain handling ignores it",
                    mp.tag()
                );
                continue;
            }
            let group = model.node_group_index(mp.constrained_node());
            for &dof in mp.constrained_dofs() {
                if !model.groups_mut()[group].mark_eliminated(dof) {
                    warn!(
                        "MP constraint {}: DOF {} of node {} is already claimed, skipping",
                        mp.tag(),
                        dof,
                        mp.constrained_node()
                    );
                }
            }
        }

        let boundary_count = handler::mark_boundary(model, boundary);
        handler::create_element_fes(domain, subdomains, model);
        handler::finish(model);
        Ok(boundary_count)
    }

    fn method(&self) -> &'static str {
        "plain"
    }
}
