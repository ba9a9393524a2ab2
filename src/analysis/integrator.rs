//! Integrators: the policy that turns FE elements into system contributions
//! and solutions back into trial state.

use nalgebra::{DMatrix, DVector};

use crate::analysis::AnalysisModel;
use crate::domain::Domain;
use crate::dof::{DofGroup, DofGroupKind, DofState};
use crate::error::Result;
use crate::fe::{AssemblyCtx, FeElement};
use crate::Tag;

/// Forms element contributions and maps solution increments back onto the
/// model.
pub trait Integrator: Send {
    fn form_ele_tangent(
        &self,
        fe: &FeElement,
        groups: &[DofGroup],
        ctx: &mut AssemblyCtx<'_>,
    ) -> Result<DMatrix<f64>>;

    fn form_ele_residual(
        &self,
        fe: &FeElement,
        groups: &[DofGroup],
        ctx: &mut AssemblyCtx<'_>,
    ) -> Result<DVector<f64>>;

    /// Applies the solved increment `x` to nodes and multiplier groups.
    fn update(&self, model: &mut AnalysisModel, domain: &mut Domain, x: &DVector<f64>) -> Result<()>;

    /// Notification that the model was re-handled.
    fn domain_changed(&mut self) {}

    fn commit(&self, domain: &mut Domain) -> Result<()> {
        domain.commit();
        Ok(())
    }
}

/// Incremental static integrator: the tangent is the element stiffness, the
/// residual is the unbalanced force at the current trial state, and the
/// solution is a displacement increment.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticIntegrator;

impl StaticIntegrator {
    pub fn new() -> Self {
        Self
    }
}

impl Integrator for StaticIntegrator {
    fn form_ele_tangent(
        &self,
        fe: &FeElement,
        groups: &[DofGroup],
        ctx: &mut AssemblyCtx<'_>,
    ) -> Result<DMatrix<f64>> {
        fe.tangent(groups, ctx)
    }

    fn form_ele_residual(
        &self,
        fe: &FeElement,
        groups: &[DofGroup],
        ctx: &mut AssemblyCtx<'_>,
    ) -> Result<DVector<f64>> {
        fe.residual(groups, ctx)
    }

    fn update(&self, model: &mut AnalysisModel, domain: &mut Domain, x: &DVector<f64>) -> Result<()> {
        for group in model.groups_mut() {
            match group.kind() {
                DofGroupKind::Node(tag) | DofGroupKind::Transformed(tag) => {
                    let node = domain
                        .node_mut(tag)
                        .unwrap_or_else(|| panic!("DOF group references missing node {}", tag));
                    for (d, state) in group.states().iter().enumerate() {
                        if let Some(eqn) = state.equation() {
                            let current = node.trial_disp()[d];
                            node.set_trial_disp_component(d, current + x[eqn]);
                        }
                    }
                }
                DofGroupKind::Lagrange { .. } => {
                    for d in 0..group.num_dofs() {
                        if let Some(eqn) = group.state(d).equation() {
                            group.add_value(d, x[eqn]);
                        }
                    }
                }
            }
        }

        impose_eliminated_sp_values(model, domain);
        propagate_transformed_dofs(model, domain);
        Ok(())
    }
}

/// Writes prescribed values onto DOFs that were eliminated by direct
/// substitution (Plain/Transformation handling of SP constraints). Penalty
/// and Lagrange enforce prescribed values through residuals instead.
pub(crate) fn impose_eliminated_sp_values(model: &AnalysisModel, domain: &mut Domain) {
    let time = domain.current_time();
    let imposed: Vec<(Tag, usize, f64)> = domain
        .sp_constraints()
        .iter()
        .filter_map(|sp| {
            let group = model.try_node_group_index(sp.node())?;
            (model.group(group).state(sp.dof()) == DofState::Eliminated)
                .then(|| (sp.node(), sp.dof(), sp.value_at(time)))
        })
        .collect();
    for (node, dof, value) in imposed {
        domain
            .node_mut(node)
            .expect("SP constraint validated on insertion")
            .set_trial_disp_component(dof, value);
    }
}

/// Recomputes `u_c = C u_r` for every transformed node so that its eliminated
/// DOFs track the retained solution.
pub(crate) fn propagate_transformed_dofs(model: &AnalysisModel, domain: &mut Domain) {
    let transformed: Vec<Tag> = model
        .groups()
        .iter()
        .filter_map(|g| match g.kind() {
            DofGroupKind::Transformed(tag) => Some(tag),
            _ => None,
        })
        .collect();
    if transformed.is_empty() {
        return;
    }

    for node in transformed {
        let updates: Vec<(usize, f64)> = domain
            .mp_constraints()
            .iter()
            .filter(|mp| mp.constrained_node() == node)
            .flat_map(|mp| {
                let u_r: Vec<f64> = mp
                    .retained_pairs()
                    .map(|(retained, dof)| {
                        domain
                            .node(retained)
                            .expect("MP constraint validated on insertion")
                            .trial_disp()[dof]
                    })
                    .collect();
                mp.constrained_dofs()
                    .iter()
                    .enumerate()
                    .map(|(row, &dof)| {
                        let value = mp
                            .matrix()
                            .row(row)
                            .iter()
                            .zip(&u_r)
                            .map(|(c, u)| c * u)
                            .sum();
                        (dof, value)
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        let node_ref = domain
            .node_mut(node)
            .expect("transformed group references a domain node");
        for (dof, value) in updates {
            node_ref.set_trial_disp_component(dof, value);
        }
    }
}
