//! The analysis model and the static analysis driver.
//!
//! [`AnalysisModel`] is the container a constraint handler populates: one DOF
//! group per node (plus synthetic multiplier groups) and one FE element per
//! mesh element or constraint equation. It owns the equation numbering and
//! the handled-stamp bookkeeping that ties an analysis configuration to one
//! state of the domain.

mod integrator;
mod soe;

pub use integrator::{Integrator, StaticIntegrator};
pub(crate) use integrator::{impose_eliminated_sp_values, propagate_transformed_dofs};
pub use soe::{DenseSoe, LinearSoe};

use rustc_hash::FxHashMap;

use crate::constraint::MpConstraint;
use crate::domain::Domain;
use crate::dof::{DofGroup, DofGroupKind, DofState};
use crate::error::Result;
use crate::fe::{AssemblyCtx, FeElement};
use crate::handler::ConstraintHandler;
use crate::subdomain::Subdomain;
use crate::Tag;

/// DOF groups, FE elements and the equation numbering for one analysis
/// configuration.
#[derive(Debug, Default)]
pub struct AnalysisModel {
    dof_groups: Vec<DofGroup>,
    node_group: FxHashMap<Tag, usize>,
    fe_elements: Vec<FeElement>,
    num_eqn: usize,
    num_boundary_eqn: usize,
    handled_stamp: Option<u64>,
}

impl AnalysisModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops all groups and FE elements; called at the start of every
    /// `handle` pass.
    pub fn clear_all(&mut self) {
        self.dof_groups.clear();
        self.node_group.clear();
        self.fe_elements.clear();
        self.num_eqn = 0;
        self.num_boundary_eqn = 0;
        self.handled_stamp = None;
    }

    /// Creates the ordinary DOF group of a node.
    pub fn add_node_group(&mut self, node: Tag, num_dofs: usize) -> usize {
        self.add_group(DofGroup::new(DofGroupKind::Node(node), num_dofs))
    }

    /// Creates the transformed DOF group of an MP-constrained node.
    pub fn add_transformed_group(&mut self, node: Tag, num_dofs: usize) -> usize {
        self.add_group(DofGroup::new(DofGroupKind::Transformed(node), num_dofs))
    }

    /// Creates a synthetic Lagrange-multiplier group.
    pub fn add_lagrange_group(&mut self, constraint: Tag, sp: bool, num_dofs: usize) -> usize {
        self.add_group(DofGroup::new(
            DofGroupKind::Lagrange { constraint, sp },
            num_dofs,
        ))
    }

    fn add_group(&mut self, group: DofGroup) -> usize {
        let index = self.dof_groups.len();
        if let Some(node) = group.node_tag() {
            let previous = self.node_group.insert(node, index);
            assert!(previous.is_none(), "node {} already has a DOF group", node);
        }
        self.dof_groups.push(group);
        index
    }

    pub fn add_fe(&mut self, fe: FeElement) {
        self.fe_elements.push(fe);
    }

    pub fn groups(&self) -> &[DofGroup] {
        &self.dof_groups
    }

    pub fn groups_mut(&mut self) -> &mut [DofGroup] {
        &mut self.dof_groups
    }

    pub fn group(&self, index: usize) -> &DofGroup {
        &self.dof_groups[index]
    }

    /// Index of the DOF group of a node.
    ///
    /// # Panics
    ///
    /// Panics if the node has no group; handlers create one group per node,
    /// so a miss is an invariant break.
    pub fn node_group_index(&self, node: Tag) -> usize {
        *self
            .node_group
            .get(&node)
            .unwrap_or_else(|| panic!("node {} has no DOF group", node))
    }

    pub fn try_node_group_index(&self, node: Tag) -> Option<usize> {
        self.node_group.get(&node).copied()
    }

    pub fn fe_elements(&self) -> &[FeElement] {
        &self.fe_elements
    }

    pub fn num_eqn(&self) -> usize {
        self.num_eqn
    }

    /// Size of the trailing boundary equation block.
    pub fn num_boundary_eqn(&self) -> usize {
        self.num_boundary_eqn
    }

    pub fn handled_stamp(&self) -> Option<u64> {
        self.handled_stamp
    }

    pub fn set_handled_stamp(&mut self, stamp: u64) {
        self.handled_stamp = Some(stamp);
    }

    /// Assigns equation numbers: unnumbered DOFs first, in group insertion
    /// order, then the boundary-last block as a trailing contiguous range.
    /// Deterministic for a fixed model, so repeated handling reproduces the
    /// same numbering. Returns the total equation count.
    pub fn number_equations(&mut self) -> usize {
        let mut next = 0;
        for group in &mut self.dof_groups {
            for d in 0..group.num_dofs() {
                if group.state(d) == DofState::Unnumbered {
                    group.set_state(d, DofState::Equation(next));
                    next += 1;
                }
            }
        }
        let interior = next;
        for group in &mut self.dof_groups {
            for d in 0..group.num_dofs() {
                if group.state(d) == DofState::BoundaryLast {
                    group.set_state(d, DofState::Equation(next));
                    next += 1;
                }
            }
        }
        self.num_eqn = next;
        self.num_boundary_eqn = next - interior;
        next
    }

    /// Builds every FE element's local-to-global index array. Must run after
    /// [`number_equations`](Self::number_equations).
    pub fn finalize_ids(&mut self) {
        let groups = &self.dof_groups;
        for fe in &mut self.fe_elements {
            fe.set_id(groups);
        }
    }
}

/// Adds every node's unbalanced load into the right-hand side through `add`.
///
/// Numbered DOFs contribute directly. An eliminated DOF of a transformed
/// group has no equation of its own; its load is routed onto the retained
/// DOFs' equations through the constraint matrix, so that a load applied to
/// a constrained DOF reaches the system the same way `Tᵀ r` does.
pub(crate) fn assemble_nodal_loads(
    model: &AnalysisModel,
    domain: &Domain,
    mut add: impl FnMut(usize, f64),
) {
    // First constraint per node wins, matching the handling pass.
    let mut constraint_of: FxHashMap<Tag, &MpConstraint> = FxHashMap::default();
    for mp in domain.mp_constraints() {
        constraint_of.entry(mp.constrained_node()).or_insert(mp);
    }

    for group in model.groups() {
        let (tag, transformed) = match group.kind() {
            DofGroupKind::Node(tag) => (tag, false),
            DofGroupKind::Transformed(tag) => (tag, true),
            DofGroupKind::Lagrange { .. } => continue,
        };
        let node = domain
            .node(tag)
            .unwrap_or_else(|| panic!("DOF group references missing node {}", tag));
        for (d, state) in group.states().iter().enumerate() {
            let load = node.unbalanced_load()[d];
            if let Some(eqn) = state.equation() {
                add(eqn, load);
            } else if transformed && *state == DofState::Eliminated && load != 0.0 {
                let Some(mp) = constraint_of.get(&tag) else { continue };
                let Some(row) = mp.constrained_dofs().iter().position(|&cd| cd == d) else {
                    continue;
                };
                for (col, (rnode, rdof)) in mp.retained_pairs().enumerate() {
                    let Some(rg) = model.try_node_group_index(rnode) else { continue };
                    if let Some(eqn) = model.group(rg).state(rdof).equation() {
                        add(eqn, load * mp.matrix()[(row, col)]);
                    }
                }
            }
        }
    }
}

/// A self-contained static analysis: constraint handler, integrator and
/// linear system of equations around one domain.
///
/// Re-handles the model whenever the domain change stamp has advanced since
/// the last pass, then assembles, solves and updates the trial state.
pub struct StaticAnalysis {
    handler: Box<dyn ConstraintHandler>,
    integrator: Box<dyn Integrator>,
    soe: Box<dyn LinearSoe>,
    model: AnalysisModel,
}

impl StaticAnalysis {
    pub fn new(
        handler: Box<dyn ConstraintHandler>,
        integrator: Box<dyn Integrator>,
        soe: Box<dyn LinearSoe>,
    ) -> Self {
        Self {
            handler,
            integrator,
            soe,
            model: AnalysisModel::new(),
        }
    }

    pub fn model(&self) -> &AnalysisModel {
        &self.model
    }

    /// Rebuilds DOF groups and FE elements if the domain changed since the
    /// last handle pass. Returns the number of boundary DOFs set aside.
    pub fn ensure_handled(
        &mut self,
        domain: &Domain,
        subdomains: &[Subdomain],
        boundary: Option<&[Tag]>,
    ) -> Result<usize> {
        if self.model.handled_stamp() == Some(domain.stamp()) {
            return Ok(self.model.num_boundary_eqn());
        }
        let boundary_count = self
            .handler
            .handle(domain, subdomains, &mut self.model, boundary)?;
        self.model.set_handled_stamp(domain.stamp());
        self.integrator.domain_changed();
        self.soe.set_size(self.model.num_eqn());
        Ok(boundary_count)
    }

    /// Runs one assemble-solve-update step.
    pub fn analyze_step(
        &mut self,
        domain: &mut Domain,
        subdomains: &mut [Subdomain],
        boundary: Option<&[Tag]>,
    ) -> Result<()> {
        self.ensure_handled(domain, subdomains, boundary)?;
        self.soe.zero();

        {
            let mut ctx = AssemblyCtx { domain, subdomains };
            for fe in self.model.fe_elements() {
                let k = self
                    .integrator
                    .form_ele_tangent(fe, self.model.groups(), &mut ctx)?;
                self.soe.add_tangent(fe.id(), &k);
                let r = self
                    .integrator
                    .form_ele_residual(fe, self.model.groups(), &mut ctx)?;
                self.soe.add_residual(fe.id(), &r);
            }

            assemble_nodal_loads(&self.model, ctx.domain, |eqn, value| {
                self.soe.add_rhs(eqn, value)
            });
        }

        self.soe.solve()?;
        self.integrator.update(&mut self.model, domain, self.soe.x())
    }
}
