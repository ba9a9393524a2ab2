//! Subdomains: self-contained sub-models that act as condensed
//! macro-elements of their parent.
//!
//! A subdomain owns a full internal [`Domain`] plus the list of *external*
//! (interface) nodes it shares with the parent. Once built with a constraint
//! handler it runs its own handling pass with the external nodes as the
//! boundary list, so interface DOFs occupy a trailing equation block. Static
//! condensation of the interior block then yields the tangent and residual
//! the parent assembles, exactly as for an ordinary element.

use std::time::Instant;

use nalgebra::{DMatrix, DVector, Dyn, LU};
use rustc_hash::FxHashMap;

use crate::analysis::{
    assemble_nodal_loads, impose_eliminated_sp_values, propagate_transformed_dofs, AnalysisModel,
};
use crate::constraint::{MpConstraint, SpConstraint};
use crate::domain::{Domain, NodalLoad};
use crate::dof::DofGroupKind;
use crate::element::Element;
use crate::error::{ModelError, Result};
use crate::fe::AssemblyCtx;
use crate::handler::ConstraintHandler;
use crate::node::Node;
use crate::recorder::Recorder;
use crate::Tag;

/// Build/analyze lifecycle of a subdomain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubdomainState {
    /// Created, no constraint handler attached yet.
    Unbuilt,
    /// Has a handler and can condense, but has not solved a step.
    Built,
    /// Has completed at least one interior back-substitution.
    Analyzed,
}

/// Condensation products for one tangent assembly, valid for one value of
/// the internal domain's change stamp.
struct Condensed {
    stamp: u64,
    tangent: DMatrix<f64>,
    /// `K_bi K_ii⁻¹ K_ib` needs the interior factor again for the residual
    /// and the back-substitution, so the LU is kept.
    interior_lu: Option<LU<f64, Dyn, Dyn>>,
    k_ib: DMatrix<f64>,
    k_bi: DMatrix<f64>,
    /// Interior residual of the most recent residual assembly; consumed by
    /// [`Subdomain::update`].
    r_i: Option<DVector<f64>>,
}

/// A sub-model analyzed independently and exposed to the parent as a single
/// macro-element over its external nodes.
pub struct Subdomain {
    tag: Tag,
    domain: Domain,
    external: Vec<Tag>,
    handler: Option<Box<dyn ConstraintHandler>>,
    model: AnalysisModel,
    recorders: Vec<Box<dyn Recorder>>,
    condensed: Option<Condensed>,
    cost_seconds: f64,
    state: SubdomainState,
}

impl Subdomain {
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            domain: Domain::new(),
            external: Vec::new(),
            handler: None,
            model: AnalysisModel::new(),
            recorders: Vec::new(),
            condensed: None,
            cost_seconds: 0.0,
            state: SubdomainState::Unbuilt,
        }
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn state(&self) -> SubdomainState {
        self.state
    }

    /// Wall-clock seconds spent condensing and back-substituting; the vertex
    /// weight in the subdomain connectivity graph.
    pub fn cost(&self) -> f64 {
        self.cost_seconds
    }

    pub fn external_node_tags(&self) -> &[Tag] {
        &self.external
    }

    /// The internal model. Mutations go through the `add_*`/`remove_*`
    /// forwards so the external-node bookkeeping stays consistent.
    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Attaches the constraint handler, making the subdomain able to
    /// condense and self-solve.
    pub fn build(&mut self, handler: Box<dyn ConstraintHandler>) {
        self.handler = Some(handler);
        self.condensed = None;
        if self.state == SubdomainState::Unbuilt {
            self.state = SubdomainState::Built;
        }
    }

    /// Whether the subdomain has the collaborators needed to solve its own
    /// interior. Subdomains that answer `false` cannot be condensed and must
    /// be absorbed by the parent.
    pub fn does_independent_analysis(&self) -> bool {
        self.handler.is_some()
    }

    // --- model mutation forwards ---

    /// Adds a node owned outright by this subdomain.
    pub fn add_internal_node(&mut self, node: Node) -> Result<()> {
        self.domain.add_node(node)
    }

    /// Adds a copy of a node shared with the parent (or with another
    /// subdomain). Its DOFs form the condensation boundary.
    pub fn add_external_node(&mut self, node: Node) -> Result<()> {
        let tag = node.tag();
        self.domain.add_node(node)?;
        if !self.external.contains(&tag) {
            self.external.push(tag);
        }
        Ok(())
    }

    pub fn has_node(&self, tag: Tag) -> bool {
        self.domain.has_node(tag)
    }

    pub fn remove_node(&mut self, tag: Tag) -> Result<Node> {
        let node = self.domain.remove_node(tag)?;
        self.external.retain(|&t| t != tag);
        Ok(node)
    }

    pub fn add_element(&mut self, element: Box<dyn Element>) -> Result<()> {
        self.domain.add_element(element)
    }

    pub fn remove_element(&mut self, tag: Tag) -> Result<Box<dyn Element>> {
        self.domain.remove_element(tag)
    }

    pub fn has_element(&self, tag: Tag) -> bool {
        self.domain.has_element(tag)
    }

    pub fn num_elements(&self) -> usize {
        self.domain.num_elements()
    }

    pub fn add_sp_constraint(&mut self, sp: SpConstraint) -> Result<()> {
        self.domain.add_sp_constraint(sp)
    }

    pub fn remove_sp_constraint(&mut self, tag: Tag) -> Result<SpConstraint> {
        self.domain.remove_sp_constraint(tag)
    }

    pub fn add_mp_constraint(&mut self, mp: MpConstraint) -> Result<()> {
        self.domain.add_mp_constraint(mp)
    }

    pub fn remove_mp_constraint(&mut self, tag: Tag) -> Result<MpConstraint> {
        self.domain.remove_mp_constraint(tag)
    }

    pub fn add_nodal_load(&mut self, load: NodalLoad) -> Result<()> {
        self.domain.add_nodal_load(load)
    }

    pub fn remove_nodal_load(&mut self, tag: Tag) -> Result<NodalLoad> {
        self.domain.remove_nodal_load(tag)
    }

    pub fn add_recorder(&mut self, recorder: Box<dyn Recorder>) {
        self.recorders.push(recorder);
    }

    // --- lifecycle forwards ---

    pub fn apply_load(&mut self, time: f64) {
        self.domain.apply_load(time);
    }

    pub fn new_step(&mut self, dt: f64) {
        self.domain.new_step(dt);
    }

    pub fn set_current_time(&mut self, time: f64) {
        self.domain.set_current_time(time);
    }

    pub fn set_committed_time(&mut self, time: f64) {
        self.domain.set_committed_time(time);
    }

    /// Commits the internal state and invokes the replicated recorders.
    pub fn commit(&mut self) -> Result<()> {
        self.domain.commit();
        let domain = &self.domain;
        for recorder in &mut self.recorders {
            if let Err(err) = recorder.record(domain) {
                log::error!("subdomain {}: recorder failed: {:#}", self.tag, err);
                return Err(ModelError::SubdomainFailure {
                    tag: self.tag,
                    code: -1,
                });
            }
        }
        Ok(())
    }

    pub fn revert_to_last_commit(&mut self) {
        self.domain.revert_to_last_commit();
    }

    pub fn revert_to_start(&mut self) {
        self.domain.revert_to_start();
    }

    // --- condensation ---

    /// Re-handles the interior model if the internal domain changed since
    /// the last pass.
    fn ensure_handled(&mut self) -> Result<()> {
        let handler = self
            .handler
            .as_mut()
            .ok_or(ModelError::SubdomainNotBuilt(self.tag))?;
        if self.model.handled_stamp() == Some(self.domain.stamp()) {
            return Ok(());
        }
        handler.handle(&self.domain, &[], &mut self.model, Some(&self.external))?;
        self.model.set_handled_stamp(self.domain.stamp());
        self.condensed = None;
        Ok(())
    }

    /// Assembles the full interior system tangent (boundary equations
    /// trailing) and factors the interior block.
    fn ensure_condensed(&mut self) -> Result<()> {
        self.ensure_handled()?;
        if let Some(c) = &self.condensed {
            if c.stamp == self.domain.stamp() {
                return Ok(());
            }
        }

        let started = Instant::now();
        let n = self.model.num_eqn();
        let nb = self.model.num_boundary_eqn();
        let ni = n - nb;

        let mut k = DMatrix::zeros(n, n);
        {
            let mut ctx = AssemblyCtx::without_subdomains(&self.domain);
            for fe in self.model.fe_elements() {
                let local = fe.tangent(self.model.groups(), &mut ctx)?;
                scatter_tangent(&mut k, fe.id(), &local);
            }
        }

        let k_ii = k.view((0, 0), (ni, ni)).into_owned();
        let k_ib = k.view((0, ni), (ni, nb)).into_owned();
        let k_bi = k.view((ni, 0), (nb, ni)).into_owned();
        let k_bb = k.view((ni, ni), (nb, nb)).into_owned();

        let (tangent, interior_lu) = if ni == 0 {
            (k_bb, None)
        } else {
            let lu = k_ii.lu();
            let solved = lu.solve(&k_ib).ok_or_else(|| {
                ModelError::SingularSystem(format!(
                    "interior block of subdomain {} is not invertible",
                    self.tag
                ))
            })?;
            (&k_bb - &k_bi * solved, Some(lu))
        };

        self.condensed = Some(Condensed {
            stamp: self.domain.stamp(),
            tangent,
            interior_lu,
            k_ib,
            k_bi,
            r_i: None,
        });
        self.cost_seconds += started.elapsed().as_secs_f64();
        Ok(())
    }

    /// The condensed boundary tangent `K_bb − K_bi K_ii⁻¹ K_ib`, one row and
    /// column per external DOF in boundary equation order.
    pub fn condensed_tangent(&mut self) -> Result<DMatrix<f64>> {
        self.ensure_condensed()?;
        Ok(self
            .condensed
            .as_ref()
            .expect("condensation just succeeded")
            .tangent
            .clone())
    }

    /// The condensed boundary residual `r_b − K_bi K_ii⁻¹ r_i` at the
    /// current interior trial state. Recomputed on every call; the interior
    /// residual it consumes is retained for [`update`](Self::update).
    pub fn condensed_residual(&mut self) -> Result<DVector<f64>> {
        self.ensure_condensed()?;

        let started = Instant::now();
        let n = self.model.num_eqn();
        let nb = self.model.num_boundary_eqn();
        let ni = n - nb;

        let mut r = DVector::zeros(n);
        {
            let mut ctx = AssemblyCtx::without_subdomains(&self.domain);
            for fe in self.model.fe_elements() {
                let local = fe.residual(self.model.groups(), &mut ctx)?;
                scatter_residual(&mut r, fe.id(), &local);
            }
        }
        assemble_nodal_loads(&self.model, &self.domain, |eqn, value| r[eqn] += value);

        let r_i = r.rows(0, ni).into_owned();
        let r_b = r.rows(ni, nb).into_owned();

        let condensed = self
            .condensed
            .as_mut()
            .expect("condensation just succeeded");
        let out = match &condensed.interior_lu {
            None => r_b,
            Some(lu) => {
                let solved = lu.solve(&r_i).ok_or_else(|| {
                    ModelError::SingularSystem(format!(
                        "interior block of subdomain {} is not invertible",
                        self.tag
                    ))
                })?;
                &r_b - &condensed.k_bi * solved
            }
        };
        condensed.r_i = Some(r_i);
        self.cost_seconds += started.elapsed().as_secs_f64();
        Ok(out)
    }

    /// Back-substitutes the interior solution after the parent has solved:
    /// sets the external nodes' DOFs to `boundary_disp` and computes the
    /// interior increment `Δu_i = K_ii⁻¹ (r_i − K_ib Δu_b)`.
    ///
    /// Requires a condensation pass (tangent and residual) for the current
    /// model state; a stale pass is reported, not silently recomputed, since
    /// the parent solution it pairs with would be stale too.
    pub fn update(&mut self, boundary_disp: &FxHashMap<Tag, DVector<f64>>) -> Result<()> {
        let started = Instant::now();
        let stamp = self.domain.stamp();
        let n = self.model.num_eqn();
        let nb = self.model.num_boundary_eqn();
        let ni = n - nb;

        let condensed = self
            .condensed
            .as_ref()
            .ok_or(ModelError::SubdomainNotBuilt(self.tag))?;
        if condensed.stamp != stamp {
            return Err(ModelError::StaleModel {
                handled: condensed.stamp,
                current: stamp,
            });
        }
        let r_i = condensed
            .r_i
            .as_ref()
            .ok_or(ModelError::SubdomainNotBuilt(self.tag))?;

        // Boundary increment relative to the current trial state, in
        // boundary equation order.
        let mut delta_b = DVector::zeros(nb);
        for group in self.model.groups() {
            let DofGroupKind::Node(tag) = group.kind() else { continue };
            let Some(target) = boundary_disp.get(&tag) else { continue };
            let node = self
                .domain
                .node(tag)
                .unwrap_or_else(|| panic!("DOF group references missing node {}", tag));
            for (d, state) in group.states().iter().enumerate() {
                if let Some(eqn) = state.equation() {
                    if eqn >= ni {
                        delta_b[eqn - ni] = target[d] - node.trial_disp()[d];
                    }
                }
            }
        }

        let delta_i = match &condensed.interior_lu {
            None => DVector::zeros(0),
            Some(lu) => {
                let rhs = r_i - &condensed.k_ib * &delta_b;
                lu.solve(&rhs).ok_or_else(|| {
                    ModelError::SingularSystem(format!(
                        "interior block of subdomain {} is not invertible",
                        self.tag
                    ))
                })?
            }
        };

        for group in self.model.groups_mut() {
            match group.kind() {
                DofGroupKind::Node(tag) | DofGroupKind::Transformed(tag) => {
                    let node = self
                        .domain
                        .node_mut(tag)
                        .unwrap_or_else(|| panic!("DOF group references missing node {}", tag));
                    for (d, state) in group.states().iter().enumerate() {
                        if let Some(eqn) = state.equation() {
                            if eqn < ni {
                                node.increment_trial_disp_component(d, delta_i[eqn]);
                            } else {
                                node.increment_trial_disp_component(d, delta_b[eqn - ni]);
                            }
                        }
                    }
                }
                DofGroupKind::Lagrange { .. } => {
                    for d in 0..group.num_dofs() {
                        if let Some(eqn) = group.state(d).equation() {
                            if eqn < ni {
                                group.add_value(d, delta_i[eqn]);
                            } else {
                                group.add_value(d, delta_b[eqn - ni]);
                            }
                        }
                    }
                }
            }
        }

        impose_eliminated_sp_values(&self.model, &mut self.domain);
        propagate_transformed_dofs(&self.model, &mut self.domain);

        self.cost_seconds += started.elapsed().as_secs_f64();
        self.state = SubdomainState::Analyzed;
        Ok(())
    }
}

fn scatter_tangent(k: &mut DMatrix<f64>, id: &[Option<usize>], local: &DMatrix<f64>) {
    for (i, &row) in id.iter().enumerate() {
        let Some(row) = row else { continue };
        for (j, &col) in id.iter().enumerate() {
            if let Some(col) = col {
                k[(row, col)] += local[(i, j)];
            }
        }
    }
}

fn scatter_residual(r: &mut DVector<f64>, id: &[Option<usize>], local: &DVector<f64>) {
    for (i, &row) in id.iter().enumerate() {
        if let Some(row) = row {
            r[row] += local[i];
        }
    }
}
