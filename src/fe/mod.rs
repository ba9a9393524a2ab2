//! Assembly bridge objects.
//!
//! An [`FeElement`] wraps either a mesh element, a subdomain acting as a
//! condensed macro-element, or one constraint equation, and knows how to
//! express its local tangent/residual against global equation numbers. The
//! wrapped source is a closed tagged variant resolved once at creation, never
//! by downcasting during iteration.

pub mod lagrange;
pub mod penalty;
pub mod transformation;

use nalgebra::{DMatrix, DVector};

use crate::domain::Domain;
use crate::dof::DofGroup;
use crate::error::{ModelError, Result};
use crate::subdomain::Subdomain;
use crate::Tag;

/// One global-side DOF referenced by an FE element: `(group index, DOF index
/// within the group)`.
pub type FeDof = (usize, usize);

/// What an FE element assembles for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeSource {
    /// An ordinary mesh element.
    Element(Tag),
    /// A mesh element whose DOFs are re-routed through constraint matrices
    /// (Transformation handling).
    TransformationElement(Tag),
    /// A subdomain exposing its condensed boundary tangent/residual.
    Subdomain(Tag),
    /// Penalty enforcement of a single-point constraint.
    PenaltySp { sp: Tag, alpha: f64 },
    /// Penalty enforcement of a multi-point (possibly multi-retained)
    /// constraint.
    PenaltyMp { mp: Tag, alpha: f64 },
    /// Lagrange-multiplier enforcement of a single-point constraint; `group`
    /// is the multiplier DOF group.
    LagrangeSp { sp: Tag, group: usize, alpha: f64 },
    /// Lagrange-multiplier enforcement of a multi-point constraint.
    LagrangeMp { mp: Tag, group: usize, alpha: f64 },
}

/// Mutable view of the model state an FE element forms against.
pub struct AssemblyCtx<'a> {
    pub domain: &'a Domain,
    pub subdomains: &'a mut [Subdomain],
}

impl<'a> AssemblyCtx<'a> {
    /// Context for a domain without subdomains.
    pub fn without_subdomains(domain: &'a Domain) -> Self {
        Self {
            domain,
            subdomains: &mut [],
        }
    }

    fn subdomain_mut(&mut self, tag: Tag) -> Result<&mut Subdomain> {
        self.subdomains
            .iter_mut()
            .find(|s| s.tag() == tag)
            .ok_or(ModelError::SubdomainNotFound(tag))
    }
}

/// The assembly object: local DOF list, derived global index array and the
/// formation dispatch.
///
/// Owned exclusively by the [`AnalysisModel`](crate::analysis::AnalysisModel)
/// for the lifetime of one analysis configuration; it references (never owns)
/// the element or constraint it wraps.
#[derive(Debug, Clone)]
pub struct FeElement {
    source: FeSource,
    dofs: Vec<FeDof>,
    /// For transformation FEs: the change of coordinates `T` with one row per
    /// element-local DOF and one column per entry of `dofs`.
    transform: Option<DMatrix<f64>>,
    id: Vec<Option<usize>>,
}

impl FeElement {
    pub fn new(source: FeSource, dofs: Vec<FeDof>) -> Self {
        Self {
            source,
            dofs,
            transform: None,
            id: Vec::new(),
        }
    }

    pub fn with_transform(source: FeSource, dofs: Vec<FeDof>, transform: DMatrix<f64>) -> Self {
        assert_eq!(
            transform.ncols(),
            dofs.len(),
            "transformation matrix must have one column per modified DOF"
        );
        Self {
            source,
            dofs,
            transform: Some(transform),
            id: Vec::new(),
        }
    }

    pub fn source(&self) -> FeSource {
        self.source
    }

    pub fn dofs(&self) -> &[FeDof] {
        &self.dofs
    }

    /// Local-to-global index array; `None` entries are DOFs without a global
    /// equation (eliminated or unnumbered).
    pub fn id(&self) -> &[Option<usize>] {
        &self.id
    }

    /// Derives the local-to-global index array from the referenced DOF
    /// groups. Must be called once per numbering pass, after every involved
    /// group has been numbered.
    ///
    /// # Panics
    ///
    /// Panics if a referenced group does not exist; the handler created both
    /// sides, so a miss is an invariant break.
    pub fn set_id(&mut self, groups: &[DofGroup]) {
        self.id = self
            .dofs
            .iter()
            .map(|&(g, d)| {
                let group = groups
                    .get(g)
                    .unwrap_or_else(|| panic!("FE element references missing DOF group {}", g));
                group.state(d).equation()
            })
            .collect();
    }

    /// Local tangent expressed against the DOF list.
    pub fn tangent(&self, groups: &[DofGroup], ctx: &mut AssemblyCtx<'_>) -> Result<DMatrix<f64>> {
        let _ = groups;
        match self.source {
            FeSource::Element(tag) => {
                let k = self.raw_element_tangent(tag, ctx.domain)?;
                Ok(k)
            }
            FeSource::TransformationElement(tag) => {
                let k = self.raw_element_tangent(tag, ctx.domain)?;
                let t = self.transform.as_ref().expect("transformation FE carries T");
                Ok(transformation::transform_tangent(t, &k))
            }
            FeSource::Subdomain(tag) => ctx.subdomain_mut(tag)?.condensed_tangent(),
            FeSource::PenaltySp { alpha, .. } => Ok(penalty::sp_tangent(alpha)),
            FeSource::PenaltyMp { mp, alpha } => {
                let mp = self.mp(mp, ctx.domain);
                Ok(penalty::mp_tangent(alpha, &penalty::constraint_rows(mp)))
            }
            FeSource::LagrangeSp { alpha, .. } => Ok(lagrange::sp_tangent(alpha)),
            FeSource::LagrangeMp { mp, alpha, .. } => {
                let mp = self.mp(mp, ctx.domain);
                Ok(lagrange::mp_tangent(alpha, &penalty::constraint_rows(mp)))
            }
        }
    }

    /// Local residual (right-hand-side contribution) at the current trial
    /// state.
    pub fn residual(&self, groups: &[DofGroup], ctx: &mut AssemblyCtx<'_>) -> Result<DVector<f64>> {
        match self.source {
            FeSource::Element(tag) => {
                let r = self.raw_element_resisting(tag, ctx.domain)?;
                Ok(-r)
            }
            FeSource::TransformationElement(tag) => {
                let r = self.raw_element_resisting(tag, ctx.domain)?;
                let t = self.transform.as_ref().expect("transformation FE carries T");
                Ok(transformation::transform_residual(t, &(-r)))
            }
            FeSource::Subdomain(tag) => ctx.subdomain_mut(tag)?.condensed_residual(),
            FeSource::PenaltySp { sp, alpha } => {
                let sp = self.sp(sp, ctx.domain);
                let current = self.nodal_value(ctx.domain, sp.node(), sp.dof());
                Ok(penalty::sp_residual(
                    alpha,
                    sp.value_at(ctx.domain.current_time()),
                    current,
                ))
            }
            FeSource::PenaltyMp { mp, alpha } => {
                let mp = self.mp(mp, ctx.domain);
                let u = self.gather_constraint_state(mp, ctx.domain);
                Ok(penalty::mp_residual(alpha, &penalty::constraint_rows(mp), &u))
            }
            FeSource::LagrangeSp { sp, group, alpha } => {
                let sp = self.sp(sp, ctx.domain);
                let current = self.nodal_value(ctx.domain, sp.node(), sp.dof());
                let multiplier = groups[group].value(0);
                Ok(lagrange::sp_residual(
                    alpha,
                    sp.value_at(ctx.domain.current_time()),
                    current,
                    multiplier,
                ))
            }
            FeSource::LagrangeMp { mp, group, alpha } => {
                let mp = self.mp(mp, ctx.domain);
                let u = self.gather_constraint_state(mp, ctx.domain);
                let multipliers: Vec<f64> = (0..groups[group].num_dofs())
                    .map(|d| groups[group].value(d))
                    .collect();
                Ok(lagrange::mp_residual(
                    alpha,
                    &penalty::constraint_rows(mp),
                    &u,
                    &multipliers,
                ))
            }
        }
    }

    fn raw_element_tangent(&self, tag: Tag, domain: &Domain) -> Result<DMatrix<f64>> {
        let element = domain
            .element(tag)
            .unwrap_or_else(|| panic!("FE element wraps missing element {}", tag));
        let nodes = domain.element_nodes(tag);
        let k = element.tangent(&nodes)?;
        assert_eq!(
            k.nrows(),
            element.num_dofs(),
            "element {} produced a tangent of the wrong size",
            tag
        );
        Ok(k)
    }

    fn raw_element_resisting(&self, tag: Tag, domain: &Domain) -> Result<DVector<f64>> {
        let element = domain
            .element(tag)
            .unwrap_or_else(|| panic!("FE element wraps missing element {}", tag));
        let nodes = domain.element_nodes(tag);
        element.resisting_force(&nodes)
    }

    fn sp<'d>(&self, tag: Tag, domain: &'d Domain) -> &'d crate::constraint::SpConstraint {
        domain
            .sp_constraint(tag)
            .unwrap_or_else(|| panic!("FE element wraps missing SP constraint {}", tag))
    }

    fn mp<'d>(&self, tag: Tag, domain: &'d Domain) -> &'d crate::constraint::MpConstraint {
        domain
            .mp_constraint(tag)
            .unwrap_or_else(|| panic!("FE element wraps missing MP constraint {}", tag))
    }

    fn nodal_value(&self, domain: &Domain, node: Tag, dof: usize) -> f64 {
        domain
            .node(node)
            .unwrap_or_else(|| panic!("constraint references missing node {}", node))
            .trial_disp()[dof]
    }

    /// Current trial values of `[u_c | u_r]` in constraint column order.
    fn gather_constraint_state(
        &self,
        mp: &crate::constraint::MpConstraint,
        domain: &Domain,
    ) -> DVector<f64> {
        let n = mp.num_constrained_dofs() + mp.num_retained_dofs();
        let mut u = DVector::zeros(n);
        for (i, &dof) in mp.constrained_dofs().iter().enumerate() {
            u[i] = self.nodal_value(domain, mp.constrained_node(), dof);
        }
        for (j, (node, dof)) in mp.retained_pairs().enumerate() {
            u[mp.num_constrained_dofs() + j] = self.nodal_value(domain, node, dof);
        }
        u
    }
}
