//! DOF groups: the mapping from local node DOFs to global equation numbers.
//!
//! Each group entry carries an explicit [`DofState`] instead of the sentinel
//! integers (-1/-2/-3) traditional in FE codes, so "not yet numbered",
//! "eliminated by a constraint" and "reserved for the trailing boundary
//! block" are distinct, typed cases.

use serde::{Deserialize, Serialize};

use crate::Tag;

/// Numbering state of a single DOF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DofState {
    /// Not yet assigned; the numbering pass turns this into `Equation`.
    Unnumbered,
    /// Claimed by a constraint and removed from the global system.
    Eliminated,
    /// Reserved for the trailing equation block (subdomain interface DOFs).
    BoundaryLast,
    /// Numbered global equation.
    Equation(usize),
}

impl DofState {
    pub fn equation(self) -> Option<usize> {
        match self {
            DofState::Equation(n) => Some(n),
            _ => None,
        }
    }
}

/// What a DOF group stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DofGroupKind {
    /// Ordinary group, one per node.
    Node(Tag),
    /// Synthetic Lagrange-multiplier block for the given constraint tag.
    ///
    /// `sp` distinguishes the SP and MP constraint namespaces.
    Lagrange { constraint: Tag, sp: bool },
    /// Group of an MP-constrained node under the Transformation handler; its
    /// constrained DOFs are eliminated and routed through the constraint
    /// matrix onto the retained nodes' equations.
    Transformed(Tag),
}

/// One group of DOFs and their global equation numbers.
///
/// Groups are created fresh on every `handle` pass and live inside the
/// [`AnalysisModel`](crate::analysis::AnalysisModel) for the lifetime of one
/// analysis configuration.
#[derive(Debug, Clone)]
pub struct DofGroup {
    kind: DofGroupKind,
    states: Vec<DofState>,
    /// Solution state carried by the group itself. Nodal groups keep their
    /// response on the node; synthetic multiplier groups have nowhere else to
    /// store the multiplier values between solves.
    values: Vec<f64>,
}

impl DofGroup {
    pub fn new(kind: DofGroupKind, num_dofs: usize) -> Self {
        Self {
            kind,
            states: vec![DofState::Unnumbered; num_dofs],
            values: vec![0.0; num_dofs],
        }
    }

    pub fn kind(&self) -> DofGroupKind {
        self.kind
    }

    /// Tag of the node this group belongs to, if it is a nodal group.
    pub fn node_tag(&self) -> Option<Tag> {
        match self.kind {
            DofGroupKind::Node(tag) | DofGroupKind::Transformed(tag) => Some(tag),
            DofGroupKind::Lagrange { .. } => None,
        }
    }

    pub fn num_dofs(&self) -> usize {
        self.states.len()
    }

    pub fn states(&self) -> &[DofState] {
        &self.states
    }

    /// # Panics
    ///
    /// Panics if `dof` is out of range.
    pub fn state(&self, dof: usize) -> DofState {
        self.states[dof]
    }

    pub fn set_state(&mut self, dof: usize, state: DofState) {
        self.states[dof] = state;
    }

    /// Marks a DOF eliminated. Returns `false` (leaving the state untouched)
    /// if the DOF was already claimed by another mechanism, so that no DOF is
    /// ever claimed twice.
    pub fn mark_eliminated(&mut self, dof: usize) -> bool {
        match self.states[dof] {
            DofState::Unnumbered | DofState::BoundaryLast => {
                self.states[dof] = DofState::Eliminated;
                true
            }
            _ => false,
        }
    }

    /// Flags every still-unnumbered DOF for the trailing boundary block.
    pub fn mark_boundary_last(&mut self) -> usize {
        let mut marked = 0;
        for state in &mut self.states {
            if *state == DofState::Unnumbered {
                *state = DofState::BoundaryLast;
                marked += 1;
            }
        }
        marked
    }

    /// Numbered equations of this group, in DOF order.
    pub fn equations(&self) -> impl Iterator<Item = usize> + '_ {
        self.states.iter().filter_map(|s| s.equation())
    }

    pub fn num_equations(&self) -> usize {
        self.equations().count()
    }

    /// Group-carried solution value (Lagrange multipliers).
    pub fn value(&self, dof: usize) -> f64 {
        self.values[dof]
    }

    pub fn add_value(&mut self, dof: usize, incr: f64) {
        self.values[dof] += incr;
    }

    pub fn zero_values(&mut self) {
        self.values.fill(0.0);
    }
}
