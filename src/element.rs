//! The element seam between the physical formulations and the assembly core.
//!
//! Physical element libraries are external collaborators; the assembly core
//! only needs the narrow [`Element`] contract below. [`LinearSpring`] is the
//! one reference implementation shipped with the crate, enough to exercise
//! substructuring and the constraint handlers.

use nalgebra::{DMatrix, DVector};

use crate::error::{ModelError, Result};
use crate::node::Node;
use crate::Tag;

/// A finite element as seen by the assembly core.
///
/// An element references its nodes by tag and produces a local tangent and
/// resisting force sized to its total DOF count. Node state is passed in by
/// the owning domain in element node order.
pub trait Element: Send {
    fn tag(&self) -> Tag;

    /// Referenced node tags, in element-local order.
    fn node_tags(&self) -> &[Tag];

    /// Total number of element DOFs (sum over nodes of the DOFs the element
    /// attaches to each node).
    fn num_dofs(&self) -> usize;

    /// Local tangent matrix, `num_dofs x num_dofs`.
    fn tangent(&self, nodes: &[&Node]) -> Result<DMatrix<f64>>;

    /// Local resisting force at the nodes' current trial state, length
    /// `num_dofs`.
    fn resisting_force(&self, nodes: &[&Node]) -> Result<DVector<f64>>;
}

/// A two-node spring with one translational DOF per node.
///
/// The tangent is the familiar `k * [1 -1; -1 1]` and the resisting force is
/// the tangent applied to the end displacements.
#[derive(Debug, Clone)]
pub struct LinearSpring {
    tag: Tag,
    nodes: [Tag; 2],
    stiffness: f64,
}

impl LinearSpring {
    /// Creates a spring between two nodes.
    ///
    /// Fails with [`ModelError::InvalidElement`] if the stiffness is not
    /// strictly positive.
    pub fn new(tag: Tag, node_i: Tag, node_j: Tag, stiffness: f64) -> Result<Self> {
        if stiffness <= 0.0 || !stiffness.is_finite() {
            return Err(ModelError::InvalidElement {
                tag,
                reason: format!("stiffness must be positive and finite, got {}", stiffness),
            });
        }
        Ok(Self {
            tag,
            nodes: [node_i, node_j],
            stiffness,
        })
    }

    pub fn stiffness(&self) -> f64 {
        self.stiffness
    }
}

impl Element for LinearSpring {
    fn tag(&self) -> Tag {
        self.tag
    }

    fn node_tags(&self) -> &[Tag] {
        &self.nodes
    }

    fn num_dofs(&self) -> usize {
        2
    }

    fn tangent(&self, _nodes: &[&Node]) -> Result<DMatrix<f64>> {
        let k = self.stiffness;
        Ok(DMatrix::from_row_slice(2, 2, &[k, -k, -k, k]))
    }

    fn resisting_force(&self, nodes: &[&Node]) -> Result<DVector<f64>> {
        assert_eq!(nodes.len(), 2, "spring {} expects two nodes", self.tag);
        let u_i = nodes[0].trial_disp()[0];
        let u_j = nodes[1].trial_disp()[0];
        let k = self.stiffness;
        Ok(DVector::from_column_slice(&[k * (u_i - u_j), k * (u_j - u_i)]))
    }
}
