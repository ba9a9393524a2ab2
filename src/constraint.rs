//! Nodal constraints: single-point, multi-point and multi-retained forms.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::Tag;

/// A single-point constraint: one DOF of one node prescribed to a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpConstraint {
    tag: Tag,
    node: Tag,
    dof: usize,
    value: f64,
    /// When set, the prescribed value is scaled by the domain time on load
    /// application.
    time_varying: bool,
}

impl SpConstraint {
    pub fn new(tag: Tag, node: Tag, dof: usize, value: f64) -> Self {
        Self {
            tag,
            node,
            dof,
            value,
            time_varying: false,
        }
    }

    pub fn time_varying(tag: Tag, node: Tag, dof: usize, value: f64) -> Self {
        Self {
            tag,
            node,
            dof,
            value,
            time_varying: true,
        }
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn node(&self) -> Tag {
        self.node
    }

    pub fn dof(&self) -> usize {
        self.dof
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn is_time_varying(&self) -> bool {
        self.time_varying
    }

    /// Prescribed value at the given domain time.
    pub fn value_at(&self, time: f64) -> f64 {
        if self.time_varying {
            self.value * time
        } else {
            self.value
        }
    }
}

/// One retained node of a multi-point constraint and the DOFs it retains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MpRetained {
    pub node: Tag,
    pub dofs: Vec<usize>,
}

/// A multi-point constraint `u_c = C u_r`.
///
/// The constrained DOFs of one node are expressed as a linear function of the
/// retained DOFs. With a single retained node this is the classic MP
/// constraint; with several it is the multi-retained (MRMP) form. The
/// constraint matrix `C` has one row per constrained DOF and one column per
/// retained DOF, columns ordered by retained node, then by DOF within the
/// node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MpConstraint {
    tag: Tag,
    constrained_node: Tag,
    constrained_dofs: Vec<usize>,
    retained: Vec<MpRetained>,
    matrix: DMatrix<f64>,
}

impl MpConstraint {
    /// Creates a constraint after validating that the matrix shape matches
    /// the DOF lists.
    pub fn new(
        tag: Tag,
        constrained_node: Tag,
        constrained_dofs: Vec<usize>,
        retained: Vec<MpRetained>,
        matrix: DMatrix<f64>,
    ) -> Result<Self> {
        let expected_rows = constrained_dofs.len();
        let expected_cols = retained.iter().map(|r| r.dofs.len()).sum();
        if matrix.nrows() != expected_rows || matrix.ncols() != expected_cols {
            return Err(ModelError::ConstraintShape {
                tag,
                rows: matrix.nrows(),
                cols: matrix.ncols(),
                expected_rows,
                expected_cols,
            });
        }
        Ok(Self {
            tag,
            constrained_node,
            constrained_dofs,
            retained,
            matrix,
        })
    }

    /// Convenience constructor for the single-retained-node case.
    pub fn single_retained(
        tag: Tag,
        constrained_node: Tag,
        constrained_dofs: Vec<usize>,
        retained_node: Tag,
        retained_dofs: Vec<usize>,
        matrix: DMatrix<f64>,
    ) -> Result<Self> {
        Self::new(
            tag,
            constrained_node,
            constrained_dofs,
            vec![MpRetained {
                node: retained_node,
                dofs: retained_dofs,
            }],
            matrix,
        )
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn constrained_node(&self) -> Tag {
        self.constrained_node
    }

    pub fn constrained_dofs(&self) -> &[usize] {
        &self.constrained_dofs
    }

    pub fn retained(&self) -> &[MpRetained] {
        &self.retained
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    pub fn num_constrained_dofs(&self) -> usize {
        self.constrained_dofs.len()
    }

    pub fn num_retained_dofs(&self) -> usize {
        self.retained.iter().map(|r| r.dofs.len()).sum()
    }

    /// Flattened `(node, dof)` pairs in constraint-matrix column order.
    pub fn retained_pairs(&self) -> impl Iterator<Item = (Tag, usize)> + '_ {
        self.retained
            .iter()
            .flat_map(|r| r.dofs.iter().map(move |&dof| (r.node, dof)))
    }

    /// Whether the constraint matrix is the square identity.
    ///
    /// Only these constraints can be handled by direct elimination under the
    /// Plain handler.
    pub fn is_identity(&self) -> bool {
        if self.matrix.nrows() != self.matrix.ncols() {
            return false;
        }
        self.matrix
            .row_iter()
            .enumerate()
            .all(|(i, row)| {
                row.iter()
                    .enumerate()
                    .all(|(j, &v)| if i == j { v == 1.0 } else { v == 0.0 })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::dmatrix;

    #[test]
    fn identity_predicate() {
        let identity = MpConstraint::single_retained(
            1,
            2,
            vec![0, 1],
            3,
            vec![0, 1],
            DMatrix::identity(2, 2),
        )
        .unwrap();
        assert!(identity.is_identity());

        let scaled = MpConstraint::single_retained(
            2,
            2,
            vec![0],
            3,
            vec![0],
            dmatrix![0.5],
        )
        .unwrap();
        assert!(!scaled.is_identity());

        let rectangular = MpConstraint::single_retained(
            3,
            2,
            vec![0],
            3,
            vec![0, 1],
            dmatrix![1.0, 0.0],
        )
        .unwrap();
        assert!(!rectangular.is_identity());
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let result = MpConstraint::single_retained(
            1,
            2,
            vec![0, 1],
            3,
            vec![0],
            DMatrix::identity(2, 2),
        );
        assert!(matches!(result, Err(ModelError::ConstraintShape { .. })));
    }

    #[test]
    fn retained_pairs_follow_column_order() {
        let mrmp = MpConstraint::new(
            1,
            5,
            vec![0],
            vec![
                MpRetained { node: 6, dofs: vec![0, 1] },
                MpRetained { node: 7, dofs: vec![0] },
            ],
            dmatrix![0.25, 0.25, 0.5],
        )
        .unwrap();
        let pairs: Vec<_> = mrmp.retained_pairs().collect();
        assert_eq!(pairs, vec![(6, 0), (6, 1), (7, 0)]);
        assert_eq!(mrmp.num_retained_dofs(), 3);
    }
}
