//! The coordinate change applied to elements touching MP-constrained nodes
//! under Transformation handling.
//!
//! For a constraint `u_c = C u_r`, an element DOF on a constrained node has
//! no equation of its own; its rows and columns are routed onto the retained
//! DOFs' equations through `T`, giving the condensed local pair
//! `Tᵀ K T` / `Tᵀ r`. This is exact elimination: no extra equations and no
//! approximation.

use nalgebra::{DMatrix, DVector};
use rustc_hash::FxHashMap;

use crate::constraint::MpConstraint;
use crate::Tag;

/// The modified DOF list of a transformed element and the matrix mapping
/// element-local DOFs onto it.
#[derive(Debug, Clone)]
pub struct TransformPlan {
    /// `(node, dof)` pairs the transformed element assembles into:
    /// the element's unconstrained DOFs followed by the retained DOFs pulled
    /// in by the constraints (deduplicated).
    pub dofs: Vec<(Tag, usize)>,
    /// One row per element-local DOF, one column per entry of `dofs`.
    pub t: DMatrix<f64>,
}

/// Builds the transformation plan for an element.
///
/// `element_nodes` lists the element's nodes with their DOF counts in
/// element-local order; `constraint_of` resolves a node tag to the MP
/// constraint that constrains it, if any.
pub fn build_plan<'a>(
    element_nodes: &[(Tag, usize)],
    constraint_of: impl Fn(Tag) -> Option<&'a MpConstraint>,
) -> TransformPlan {
    let mut dofs: Vec<(Tag, usize)> = Vec::new();
    let mut column: FxHashMap<(Tag, usize), usize> = FxHashMap::default();
    let push = |pair: (Tag, usize), dofs: &mut Vec<(Tag, usize)>, column: &mut FxHashMap<(Tag, usize), usize>| {
        column.entry(pair).or_insert_with(|| {
            dofs.push(pair);
            dofs.len() - 1
        });
    };

    // Own (unconstrained) DOFs first, in element-local order.
    for &(node, ndof) in element_nodes {
        let constrained = constraint_of(node);
        for d in 0..ndof {
            let is_constrained = constrained
                .map(|mp| mp.constrained_dofs().contains(&d))
                .unwrap_or(false);
            if !is_constrained {
                push((node, d), &mut dofs, &mut column);
            }
        }
    }
    // Then every retained DOF pulled in by a constraint on one of the
    // element's nodes. A retained DOF the element already touches collapses
    // onto the existing column.
    for &(node, _) in element_nodes {
        if let Some(mp) = constraint_of(node) {
            for pair in mp.retained_pairs() {
                push(pair, &mut dofs, &mut column);
            }
        }
    }

    let n_local: usize = element_nodes.iter().map(|&(_, ndof)| ndof).sum();
    let mut t = DMatrix::zeros(n_local, dofs.len());
    let mut row = 0;
    for &(node, ndof) in element_nodes {
        let constrained = constraint_of(node);
        for d in 0..ndof {
            let constraint_row = constrained.and_then(|mp| {
                mp.constrained_dofs()
                    .iter()
                    .position(|&cd| cd == d)
                    .map(|r| (mp, r))
            });
            match constraint_row {
                Some((mp, r)) => {
                    for (j, pair) in mp.retained_pairs().enumerate() {
                        t[(row, column[&pair])] += mp.matrix()[(r, j)];
                    }
                }
                None => t[(row, column[&(node, d)])] = 1.0,
            }
            row += 1;
        }
    }

    TransformPlan { dofs, t }
}

/// `Tᵀ K T`.
pub fn transform_tangent(t: &DMatrix<f64>, k: &DMatrix<f64>) -> DMatrix<f64> {
    t.transpose() * k * t
}

/// `Tᵀ r`.
pub fn transform_residual(t: &DMatrix<f64>, r: &DVector<f64>) -> DVector<f64> {
    t.transpose() * r
}
