//! Local matrices for penalty enforcement of constraints.
//!
//! A constraint `u_c = C u_r` is rewritten as `C_full [u_c; u_r] = 0` with
//! `C_full = [-I | C]`; the penalty FE contributes the tangent
//! `alpha * C_fullᵀ C_full` and the residual `-alpha * C_fullᵀ g`, where
//! `g = C_full u` is the current constraint violation. The equation count is
//! unchanged: no DOF is removed and no multiplier is added.

use nalgebra::{DMatrix, DVector};

use crate::constraint::MpConstraint;

/// `C_full = [-I | C]` for a multi-point constraint, one row per constraint
/// equation.
pub fn constraint_rows(mp: &MpConstraint) -> DMatrix<f64> {
    let nc = mp.num_constrained_dofs();
    let nr = mp.num_retained_dofs();
    let mut c_full = DMatrix::zeros(nc, nc + nr);
    for i in 0..nc {
        c_full[(i, i)] = -1.0;
    }
    c_full.view_mut((0, nc), (nc, nr)).copy_from(mp.matrix());
    c_full
}

/// Tangent of a penalty SP element: the 1x1 matrix `[alpha]`.
pub fn sp_tangent(alpha: f64) -> DMatrix<f64> {
    DMatrix::from_element(1, 1, alpha)
}

/// Residual of a penalty SP element, `alpha * (prescribed - current)`.
pub fn sp_residual(alpha: f64, prescribed: f64, current: f64) -> DVector<f64> {
    DVector::from_element(1, alpha * (prescribed - current))
}

/// Tangent of a penalty MP/MRMP element, `alpha * C_fullᵀ C_full`.
pub fn mp_tangent(alpha: f64, c_full: &DMatrix<f64>) -> DMatrix<f64> {
    alpha * c_full.transpose() * c_full
}

/// Residual of a penalty MP/MRMP element at the trial state `u = [u_c; u_r]`.
pub fn mp_residual(alpha: f64, c_full: &DMatrix<f64>, u: &DVector<f64>) -> DVector<f64> {
    let violation = c_full * u;
    -alpha * c_full.transpose() * violation
}
