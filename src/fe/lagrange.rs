//! Local matrices for Lagrange-multiplier enforcement of constraints.
//!
//! One multiplier is added per constraint equation. The coupling terms have
//! magnitude `alpha` (a conditioning knob, not a penalty: the constraint is
//! enforced exactly), so the tangent is `[[0, alpha*C_fullᵀ], [alpha*C_full, 0]]`
//! over the stacked `[u; lambda]` DOFs.

use nalgebra::{DMatrix, DVector};

/// Tangent of a Lagrange SP element over `[u, lambda]`.
pub fn sp_tangent(alpha: f64) -> DMatrix<f64> {
    DMatrix::from_row_slice(2, 2, &[0.0, alpha, alpha, 0.0])
}

/// Residual of a Lagrange SP element: the displacement row unloads the
/// current multiplier force, the multiplier row is `alpha * (prescribed -
/// current)`.
pub fn sp_residual(alpha: f64, prescribed: f64, current: f64, multiplier: f64) -> DVector<f64> {
    DVector::from_column_slice(&[-alpha * multiplier, alpha * (prescribed - current)])
}

/// Tangent of a Lagrange MP/MRMP element over `[u_c, u_r, lambda]`.
pub fn mp_tangent(alpha: f64, c_full: &DMatrix<f64>) -> DMatrix<f64> {
    let n_u = c_full.ncols();
    let n_m = c_full.nrows();
    let n = n_u + n_m;
    let mut k = DMatrix::zeros(n, n);
    let coupling = alpha * c_full;
    k.view_mut((n_u, 0), (n_m, n_u)).copy_from(&coupling);
    k.view_mut((0, n_u), (n_u, n_m)).copy_from(&coupling.transpose());
    k
}

/// Residual of a Lagrange MP/MRMP element at trial state `u = [u_c; u_r]`
/// with the current multiplier values.
pub fn mp_residual(
    alpha: f64,
    c_full: &DMatrix<f64>,
    u: &DVector<f64>,
    multipliers: &[f64],
) -> DVector<f64> {
    let n_u = c_full.ncols();
    let n_m = c_full.nrows();
    assert_eq!(multipliers.len(), n_m, "one multiplier per constraint equation");

    let lambda = DVector::from_column_slice(multipliers);
    let mut r = DVector::zeros(n_u + n_m);
    r.rows_mut(0, n_u).copy_from(&(-alpha * c_full.transpose() * &lambda));
    r.rows_mut(n_u, n_m).copy_from(&(-alpha * c_full * u));
    r
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrixcompare::assert_matrix_eq;
    use nalgebra::dmatrix;

    #[test]
    fn sp_block_structure() {
        let k = sp_tangent(100.0);
        assert_matrix_eq!(k, dmatrix![0.0, 100.0; 100.0, 0.0], comp = abs, tol = 1e-15);

        let r = sp_residual(100.0, 0.4, 0.1, 0.0);
        assert_eq!(r[0], 0.0);
        assert!((r[1] - 30.0).abs() < 1e-12);
    }

    #[test]
    fn mp_tangent_has_zero_diagonal_blocks() {
        let c_full = dmatrix![-1.0, 1.0];
        let k = mp_tangent(50.0, &c_full);
        let expected = dmatrix![
            0.0, 0.0, -50.0;
            0.0, 0.0, 50.0;
            -50.0, 50.0, 0.0
        ];
        assert_matrix_eq!(k, expected, comp = abs, tol = 1e-15);
    }

    #[test]
    fn mp_residual_measures_violation_in_multiplier_rows() {
        let c_full = dmatrix![-1.0, 1.0];
        let u = DVector::from_column_slice(&[0.1, 0.3]);
        let r = mp_residual(10.0, &c_full, &u, &[0.0]);
        assert_eq!(r[0], 0.0);
        assert_eq!(r[1], 0.0);
        assert!((r[2] + 2.0).abs() < 1e-12);
    }
}
