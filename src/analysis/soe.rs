//! The linear system of equations the FE elements assemble into.

use nalgebra::{DMatrix, DVector};

use crate::error::{ModelError, Result};

/// A system `A x = b` accepting local contributions through local-to-global
/// index arrays. `None` entries of an index array (DOFs without a global
/// equation) are skipped.
pub trait LinearSoe: Send {
    fn set_size(&mut self, num_eqn: usize);

    fn num_eqn(&self) -> usize;

    /// Zeroes the matrix and the right-hand side.
    fn zero(&mut self);

    fn add_tangent(&mut self, id: &[Option<usize>], k: &DMatrix<f64>);

    fn add_residual(&mut self, id: &[Option<usize>], r: &DVector<f64>);

    fn add_rhs(&mut self, eqn: usize, value: f64);

    fn solve(&mut self) -> Result<()>;

    /// The last solution.
    fn x(&self) -> &DVector<f64>;
}

/// Dense realization backed by an LU factorization.
///
/// Fine for subdomain-sized systems and tests; sparse realizations live
/// behind the same trait.
#[derive(Debug)]
pub struct DenseSoe {
    a: DMatrix<f64>,
    b: DVector<f64>,
    x: DVector<f64>,
}

impl Default for DenseSoe {
    fn default() -> Self {
        Self {
            a: DMatrix::zeros(0, 0),
            b: DVector::zeros(0),
            x: DVector::zeros(0),
        }
    }
}

impl DenseSoe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.a
    }

    pub fn rhs(&self) -> &DVector<f64> {
        &self.b
    }
}

impl LinearSoe for DenseSoe {
    fn set_size(&mut self, num_eqn: usize) {
        self.a = DMatrix::zeros(num_eqn, num_eqn);
        self.b = DVector::zeros(num_eqn);
        self.x = DVector::zeros(num_eqn);
    }

    fn num_eqn(&self) -> usize {
        self.b.len()
    }

    fn zero(&mut self) {
        self.a.fill(0.0);
        self.b.fill(0.0);
    }

    fn add_tangent(&mut self, id: &[Option<usize>], k: &DMatrix<f64>) {
        assert_eq!(id.len(), k.nrows(), "index array does not match tangent size");
        assert_eq!(k.nrows(), k.ncols());
        for (i, &row) in id.iter().enumerate() {
            let Some(row) = row else { continue };
            for (j, &col) in id.iter().enumerate() {
                if let Some(col) = col {
                    self.a[(row, col)] += k[(i, j)];
                }
            }
        }
    }

    fn add_residual(&mut self, id: &[Option<usize>], r: &DVector<f64>) {
        assert_eq!(id.len(), r.len(), "index array does not match residual size");
        for (i, &row) in id.iter().enumerate() {
            if let Some(row) = row {
                self.b[row] += r[i];
            }
        }
    }

    fn add_rhs(&mut self, eqn: usize, value: f64) {
        self.b[eqn] += value;
    }

    fn solve(&mut self) -> Result<()> {
        let lu = self.a.clone().lu();
        match lu.solve(&self.b) {
            Some(x) => {
                self.x = x;
                Ok(())
            }
            None => Err(ModelError::SingularSystem(format!(
                "dense LU failed on a {} equation system",
                self.b.len()
            ))),
        }
    }

    fn x(&self) -> &DVector<f64> {
        &self.x
    }
}
