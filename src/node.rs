//! Mesh nodes and their trial/committed response state.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::Tag;

/// Displacement, velocity and acceleration at a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodalState {
    pub disp: DVector<f64>,
    pub vel: DVector<f64>,
    pub accel: DVector<f64>,
}

impl NodalState {
    fn zeros(ndof: usize) -> Self {
        Self {
            disp: DVector::zeros(ndof),
            vel: DVector::zeros(ndof),
            accel: DVector::zeros(ndof),
        }
    }
}

/// A mesh node: identity, coordinates and response state.
///
/// Every node is owned by exactly one [`Domain`](crate::domain::Domain) (or
/// the internal domain of a subdomain) and referenced by tag from elements
/// and constraints. The *trial* state is the response being iterated on; the
/// *committed* state is the last accepted checkpoint, restored by
/// `revert_to_last_commit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    tag: Tag,
    coords: DVector<f64>,
    ndof: usize,
    trial: NodalState,
    committed: NodalState,
    /// Externally applied load accumulated by `apply_load`, consumed when the
    /// right-hand side is assembled.
    unbalanced_load: DVector<f64>,
}

impl Node {
    pub fn new(tag: Tag, ndof: usize, coords: &[f64]) -> Self {
        Self {
            tag,
            coords: DVector::from_column_slice(coords),
            ndof,
            trial: NodalState::zeros(ndof),
            committed: NodalState::zeros(ndof),
            unbalanced_load: DVector::zeros(ndof),
        }
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn num_dofs(&self) -> usize {
        self.ndof
    }

    pub fn coords(&self) -> &DVector<f64> {
        &self.coords
    }

    pub fn trial(&self) -> &NodalState {
        &self.trial
    }

    pub fn committed(&self) -> &NodalState {
        &self.committed
    }

    pub fn trial_disp(&self) -> &DVector<f64> {
        &self.trial.disp
    }

    /// Sets one component of the trial displacement.
    ///
    /// # Panics
    ///
    /// Panics if `dof` is out of range for this node.
    pub fn set_trial_disp_component(&mut self, dof: usize, value: f64) {
        assert!(dof < self.ndof, "DOF index {} out of range for node {}", dof, self.tag);
        self.trial.disp[dof] = value;
    }

    pub fn set_trial_disp(&mut self, disp: DVector<f64>) {
        assert_eq!(disp.len(), self.ndof);
        self.trial.disp = disp;
    }

    pub fn increment_trial_disp(&mut self, incr: &DVector<f64>) {
        assert_eq!(incr.len(), self.ndof);
        self.trial.disp += incr;
    }

    /// Adds to one component of the trial displacement.
    ///
    /// # Panics
    ///
    /// Panics if `dof` is out of range for this node.
    pub fn increment_trial_disp_component(&mut self, dof: usize, incr: f64) {
        assert!(dof < self.ndof, "DOF index {} out of range for node {}", dof, self.tag);
        self.trial.disp[dof] += incr;
    }

    /// Accepts the trial state as the new committed checkpoint.
    pub fn commit_state(&mut self) {
        self.committed = self.trial.clone();
    }

    /// Discards the trial state, restoring the last committed checkpoint.
    pub fn revert_to_last_commit(&mut self) {
        self.trial = self.committed.clone();
    }

    /// Zeroes both trial and committed state.
    pub fn revert_to_start(&mut self) {
        self.trial = NodalState::zeros(self.ndof);
        self.committed = NodalState::zeros(self.ndof);
        self.unbalanced_load.fill(0.0);
    }

    pub fn unbalanced_load(&self) -> &DVector<f64> {
        &self.unbalanced_load
    }

    pub fn zero_unbalanced_load(&mut self) {
        self.unbalanced_load.fill(0.0);
    }

    /// Adds to the accumulated external load.
    ///
    /// # Panics
    ///
    /// Panics if `load` does not have one entry per DOF.
    pub fn add_unbalanced_load(&mut self, load: &DVector<f64>) {
        assert_eq!(load.len(), self.ndof, "load size mismatch for node {}", self.tag);
        self.unbalanced_load += load;
    }
}
