//! Equation assembly and substructuring for finite element models.
//!
//! The crate covers the machinery between a mutable finite element model and
//! a linear solver: DOF numbering with explicit constraint elimination
//! (plain, penalty, Lagrange-multiplier and transformation handling),
//! element and constraint assembly through a stable local-to-global index
//! mapping, and substructuring, where a model is partitioned into subdomains
//! that their parent assembles as condensed macro-elements.

pub mod analysis;
pub mod constraint;
pub mod dof;
pub mod domain;
pub mod element;
pub mod error;
pub mod fe;
pub mod graph;
pub mod handler;
pub mod node;
pub mod partitioned;
pub mod partitioner;
pub mod recorder;
pub mod subdomain;

pub extern crate nalgebra;

/// Identity of a model entity (node, element, constraint, subdomain).
///
/// Tags are unique per entity kind within one domain, not globally.
pub type Tag = usize;
