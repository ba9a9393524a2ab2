//! Error types for model mutation, constraint handling and analysis.
//!
//! The taxonomy distinguishes *configuration* errors (a collaborator is
//! missing), *model inconsistency* (a tag references nothing, a constraint
//! matrix has the wrong shape) and *distributed failure* (a subdomain step
//! failed and its code must propagate upward). Programmer-contract
//! violations, such as a DOF-group lookup miss during `set_id`, are panics
//! rather than errors: they indicate a broken invariant that cannot be
//! recovered from.

use crate::Tag;
use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors reported by domain mutation, constraint handling and analysis.
#[derive(Error, Debug)]
pub enum ModelError {
    /// The targeted node exists in neither the ungrouped store nor any
    /// subdomain.
    #[error("node {0} is not in the model")]
    NodeNotInModel(Tag),

    /// A node with the given tag was not found where one was required.
    #[error("node {0} not found")]
    NodeNotFound(Tag),

    /// An element with the given tag was not found.
    #[error("element {0} not found")]
    ElementNotFound(Tag),

    /// A constraint with the given tag was not found.
    #[error("constraint {0} not found")]
    ConstraintNotFound(Tag),

    /// A subdomain with the given tag was not found.
    #[error("subdomain {0} not found")]
    SubdomainNotFound(Tag),

    /// The node's master copy is still referenced by a subdomain's external
    /// set and cannot be removed from the parent.
    #[error("node {0} is shared with a subdomain and cannot be removed from the parent")]
    NodeShared(Tag),

    /// An entity with this tag already exists in the targeted container.
    #[error("duplicate tag {0}")]
    DuplicateTag(Tag),

    /// An SP constraint targets a DOF index the node does not have.
    #[error("SP constraint {tag} targets DOF {dof} of node {node} with only {num_dofs} DOFs")]
    DofOutOfRange {
        tag: Tag,
        node: Tag,
        dof: usize,
        num_dofs: usize,
    },

    /// A nodal load vector does not match the node's DOF count.
    #[error("load {tag} has {len} entries for node {node} with {num_dofs} DOFs")]
    LoadShape {
        tag: Tag,
        node: Tag,
        len: usize,
        num_dofs: usize,
    },

    /// A constraint matrix does not match the constrained/retained DOF lists.
    #[error("constraint {tag}: matrix is {rows}x{cols}, expected {expected_rows}x{expected_cols}")]
    ConstraintShape {
        tag: Tag,
        rows: usize,
        cols: usize,
        expected_rows: usize,
        expected_cols: usize,
    },

    /// An element definition is degenerate (e.g. non-positive stiffness).
    #[error("element {tag} is invalid: {reason}")]
    InvalidElement { tag: Tag, reason: String },

    /// A required collaborator has not been configured.
    #[error("missing collaborator: {0}")]
    MissingCollaborator(&'static str),

    /// The connectivity graph must be built before partitioning.
    #[error("element connectivity graph must be built before any subdomain is created")]
    GraphNotBuilt,

    /// Partitioning was requested on an already partitioned domain.
    #[error("domain has already been partitioned")]
    AlreadyPartitioned,

    /// A subdomain was used as an element before `build` completed.
    #[error("subdomain {0} has not been built")]
    SubdomainNotBuilt(Tag),

    /// The condensed interior block could not be factorized.
    #[error("singular system: {0}")]
    SingularSystem(String),

    /// The analysis model is stale relative to the domain change stamp.
    #[error("model is stale: handled at stamp {handled}, domain is at stamp {current}")]
    StaleModel { handled: u64, current: u64 },

    /// A subdomain step failed; the code is forwarded unmodified.
    #[error("subdomain {tag} failed with code {code}")]
    SubdomainFailure { tag: Tag, code: i32 },

    /// The external partitioner rejected the request.
    #[error("partitioner failed: {0}")]
    Partitioner(String),

    /// A recorder callback failed during commit.
    #[error("recorder failed: {0}")]
    Recorder(String),
}

impl ModelError {
    /// Numeric failure code used for barrier aggregation across subdomains.
    ///
    /// Codes are negative; zero means success and is never produced by an
    /// error value.
    pub fn code(&self) -> i32 {
        match self {
            ModelError::SubdomainFailure { code, .. } => *code,
            ModelError::SingularSystem(_) => -2,
            ModelError::StaleModel { .. } => -3,
            _ => -1,
        }
    }
}
