//! Recorders: observers invoked after every successful commit.
//!
//! Recorders registered on a [`PartitionedDomain`](crate::partitioned::PartitionedDomain)
//! are clone-boxed onto every subdomain when the model is partitioned, so
//! each partition records its own share of the response.

use crate::domain::Domain;
use crate::Tag;

pub trait Recorder: Send {
    /// Called once per committed step with the domain the recorder is
    /// attached to.
    fn record(&mut self, domain: &Domain) -> eyre::Result<()>;

    /// Replication seam for partitioning.
    fn clone_box(&self) -> Box<dyn Recorder>;
}

impl Clone for Box<dyn Recorder> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Records the committed displacement history of one DOF of one node.
///
/// A recorder replicated onto a subdomain that does not own its target node
/// records nothing; exactly one copy in the partition sees the node.
#[derive(Debug, Clone, Default)]
pub struct NodeDispRecorder {
    node: Tag,
    dof: usize,
    history: Vec<(f64, f64)>,
}

impl NodeDispRecorder {
    pub fn new(node: Tag, dof: usize) -> Self {
        Self {
            node,
            dof,
            history: Vec::new(),
        }
    }

    /// `(committed time, committed displacement)` samples, one per commit
    /// that saw the target node.
    pub fn history(&self) -> &[(f64, f64)] {
        &self.history
    }
}

impl Recorder for NodeDispRecorder {
    fn record(&mut self, domain: &Domain) -> eyre::Result<()> {
        if let Some(node) = domain.node(self.node) {
            let disp = &node.committed().disp;
            eyre::ensure!(
                self.dof < disp.len(),
                "node {} has no DOF {}",
                self.node,
                self.dof
            );
            self.history.push((domain.committed_time(), disp[self.dof]));
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Recorder> {
        Box::new(self.clone())
    }
}
