//! The domain: tag-indexed containers for nodes, elements, constraints and
//! loads, plus the time and checkpoint state of the model.
//!
//! Structural mutations bump a monotonically increasing *change stamp*; the
//! analysis side compares stamps to decide when DOF groups and FE elements
//! must be rebuilt, instead of rebuilding lazily behind an accessor.

use nalgebra::DVector;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::constraint::{MpConstraint, SpConstraint};
use crate::element::Element;
use crate::error::{ModelError, Result};
use crate::node::Node;
use crate::Tag;

/// A load applied directly to the DOFs of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodalLoad {
    tag: Tag,
    node: Tag,
    values: DVector<f64>,
    time_varying: bool,
}

impl NodalLoad {
    /// A constant load, applied with the same magnitude at every time.
    pub fn constant(tag: Tag, node: Tag, values: DVector<f64>) -> Self {
        Self {
            tag,
            node,
            values,
            time_varying: false,
        }
    }

    /// A load scaled linearly by the domain time on application.
    pub fn linear(tag: Tag, node: Tag, values: DVector<f64>) -> Self {
        Self {
            tag,
            node,
            values,
            time_varying: true,
        }
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn node(&self) -> Tag {
        self.node
    }

    pub fn values(&self) -> &DVector<f64> {
        &self.values
    }

    fn values_at(&self, time: f64) -> DVector<f64> {
        if self.time_varying {
            &self.values * time
        } else {
            self.values.clone()
        }
    }
}

/// A self-contained finite element model.
///
/// Owns its nodes, elements, constraints and loads. Elements and constraints
/// reference nodes by tag; the domain validates those references on insertion
/// so that later assembly passes can treat lookup misses as contract
/// violations.
#[derive(Default)]
pub struct Domain {
    nodes: Vec<Node>,
    node_index: FxHashMap<Tag, usize>,

    elements: Vec<Box<dyn Element>>,
    element_index: FxHashMap<Tag, usize>,

    sp_constraints: Vec<SpConstraint>,
    sp_index: FxHashMap<Tag, usize>,

    mp_constraints: Vec<MpConstraint>,
    mp_index: FxHashMap<Tag, usize>,

    loads: Vec<NodalLoad>,
    load_index: FxHashMap<Tag, usize>,

    current_time: f64,
    committed_time: f64,
    stamp: u64,
}

impl Domain {
    pub fn new() -> Self {
        Self::default()
    }

    /// The change stamp, bumped by every structural mutation.
    pub fn stamp(&self) -> u64 {
        self.stamp
    }

    fn mark_changed(&mut self) {
        self.stamp += 1;
    }

    // --- nodes ---

    pub fn add_node(&mut self, node: Node) -> Result<()> {
        if self.node_index.contains_key(&node.tag()) {
            return Err(ModelError::DuplicateTag(node.tag()));
        }
        self.node_index.insert(node.tag(), self.nodes.len());
        self.nodes.push(node);
        self.mark_changed();
        Ok(())
    }

    pub fn remove_node(&mut self, tag: Tag) -> Result<Node> {
        let idx = self
            .node_index
            .remove(&tag)
            .ok_or(ModelError::NodeNotFound(tag))?;
        let node = self.nodes.swap_remove(idx);
        if let Some(moved) = self.nodes.get(idx) {
            self.node_index.insert(moved.tag(), idx);
        }
        self.mark_changed();
        Ok(node)
    }

    pub fn has_node(&self, tag: Tag) -> bool {
        self.node_index.contains_key(&tag)
    }

    pub fn node(&self, tag: Tag) -> Option<&Node> {
        self.node_index.get(&tag).map(|&i| &self.nodes[i])
    }

    pub fn node_mut(&mut self, tag: Tag) -> Option<&mut Node> {
        self.node_index.get(&tag).map(|&i| &mut self.nodes[i])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.iter_mut()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Total DOF count over all nodes.
    pub fn num_dofs(&self) -> usize {
        self.nodes.iter().map(Node::num_dofs).sum()
    }

    // --- elements ---

    /// Adds an element after validating that all referenced nodes exist.
    pub fn add_element(&mut self, element: Box<dyn Element>) -> Result<()> {
        if self.element_index.contains_key(&element.tag()) {
            return Err(ModelError::DuplicateTag(element.tag()));
        }
        for &node in element.node_tags() {
            if !self.has_node(node) {
                return Err(ModelError::NodeNotFound(node));
            }
        }
        self.element_index.insert(element.tag(), self.elements.len());
        self.elements.push(element);
        self.mark_changed();
        Ok(())
    }

    pub fn remove_element(&mut self, tag: Tag) -> Result<Box<dyn Element>> {
        let idx = self
            .element_index
            .remove(&tag)
            .ok_or(ModelError::ElementNotFound(tag))?;
        let element = self.elements.swap_remove(idx);
        if let Some(moved) = self.elements.get(idx) {
            self.element_index.insert(moved.tag(), idx);
        }
        self.mark_changed();
        Ok(element)
    }

    pub fn has_element(&self, tag: Tag) -> bool {
        self.element_index.contains_key(&tag)
    }

    pub fn element(&self, tag: Tag) -> Option<&dyn Element> {
        self.element_index.get(&tag).map(|&i| self.elements[i].as_ref())
    }

    pub fn elements(&self) -> impl Iterator<Item = &dyn Element> {
        self.elements.iter().map(|e| e.as_ref())
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    /// Node references for an element, in element-local order.
    ///
    /// # Panics
    ///
    /// Panics if the element or one of its nodes is missing: insertion
    /// validated the references, so a miss here is an invariant break.
    pub fn element_nodes(&self, tag: Tag) -> Vec<&Node> {
        let element = self
            .element(tag)
            .unwrap_or_else(|| panic!("element {} disappeared from the domain", tag));
        element
            .node_tags()
            .iter()
            .map(|&node| {
                self.node(node)
                    .unwrap_or_else(|| panic!("node {} of element {} disappeared from the domain", node, tag))
            })
            .collect()
    }

    // --- constraints ---

    pub fn add_sp_constraint(&mut self, sp: SpConstraint) -> Result<()> {
        if self.sp_index.contains_key(&sp.tag()) {
            return Err(ModelError::DuplicateTag(sp.tag()));
        }
        let node = self
            .node(sp.node())
            .ok_or(ModelError::NodeNotFound(sp.node()))?;
        if sp.dof() >= node.num_dofs() {
            return Err(ModelError::DofOutOfRange {
                tag: sp.tag(),
                node: sp.node(),
                dof: sp.dof(),
                num_dofs: node.num_dofs(),
            });
        }
        self.sp_index.insert(sp.tag(), self.sp_constraints.len());
        self.sp_constraints.push(sp);
        self.mark_changed();
        Ok(())
    }

    pub fn remove_sp_constraint(&mut self, tag: Tag) -> Result<SpConstraint> {
        let idx = self
            .sp_index
            .remove(&tag)
            .ok_or(ModelError::ConstraintNotFound(tag))?;
        let sp = self.sp_constraints.swap_remove(idx);
        if let Some(moved) = self.sp_constraints.get(idx) {
            self.sp_index.insert(moved.tag(), idx);
        }
        self.mark_changed();
        Ok(sp)
    }

    pub fn sp_constraints(&self) -> &[SpConstraint] {
        &self.sp_constraints
    }

    pub fn sp_constraint(&self, tag: Tag) -> Option<&SpConstraint> {
        self.sp_index.get(&tag).map(|&i| &self.sp_constraints[i])
    }

    pub fn add_mp_constraint(&mut self, mp: MpConstraint) -> Result<()> {
        if self.mp_index.contains_key(&mp.tag()) {
            return Err(ModelError::DuplicateTag(mp.tag()));
        }
        if !self.has_node(mp.constrained_node()) {
            return Err(ModelError::NodeNotFound(mp.constrained_node()));
        }
        for retained in mp.retained() {
            if !self.has_node(retained.node) {
                return Err(ModelError::NodeNotFound(retained.node));
            }
        }
        self.mp_index.insert(mp.tag(), self.mp_constraints.len());
        self.mp_constraints.push(mp);
        self.mark_changed();
        Ok(())
    }

    pub fn remove_mp_constraint(&mut self, tag: Tag) -> Result<MpConstraint> {
        let idx = self
            .mp_index
            .remove(&tag)
            .ok_or(ModelError::ConstraintNotFound(tag))?;
        let mp = self.mp_constraints.swap_remove(idx);
        if let Some(moved) = self.mp_constraints.get(idx) {
            self.mp_index.insert(moved.tag(), idx);
        }
        self.mark_changed();
        Ok(mp)
    }

    pub fn mp_constraints(&self) -> &[MpConstraint] {
        &self.mp_constraints
    }

    pub fn mp_constraint(&self, tag: Tag) -> Option<&MpConstraint> {
        self.mp_index.get(&tag).map(|&i| &self.mp_constraints[i])
    }

    // --- loads ---

    pub fn add_nodal_load(&mut self, load: NodalLoad) -> Result<()> {
        if self.load_index.contains_key(&load.tag()) {
            return Err(ModelError::DuplicateTag(load.tag()));
        }
        let node = self
            .node(load.node())
            .ok_or(ModelError::NodeNotFound(load.node()))?;
        if load.values().len() != node.num_dofs() {
            return Err(ModelError::LoadShape {
                tag: load.tag(),
                node: load.node(),
                len: load.values().len(),
                num_dofs: node.num_dofs(),
            });
        }
        self.load_index.insert(load.tag(), self.loads.len());
        self.loads.push(load);
        Ok(())
    }

    pub fn remove_nodal_load(&mut self, tag: Tag) -> Result<NodalLoad> {
        let idx = self
            .load_index
            .remove(&tag)
            .ok_or(ModelError::ConstraintNotFound(tag))?;
        let load = self.loads.swap_remove(idx);
        if let Some(moved) = self.loads.get(idx) {
            self.load_index.insert(moved.tag(), idx);
        }
        Ok(load)
    }

    pub fn nodal_loads(&self) -> &[NodalLoad] {
        &self.loads
    }

    /// Re-applies all loads at the given time: zeroes every node's
    /// unbalanced load, then accumulates each nodal load (time-varying loads
    /// scaled by `time`). Sets the current domain time.
    pub fn apply_load(&mut self, time: f64) {
        self.current_time = time;
        for node in &mut self.nodes {
            node.zero_unbalanced_load();
        }
        for load in &self.loads {
            let values = load.values_at(time);
            let idx = self.node_index[&load.node()];
            self.nodes[idx].add_unbalanced_load(&values);
        }
    }

    /// Starts a new analysis step: advances the clock by `dt` and re-applies
    /// every load at the new time.
    pub fn new_step(&mut self, dt: f64) {
        let time = self.current_time + dt;
        self.apply_load(time);
    }

    // --- time and checkpoint state ---

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn committed_time(&self) -> f64 {
        self.committed_time
    }

    pub fn set_current_time(&mut self, time: f64) {
        self.current_time = time;
    }

    pub fn set_committed_time(&mut self, time: f64) {
        self.committed_time = time;
    }

    /// Accepts the trial state of every node as the new checkpoint.
    pub fn commit(&mut self) {
        for node in &mut self.nodes {
            node.commit_state();
        }
        self.committed_time = self.current_time;
    }

    /// Restores every node's last committed state.
    pub fn revert_to_last_commit(&mut self) {
        for node in &mut self.nodes {
            node.revert_to_last_commit();
        }
        self.current_time = self.committed_time;
    }

    /// Zeroes all response state and resets the clock.
    pub fn revert_to_start(&mut self) {
        for node in &mut self.nodes {
            node.revert_to_start();
        }
        self.current_time = 0.0;
        self.committed_time = 0.0;
    }
}
