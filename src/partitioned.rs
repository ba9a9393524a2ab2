//! The partitioned domain: ungrouped model entities plus a set of
//! subdomains, with domain-wide operations forwarded to every partition.
//!
//! Mutations that must stay visible to all partitions go through this type.
//! Constraint and load additions probe the ungrouped store first, then every
//! subdomain, attaching to the first owner of the target node. Life-cycle
//! calls (`commit`, `revert_to_last_commit`, `update`, ...) apply to the
//! ungrouped store and then to every subdomain, failing fast on the first
//! subdomain error.

use std::sync::Mutex;

use log::{debug, error};
use nalgebra::DVector;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::analysis::StaticAnalysis;
use crate::constraint::{MpConstraint, SpConstraint};
use crate::domain::{Domain, NodalLoad};
use crate::element::Element;
use crate::error::{ModelError, Result};
use crate::graph::Graph;
use crate::handler::ConstraintHandler;
use crate::node::Node;
use crate::partitioner::Partitioner;
use crate::recorder::Recorder;
use crate::subdomain::Subdomain;
use crate::Tag;

/// The rendezvous point of one distributed step: every subdomain checks in
/// with its local result code, the worst (most negative) code is broadcast
/// back, and all subdomains observe the same outcome.
pub struct StepBarrier {
    expected: usize,
    codes: Mutex<Vec<i32>>,
}

impl StepBarrier {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            codes: Mutex::new(Vec::with_capacity(expected)),
        }
    }

    /// Reports one participant's local result code.
    pub fn check_in(&self, code: i32) {
        let mut codes = self.codes.lock().expect("barrier mutex poisoned");
        assert!(
            codes.len() < self.expected,
            "more barrier check-ins than participants"
        );
        codes.push(code);
    }

    /// The code broadcast back to every participant: zero if all check-ins
    /// succeeded, otherwise the worst reported code.
    ///
    /// # Panics
    ///
    /// Panics unless every participant has checked in; releasing the barrier
    /// early would let partitions drift apart.
    pub fn check_out(&self) -> i32 {
        let codes = self.codes.lock().expect("barrier mutex poisoned");
        assert_eq!(
            codes.len(),
            self.expected,
            "barrier released before all participants checked in"
        );
        codes.iter().copied().min().unwrap_or(0)
    }
}

/// Where an element (and transitively its nodes) lands after partitioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Part {
    /// Stays in the ungrouped store.
    Main,
    Sub(usize),
}

/// A finite element model split into an ungrouped share and a collection of
/// independently analyzable subdomains.
pub struct PartitionedDomain {
    ungrouped: Domain,
    subdomains: Vec<Subdomain>,
    partitioner: Box<dyn Partitioner>,
    recorders: Vec<Box<dyn Recorder>>,
    element_graph: Option<Graph>,
}

impl PartitionedDomain {
    pub fn new(partitioner: Box<dyn Partitioner>) -> Self {
        Self {
            ungrouped: Domain::new(),
            subdomains: Vec::new(),
            partitioner,
            recorders: Vec::new(),
            element_graph: None,
        }
    }

    /// The ungrouped store: entities not assigned to any subdomain.
    pub fn ungrouped(&self) -> &Domain {
        &self.ungrouped
    }

    // --- nodes and elements ---

    pub fn add_node(&mut self, node: Node) -> Result<()> {
        self.ungrouped.add_node(node)
    }

    /// Removes a node from the ungrouped store, or from the first subdomain
    /// owning it. A master copy whose external clones still live in a
    /// subdomain cannot be removed; the subdomain's elements would be left
    /// dangling.
    pub fn remove_node(&mut self, tag: Tag) -> Result<Node> {
        if self.ungrouped.has_node(tag) {
            if self.subdomains.iter().any(|s| s.has_node(tag)) {
                return Err(ModelError::NodeShared(tag));
            }
            return self.ungrouped.remove_node(tag);
        }
        for subdomain in &mut self.subdomains {
            if subdomain.has_node(tag) {
                return subdomain.remove_node(tag);
            }
        }
        Err(ModelError::NodeNotFound(tag))
    }

    /// A node by tag, wherever it is owned. The ungrouped master copy wins
    /// over subdomain external copies.
    pub fn node(&self, tag: Tag) -> Option<&Node> {
        self.ungrouped.node(tag).or_else(|| {
            self.subdomains
                .iter()
                .find_map(|s| s.domain().node(tag))
        })
    }

    pub fn add_element(&mut self, element: Box<dyn Element>) -> Result<()> {
        self.ungrouped.add_element(element)
    }

    pub fn remove_element(&mut self, tag: Tag) -> Result<Box<dyn Element>> {
        if self.ungrouped.has_element(tag) {
            return self.ungrouped.remove_element(tag);
        }
        for subdomain in &mut self.subdomains {
            if subdomain.has_element(tag) {
                return subdomain.remove_element(tag);
            }
        }
        Err(ModelError::ElementNotFound(tag))
    }

    /// Elements in the ungrouped store plus every subdomain.
    pub fn num_elements(&self) -> usize {
        self.ungrouped.num_elements()
            + self
                .subdomains
                .iter()
                .map(Subdomain::num_elements)
                .sum::<usize>()
    }

    // --- subdomains ---

    pub fn add_subdomain(&mut self, subdomain: Subdomain) -> Result<()> {
        if self.subdomains.iter().any(|s| s.tag() == subdomain.tag()) {
            return Err(ModelError::DuplicateTag(subdomain.tag()));
        }
        self.subdomains.push(subdomain);
        Ok(())
    }

    pub fn remove_subdomain(&mut self, tag: Tag) -> Result<Subdomain> {
        let idx = self
            .subdomains
            .iter()
            .position(|s| s.tag() == tag)
            .ok_or(ModelError::SubdomainNotFound(tag))?;
        Ok(self.subdomains.remove(idx))
    }

    pub fn subdomain(&self, tag: Tag) -> Option<&Subdomain> {
        self.subdomains.iter().find(|s| s.tag() == tag)
    }

    pub fn subdomain_mut(&mut self, tag: Tag) -> Option<&mut Subdomain> {
        self.subdomains.iter_mut().find(|s| s.tag() == tag)
    }

    pub fn subdomains(&self) -> &[Subdomain] {
        &self.subdomains
    }

    pub fn num_subdomains(&self) -> usize {
        self.subdomains.len()
    }

    // --- constraints and loads ---

    /// Attaches the constraint to whichever store owns the target node.
    pub fn add_sp_constraint(&mut self, sp: SpConstraint) -> Result<()> {
        let node = sp.node();
        if self.ungrouped.has_node(node) {
            return self.ungrouped.add_sp_constraint(sp);
        }
        for subdomain in &mut self.subdomains {
            if subdomain.has_node(node) {
                return subdomain.add_sp_constraint(sp);
            }
        }
        Err(ModelError::NodeNotInModel(node))
    }

    pub fn remove_sp_constraint(&mut self, tag: Tag) -> Result<SpConstraint> {
        if self.ungrouped.sp_constraint(tag).is_some() {
            return self.ungrouped.remove_sp_constraint(tag);
        }
        for subdomain in &mut self.subdomains {
            if subdomain.domain().sp_constraint(tag).is_some() {
                return subdomain.remove_sp_constraint(tag);
            }
        }
        Err(ModelError::ConstraintNotFound(tag))
    }

    /// Attaches the constraint to whichever store owns the constrained node.
    pub fn add_mp_constraint(&mut self, mp: MpConstraint) -> Result<()> {
        let node = mp.constrained_node();
        if self.ungrouped.has_node(node) {
            return self.ungrouped.add_mp_constraint(mp);
        }
        for subdomain in &mut self.subdomains {
            if subdomain.has_node(node) {
                return subdomain.add_mp_constraint(mp);
            }
        }
        Err(ModelError::NodeNotInModel(node))
    }

    pub fn remove_mp_constraint(&mut self, tag: Tag) -> Result<MpConstraint> {
        if self.ungrouped.mp_constraint(tag).is_some() {
            return self.ungrouped.remove_mp_constraint(tag);
        }
        for subdomain in &mut self.subdomains {
            if subdomain.domain().mp_constraint(tag).is_some() {
                return subdomain.remove_mp_constraint(tag);
            }
        }
        Err(ModelError::ConstraintNotFound(tag))
    }

    /// Attaches the load to whichever store owns the target node.
    pub fn add_nodal_load(&mut self, load: NodalLoad) -> Result<()> {
        let node = load.node();
        if self.ungrouped.has_node(node) {
            return self.ungrouped.add_nodal_load(load);
        }
        for subdomain in &mut self.subdomains {
            if subdomain.has_node(node) {
                return subdomain.add_nodal_load(load);
            }
        }
        Err(ModelError::NodeNotInModel(node))
    }

    pub fn remove_nodal_load(&mut self, tag: Tag) -> Result<NodalLoad> {
        if self
            .ungrouped
            .nodal_loads()
            .iter()
            .any(|l| l.tag() == tag)
        {
            return self.ungrouped.remove_nodal_load(tag);
        }
        for subdomain in &mut self.subdomains {
            if subdomain.domain().nodal_loads().iter().any(|l| l.tag() == tag) {
                return subdomain.remove_nodal_load(tag);
            }
        }
        Err(ModelError::ConstraintNotFound(tag))
    }

    // --- recorders ---

    /// Registers a recorder. It is replicated onto every existing subdomain
    /// immediately, and onto every subdomain created by a later `partition`.
    pub fn add_recorder(&mut self, recorder: Box<dyn Recorder>) {
        for subdomain in &mut self.subdomains {
            subdomain.add_recorder(recorder.clone_box());
        }
        self.recorders.push(recorder);
    }

    // --- partitioning ---

    /// Builds and stores the element connectivity graph of the ungrouped
    /// store. Must run before any subdomain exists: building it afterwards
    /// would see an already-fragmented element set.
    pub fn build_element_graph(&mut self) -> Result<()> {
        if !self.subdomains.is_empty() {
            return Err(ModelError::AlreadyPartitioned);
        }
        self.element_graph = Some(Graph::element_connectivity(&self.ungrouped));
        Ok(())
    }

    pub fn element_graph(&self) -> Option<&Graph> {
        self.element_graph.as_ref()
    }

    /// Splits the ungrouped elements into `num_partitions` shares using the
    /// configured partitioner and moves each share into a new subdomain
    /// built with a handler from `handler`. With `using_main`, the share of
    /// partition `main_id` stays in the ungrouped store instead.
    ///
    /// Node ownership: a node used by exactly one subdomain's elements and
    /// carrying no constraint or load moves into that subdomain; every other
    /// node referenced by a moved element is cloned into each touching
    /// subdomain as an external node while the master copy stays here.
    ///
    /// Requires [`build_element_graph`](Self::build_element_graph) first and
    /// fails if any subdomain already exists.
    pub fn partition(
        &mut self,
        num_partitions: usize,
        using_main: bool,
        main_id: usize,
        handler: &dyn Fn() -> Box<dyn ConstraintHandler>,
    ) -> Result<()> {
        if !self.subdomains.is_empty() {
            return Err(ModelError::AlreadyPartitioned);
        }
        let graph = self.element_graph.as_ref().ok_or(ModelError::GraphNotBuilt)?;
        let assignment = self.partitioner.partition(graph, num_partitions)?;
        self.element_graph = None;

        let part_of = |element: Tag| match assignment.get(&element) {
            Some(&p) if using_main && p == main_id => Part::Main,
            Some(&p) => Part::Sub(p),
            // Elements added after the graph was built stay ungrouped.
            None => Part::Main,
        };

        let mut new_subdomains: FxHashMap<usize, Subdomain> = FxHashMap::default();
        for p in 0..num_partitions {
            if using_main && p == main_id {
                continue;
            }
            new_subdomains.insert(p, Subdomain::new(p));
        }

        // Which partitions touch each node, in ungrouped iteration order.
        let mut touching: FxHashMap<Tag, FxHashSet<Part>> = FxHashMap::default();
        let mut moved_elements: Vec<(Tag, usize)> = Vec::new();
        for element in self.ungrouped.elements() {
            let part = part_of(element.tag());
            for &node in element.node_tags() {
                touching.entry(node).or_default().insert(part);
            }
            if let Part::Sub(p) = part {
                moved_elements.push((element.tag(), p));
            }
        }

        // Nodes that must stay visible in the parent regardless of element
        // ownership.
        let mut pinned: FxHashSet<Tag> = FxHashSet::default();
        for sp in self.ungrouped.sp_constraints() {
            pinned.insert(sp.node());
        }
        for mp in self.ungrouped.mp_constraints() {
            pinned.insert(mp.constrained_node());
            for retained in mp.retained() {
                pinned.insert(retained.node);
            }
        }
        for load in self.ungrouped.nodal_loads() {
            pinned.insert(load.node());
        }

        let node_tags: Vec<Tag> = self.ungrouped.nodes().map(Node::tag).collect();
        for tag in node_tags {
            let Some(parts) = touching.get(&tag) else { continue };
            let exclusive = match parts.iter().next() {
                Some(&Part::Sub(p)) if parts.len() == 1 && !pinned.contains(&tag) => Some(p),
                _ => None,
            };
            if let Some(p) = exclusive {
                let node = self.ungrouped.remove_node(tag)?;
                new_subdomains
                    .get_mut(&p)
                    .expect("assignment only names created partitions")
                    .add_internal_node(node)?;
            } else {
                let node = self
                    .ungrouped
                    .node(tag)
                    .expect("tag collected from the node store")
                    .clone();
                for part in parts {
                    if let Part::Sub(p) = *part {
                        new_subdomains
                            .get_mut(&p)
                            .expect("assignment only names created partitions")
                            .add_external_node(node.clone())?;
                    }
                }
            }
        }

        for (tag, p) in moved_elements {
            let element = self.ungrouped.remove_element(tag)?;
            new_subdomains
                .get_mut(&p)
                .expect("assignment only names created partitions")
                .add_element(element)?;
        }

        let mut subdomains: Vec<Subdomain> = new_subdomains.into_values().collect();
        subdomains.sort_by_key(Subdomain::tag);
        for subdomain in &mut subdomains {
            subdomain.build(handler());
            for recorder in &self.recorders {
                subdomain.add_recorder(recorder.clone_box());
            }
        }
        self.subdomains = subdomains;
        Ok(())
    }

    // --- life-cycle forwards ---

    /// Re-applies all loads everywhere at the given time.
    pub fn apply_load(&mut self, time: f64) {
        self.ungrouped.apply_load(time);
        for subdomain in &mut self.subdomains {
            subdomain.apply_load(time);
        }
    }

    /// Starts a new step everywhere: every clock advances by `dt` and all
    /// loads are re-applied at the new time.
    pub fn new_step(&mut self, dt: f64) {
        self.ungrouped.new_step(dt);
        for subdomain in &mut self.subdomains {
            subdomain.new_step(dt);
        }
    }

    pub fn set_current_time(&mut self, time: f64) {
        self.ungrouped.set_current_time(time);
        for subdomain in &mut self.subdomains {
            subdomain.set_current_time(time);
        }
    }

    pub fn set_committed_time(&mut self, time: f64) {
        self.ungrouped.set_committed_time(time);
        for subdomain in &mut self.subdomains {
            subdomain.set_committed_time(time);
        }
    }

    /// Commits everywhere, invokes recorders, and consults the partitioner
    /// for a load-rebalance whenever at least one subdomain exists. The
    /// rebalance is advisory: recommended moves are logged, not applied.
    pub fn commit(&mut self) -> Result<()> {
        self.ungrouped.commit();
        for recorder in &mut self.recorders {
            if let Err(err) = recorder.record(&self.ungrouped) {
                error!("recorder failed during commit: {:#}", err);
                return Err(ModelError::Recorder(err.to_string()));
            }
        }
        for subdomain in &mut self.subdomains {
            subdomain.commit()?;
        }

        if !self.subdomains.is_empty() {
            let graph = Graph::subdomain_connectivity(&self.subdomains);
            for (from, to) in self.partitioner.balance(&graph)? {
                debug!(
                    "load balance: subdomain {} should shed load to subdomain {}",
                    from, to
                );
            }
        }
        Ok(())
    }

    pub fn revert_to_last_commit(&mut self) {
        self.ungrouped.revert_to_last_commit();
        for subdomain in &mut self.subdomains {
            subdomain.revert_to_last_commit();
        }
    }

    pub fn revert_to_start(&mut self) {
        self.ungrouped.revert_to_start();
        for subdomain in &mut self.subdomains {
            subdomain.revert_to_start();
        }
    }

    /// Pushes the parent's solved interface displacements into every
    /// subdomain and back-substitutes their interiors, in parallel. All
    /// subdomains pass a rendezvous barrier; if any fails, the worst code is
    /// broadcast and reported, and no subdomain starts the next step early.
    pub fn update(&mut self) -> Result<()> {
        if self.subdomains.is_empty() {
            return Ok(());
        }

        // Interface displacements read from the master copies up front, so
        // the parallel pass only touches subdomain-local state.
        let boundary: Vec<FxHashMap<Tag, DVector<f64>>> = self
            .subdomains
            .iter()
            .map(|subdomain| {
                subdomain
                    .external_node_tags()
                    .iter()
                    .filter_map(|&tag| {
                        self.ungrouped
                            .node(tag)
                            .map(|n| (tag, n.trial_disp().clone()))
                    })
                    .collect()
            })
            .collect();

        let barrier = StepBarrier::new(self.subdomains.len());
        let failures: Mutex<Vec<(Tag, i32)>> = Mutex::new(Vec::new());
        self.subdomains
            .par_iter_mut()
            .zip(boundary.par_iter())
            .for_each(|(subdomain, disp)| {
                let code = match subdomain.update(disp) {
                    Ok(()) => 0,
                    Err(err) => {
                        error!("subdomain {} update failed: {}", subdomain.tag(), err);
                        err.code()
                    }
                };
                barrier.check_in(code);
                if code != 0 {
                    failures
                        .lock()
                        .expect("failure mutex poisoned")
                        .push((subdomain.tag(), code));
                }
            });

        let worst = barrier.check_out();
        if worst == 0 {
            return Ok(());
        }
        let failures = failures.into_inner().expect("failure mutex poisoned");
        let &(tag, code) = failures
            .iter()
            .find(|&&(_, code)| code == worst)
            .expect("a non-zero broadcast code was checked in");
        Err(ModelError::SubdomainFailure { tag, code })
    }

    /// One full static step: load application, parent solve over ungrouped
    /// entities plus condensed subdomains, then the parallel interior update.
    pub fn analyze_step(&mut self, analysis: &mut StaticAnalysis, time: f64) -> Result<()> {
        self.apply_load(time);
        analysis.analyze_step(&mut self.ungrouped, &mut self.subdomains, None)?;
        self.update()
    }
}
