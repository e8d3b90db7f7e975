//! Task graph infrastructure.
//!
//! A [`TaskGraph`] owns the task nodes of one pipeline instance and the edges
//! between them. After all nodes and edges are registered,
//! [`TaskGraph::build_priorities`] derives the two tables frame execution
//! depends on:
//!
//! - `priority[name]`: the node's position in a topological order (ties broken
//!   by insertion order). Lower priorities submit first.
//! - `dependencies[priority]`: the priorities of the node's direct
//!   predecessors, i.e. what must be released before it may be.
//!
//! # Architecture
//!
//! | Layer | Type | Purpose |
//! |-------|------|---------|
//! | Pipeline | [`CrossDeviceCoordinator`](crate::pipeline::CrossDeviceCoordinator) | Two graphs on two devices, one frame apart |
//! | Renderer | [`GraphRenderer`](crate::renderer::GraphRenderer) | One graph on one device, frame by frame |
//! | **Graph** | [`TaskGraph`] | Node dependencies and frame execution (this module) |
//! | Reconciler | [`CompletionReconciler`](crate::scheduler::CompletionReconciler) | Out-of-order completion, in-order submission |
//! | Node | [`TaskNode`] | Single unit of command recording |
//!
//! # Execution modes
//!
//! - [`ExecutionMode::Sequential`] records every node on the calling thread in
//!   ascending priority order and submits each buffer as soon as it is
//!   recorded. No reconciliation is needed.
//! - [`ExecutionMode::Parallel`] dispatches the roots onto a [`WorkerPool`];
//!   a node that finishes dispatches its successors. Each node carries an
//!   in-flight flag, so a node reachable from several predecessors is still
//!   recorded exactly once. Recording order is unconstrained; the completion
//!   reconciler restores a dependency-respecting submission order.
//!
//! # Example
//!
//! ```
//! use tandem_graphics::{NodeContext, TaskGraph, TaskNode};
//!
//! let noop = |_: &mut NodeContext<'_>| {};
//!
//! let mut graph = TaskGraph::new();
//! graph.add_node(TaskNode::new("shadow", noop)).unwrap();
//! graph.add_node(TaskNode::new("lighting", noop)).unwrap();
//! graph.connect("shadow", "lighting").unwrap();
//! graph.build_priorities().unwrap();
//!
//! assert_eq!(graph.priority("lighting"), Some(1));
//! assert_eq!(graph.dependencies_of(1), Some(&[0][..]));
//! ```

mod dot;
mod node;
mod worker;

pub use node::{NodeContext, TaskBody, TaskNode};
pub use worker::WorkerPool;

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::context::{CommandPool, RenderContext};
use crate::device::DeviceQueue;
use crate::error::GraphError;
use crate::resources::{ResourceTable, UniformRing};
use crate::scheduler::{CompletionReconciler, CompletionReporter, FrameReport, FrameSubmissionState};

/// Position of a node in the submission order. Lower submits first.
pub type Priority = usize;

/// Handle to a node in a task graph.
///
/// Only valid within the `TaskGraph` that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Insertion index of the node.
    pub fn index(self) -> usize {
        self.0
    }
}

/// `dependencies[priority]`: direct predecessor priorities of every node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyTable {
    lists: Vec<Vec<Priority>>,
}

impl DependencyTable {
    /// Build a table from per-priority predecessor lists.
    ///
    /// Every listed dependency must be lower than the priority it gates.
    pub fn from_lists(lists: Vec<Vec<Priority>>) -> Self {
        debug_assert!(
            lists
                .iter()
                .enumerate()
                .all(|(p, deps)| deps.iter().all(|&d| d < p)),
            "dependency priorities must precede the node they gate"
        );
        Self { lists }
    }

    /// Direct predecessors of `priority`, ascending.
    pub fn dependencies(&self, priority: Priority) -> &[Priority] {
        self.lists.get(priority).map_or(&[], Vec::as_slice)
    }

    /// Number of priorities in the table.
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}

/// How a graph records its nodes each frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ExecutionMode {
    /// Record on the calling thread, ascending priority.
    Sequential,
    /// Record on a worker pool, reconcile completions.
    #[default]
    Parallel,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Parallel => write!(f, "parallel"),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequential" => Ok(Self::Sequential),
            "parallel" => Ok(Self::Parallel),
            other => Err(GraphError::InvalidParameter(format!(
                "unknown execution mode `{other}`"
            ))),
        }
    }
}

/// Structural settings passed to node bodies when resources are recreated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphSettings {
    /// Render resolution in pixels.
    pub resolution: (u32, u32),
    /// Number of frames in flight.
    pub frames_in_flight: u32,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            resolution: (1280, 720),
            frames_in_flight: 2,
        }
    }
}

impl GraphSettings {
    /// Set the render resolution.
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution = (width, height);
        self
    }

    /// Set the number of frames in flight.
    pub fn with_frames_in_flight(mut self, frames: u32) -> Self {
        self.frames_in_flight = frames;
        self
    }
}

/// Per-frame inputs handed to every node.
#[derive(Debug, Clone, Copy)]
pub struct FrameInputs<'a> {
    /// Frame index.
    pub frame: u64,
    /// Camera and draw lists from the scene layer.
    pub render: &'a RenderContext,
    /// Command pool from the device layer.
    pub commands: &'a CommandPool,
    /// The graph's resource table.
    pub resources: &'a ResourceTable,
    /// The graph's uniform allocator, already reset for this frame.
    pub uniforms: &'a UniformRing,
}

/// Tables derived by `build_priorities()`.
#[derive(Debug)]
struct BuiltOrder {
    /// Node ids by priority.
    order: Vec<NodeId>,
    dependencies: DependencyTable,
    /// Successor priorities by priority.
    successors: Vec<Vec<Priority>>,
    /// Priorities of nodes without predecessors.
    roots: Vec<Priority>,
}

/// Owns the task nodes of one pipeline instance.
#[derive(Debug, Default)]
pub struct TaskGraph {
    nodes: Vec<TaskNode>,
    by_name: HashMap<String, NodeId>,
    built: Option<BuiltOrder>,
}

impl TaskGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node. Fails if its name is already used.
    pub fn add_node(&mut self, node: TaskNode) -> Result<NodeId, GraphError> {
        if self.by_name.contains_key(node.name()) {
            return Err(GraphError::DuplicateNode(node.name().to_string()));
        }
        let id = NodeId(self.nodes.len());
        self.by_name.insert(node.name().to_string(), id);
        self.nodes.push(node);
        self.invalidate();
        Ok(id)
    }

    /// Add the edge `from -> to`: `to` may only submit after `from`.
    ///
    /// Adding an existing edge again is a no-op.
    pub fn connect(&mut self, from: &str, to: &str) -> Result<(), GraphError> {
        let from_id = self.lookup(from)?;
        let to_id = self.lookup(to)?;
        if from_id == to_id {
            return Err(GraphError::SelfEdge(from.to_string()));
        }
        let successors = &mut self.nodes[from_id.0].successors;
        if !successors.contains(&to_id) {
            successors.push(to_id);
            self.invalidate();
        }
        Ok(())
    }

    /// Bind `consumer`'s local input `local` to the producer output `output`.
    pub fn set_input_resource(
        &mut self,
        consumer: &str,
        local: &str,
        output: &str,
    ) -> Result<(), GraphError> {
        let id = self.lookup(consumer)?;
        if let Some(previous) = self.nodes[id.0].bind(local.to_string(), output.to_string()) {
            log::debug!("`{consumer}.{local}` rebound from `{previous}` to `{output}`");
        }
        self.invalidate();
        Ok(())
    }

    /// Validate bindings, sort the nodes topologically, and derive the
    /// priority and dependency tables.
    ///
    /// Deterministic and idempotent for an unchanged set of nodes and edges.
    /// Must succeed before the first frame is executed.
    pub fn build_priorities(&mut self) -> Result<(), GraphError> {
        tandem_core::profile_function!();

        self.validate_bindings()?;

        let n = self.nodes.len();
        let mut in_degrees = vec![0usize; n];
        for node in &self.nodes {
            for succ in &node.successors {
                in_degrees[succ.0] += 1;
            }
        }

        // Kahn's algorithm; the min-heap keeps ties in insertion order.
        let mut remaining = in_degrees.clone();
        let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
            .filter(|&i| in_degrees[i] == 0)
            .map(Reverse)
            .collect();
        let mut order = Vec::with_capacity(n);
        while let Some(Reverse(index)) = ready.pop() {
            order.push(NodeId(index));
            for succ in &self.nodes[index].successors {
                remaining[succ.0] -= 1;
                if remaining[succ.0] == 0 {
                    ready.push(Reverse(succ.0));
                }
            }
        }

        if order.len() < n {
            let involved = (0..n)
                .filter(|&i| remaining[i] > 0)
                .map(|i| self.nodes[i].name().to_string())
                .collect();
            self.invalidate();
            return Err(GraphError::CyclicDependency(involved));
        }

        let mut priority_of = vec![0; n];
        for (priority, id) in order.iter().enumerate() {
            priority_of[id.0] = priority;
        }

        let mut dependencies = vec![Vec::new(); n];
        let mut successors = vec![Vec::new(); n];
        for (index, node) in self.nodes.iter().enumerate() {
            let priority = priority_of[index];
            for succ in &node.successors {
                let succ_priority = priority_of[succ.0];
                dependencies[succ_priority].push(priority);
                successors[priority].push(succ_priority);
            }
        }
        dependencies.iter_mut().for_each(|deps| deps.sort_unstable());
        successors.iter_mut().for_each(|succs| succs.sort_unstable());

        let roots: Vec<Priority> = (0..n).filter(|&p| dependencies[p].is_empty()).collect();

        for (index, node) in self.nodes.iter_mut().enumerate() {
            node.priority = Some(priority_of[index]);
        }

        log::info!("task graph built: {} nodes, {} roots", n, roots.len());

        self.built = Some(BuiltOrder {
            order,
            dependencies: DependencyTable::from_lists(dependencies),
            successors,
            roots,
        });
        Ok(())
    }

    /// Whether `build_priorities()` succeeded since the last structural change.
    pub fn is_built(&self) -> bool {
        self.built.is_some()
    }

    /// Priority of a node, once built.
    pub fn priority(&self, name: &str) -> Option<Priority> {
        self.by_name.get(name).and_then(|id| self.nodes[id.0].priority)
    }

    /// The dependency table, once built.
    pub fn dependencies(&self) -> Option<&DependencyTable> {
        self.built.as_ref().map(|b| &b.dependencies)
    }

    /// Direct predecessor priorities of `priority`, once built.
    pub fn dependencies_of(&self, priority: Priority) -> Option<&[Priority]> {
        let built = self.built.as_ref()?;
        (priority < built.order.len()).then(|| built.dependencies.dependencies(priority))
    }

    /// Names of the nodes without predecessors, by priority. Empty until built.
    pub fn roots(&self) -> Vec<&str> {
        self.built.as_ref().map_or_else(Vec::new, |b| {
            b.roots
                .iter()
                .map(|&p| self.nodes[b.order[p].0].name())
                .collect()
        })
    }

    /// Node names in submission order. Empty until built.
    pub fn submission_order(&self) -> Vec<&str> {
        self.built.as_ref().map_or_else(Vec::new, |b| {
            b.order.iter().map(|id| self.nodes[id.0].name()).collect()
        })
    }

    /// Name of the node with `priority`, once built.
    pub fn name_of(&self, priority: Priority) -> Option<&str> {
        let built = self.built.as_ref()?;
        built.order.get(priority).map(|id| self.nodes[id.0].name())
    }

    /// Look up a node by name.
    pub fn node(&self, name: &str) -> Option<&TaskNode> {
        self.by_name.get(name).map(|id| &self.nodes[id.0])
    }

    /// Look up a node id by name.
    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> &[TaskNode] {
        &self.nodes
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Let every node (re)create its long-lived resources.
    ///
    /// Called on structural changes such as a resolution update. Topology and
    /// priorities are left untouched.
    pub fn recreate_resources(&self, settings: &GraphSettings, resources: &ResourceTable) {
        log::debug!(
            "recreating resources of {} task nodes at {}x{}",
            self.nodes.len(),
            settings.resolution.0,
            settings.resolution.1
        );
        for node in &self.nodes {
            node.recreate(settings, resources);
        }
    }

    /// Record every node once and submit in a dependency-respecting order.
    ///
    /// `pool` is required in [`ExecutionMode::Parallel`] and ignored otherwise.
    pub fn begin_frame(
        &self,
        mode: ExecutionMode,
        inputs: &FrameInputs<'_>,
        pool: Option<&WorkerPool>,
        device: &dyn DeviceQueue,
    ) -> Result<FrameReport, GraphError> {
        let built = self.built.as_ref().ok_or(GraphError::NotBuilt)?;
        match mode {
            ExecutionMode::Sequential => Ok(self.execute_sequential(built, inputs, device)),
            ExecutionMode::Parallel => {
                let pool = pool.ok_or(GraphError::NoWorkerPool)?;
                Ok(self.execute_parallel(built, inputs, pool, device))
            }
        }
    }

    fn execute_sequential(
        &self,
        built: &BuiltOrder,
        inputs: &FrameInputs<'_>,
        device: &dyn DeviceQueue,
    ) -> FrameReport {
        tandem_core::profile_scope!("graph: sequential frame");

        let mut batches = Vec::with_capacity(built.order.len());
        for (priority, id) in built.order.iter().enumerate() {
            let buffer = self.nodes[id.0].record(inputs);
            device.submit(std::slice::from_ref(&buffer));
            batches.push(vec![priority]);
        }

        let fence = device.flush();
        log::debug!(
            "frame {}: {} buffers recorded sequentially on {}",
            inputs.frame,
            batches.len(),
            device.name()
        );
        FrameReport {
            frame: inputs.frame,
            submitted: batches.len(),
            batches,
            fence,
        }
    }

    fn execute_parallel(
        &self,
        built: &BuiltOrder,
        inputs: &FrameInputs<'_>,
        pool: &WorkerPool,
        device: &dyn DeviceQueue,
    ) -> FrameReport {
        tandem_core::profile_scope!("graph: parallel frame");

        let state = FrameSubmissionState::new(built.order.len());
        let in_flight: Vec<AtomicBool> =
            (0..built.order.len()).map(|_| AtomicBool::new(false)).collect();
        let frame = ParallelFrame {
            graph: self,
            built,
            inputs,
            reporter: state.reporter(),
            in_flight: &in_flight,
        };

        pool.scope(|scope| {
            for &root in &built.roots {
                frame.dispatch(scope, root);
            }
            CompletionReconciler::new(&state, &built.dependencies)
                .run_to_completion(inputs.frame, device)
        })
    }

    fn lookup(&self, name: &str) -> Result<NodeId, GraphError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownNode(name.to_string()))
    }

    fn invalidate(&mut self) {
        if self.built.take().is_some() {
            for node in &mut self.nodes {
                node.priority = None;
            }
        }
    }

    fn validate_bindings(&self) -> Result<(), GraphError> {
        let produced: HashSet<&str> = self
            .nodes
            .iter()
            .flat_map(|n| n.outputs().iter().map(String::as_str))
            .collect();

        for node in &self.nodes {
            for input in node.inputs() {
                if node.binding(input).is_none() {
                    return Err(GraphError::MissingInputBinding {
                        node: node.name().to_string(),
                        input: input.clone(),
                    });
                }
            }
            let mut bindings: Vec<_> = node.bindings().iter().collect();
            bindings.sort();
            for (input, output) in bindings {
                if !produced.contains(output.as_str()) {
                    return Err(GraphError::UnknownOutput {
                        node: node.name().to_string(),
                        input: input.clone(),
                        output: output.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Shared view of one parallel frame, borrowed by every dispatched task.
struct ParallelFrame<'a> {
    graph: &'a TaskGraph,
    built: &'a BuiltOrder,
    inputs: &'a FrameInputs<'a>,
    reporter: CompletionReporter<'a>,
    in_flight: &'a [AtomicBool],
}

impl<'a> ParallelFrame<'a> {
    /// Spawn `priority` unless another predecessor already did.
    fn dispatch<'s>(&'s self, scope: &rayon::Scope<'s>, priority: Priority)
    where
        'a: 's,
    {
        if self.in_flight[priority].swap(true, Ordering::AcqRel) {
            return;
        }
        scope.spawn(move |scope| {
            let node = &self.graph.nodes[self.built.order[priority].0];
            log::trace!("dispatching `{}` (priority {priority})", node.name());

            let buffer = {
                let _guard = PoisonOnUnwind {
                    reporter: self.reporter,
                    node: node.name(),
                };
                node.record(self.inputs)
            };
            self.reporter.report(priority, buffer);

            for &succ in &self.built.successors[priority] {
                self.dispatch(scope, succ);
            }
        });
    }
}

/// Poisons the frame if a node body unwinds, so the reconciler stops waiting.
struct PoisonOnUnwind<'a> {
    reporter: CompletionReporter<'a>,
    node: &'a str,
}

impl Drop for PoisonOnUnwind<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            log::error!("task node `{}` panicked while recording", self.node);
            self.reporter.poison(self.node);
        }
    }
}
