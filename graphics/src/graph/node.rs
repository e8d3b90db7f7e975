//! Task nodes: one unit of command recording in a [`TaskGraph`](super::TaskGraph).
//!
//! A node pairs an opaque body (the pass-specific recording code) with the
//! metadata the scheduler needs: declared inputs and outputs, the bindings of
//! its inputs to other nodes' outputs, and its successor edges. The scheduler
//! never looks inside the body.
//!
//! # Example
//!
//! ```
//! use tandem_graphics::{TaskNode, NodeContext};
//!
//! let blur = TaskNode::new("blur", |ctx: &mut NodeContext<'_>| {
//!     if ctx.input("source").is_none() {
//!         return;
//!     }
//!     ctx.encoder().dispatch(120, 68, 1);
//! })
//! .with_input("source")
//! .with_output("blurred");
//!
//! assert_eq!(blur.inputs(), ["source".to_string()]);
//! ```

use std::collections::HashMap;
use std::fmt;

use crate::context::{Camera, CommandBuffer, CommandEncoder, DrawList, RenderContext};
use crate::resources::{ResourceHandle, ResourceTable, RingAllocation, UniformRing};

use super::{FrameInputs, GraphSettings, NodeId, Priority};

/// Pass-specific recording code behind a [`TaskNode`].
///
/// Closures `Fn(&mut NodeContext<'_>)` implement this trait directly; passes
/// that own device objects implement it on their own type to also hook
/// [`recreate`](TaskBody::recreate).
pub trait TaskBody: Send + Sync {
    /// Record this frame's commands.
    ///
    /// Must not block on other nodes. A body whose camera or draw list is
    /// absent should return without recording; the scheduler still reports
    /// the (empty) buffer so the frame completes.
    fn record(&self, ctx: &mut NodeContext<'_>);

    /// (Re)create long-lived resources after a structural change such as a
    /// resolution or frames-in-flight update.
    fn recreate(&self, _settings: &GraphSettings, _resources: &ResourceTable) {}
}

impl<F> TaskBody for F
where
    F: Fn(&mut NodeContext<'_>) + Send + Sync,
{
    fn record(&self, ctx: &mut NodeContext<'_>) {
        self(ctx)
    }
}

/// Everything a node body sees while recording.
pub struct NodeContext<'a> {
    name: &'a str,
    frame: u64,
    render: &'a RenderContext,
    resources: &'a ResourceTable,
    bindings: &'a HashMap<String, String>,
    uniforms: &'a UniformRing,
    encoder: CommandEncoder,
}

impl<'a> NodeContext<'a> {
    /// Name of the recording node.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Index of the frame being recorded.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// The frame's render context.
    pub fn render(&self) -> &'a RenderContext {
        self.render
    }

    /// The frame camera, if any.
    pub fn camera(&self) -> Option<&'a Camera> {
        self.render.camera()
    }

    /// Look up a draw list of the frame.
    pub fn draw_list(&self, name: &str) -> Option<&'a DrawList> {
        self.render.draw_list(name)
    }

    /// The graph's resource table.
    pub fn resources(&self) -> &'a ResourceTable {
        self.resources
    }

    /// Resolve a local input through its binding and look it up.
    ///
    /// An unbound name is looked up as-is, which is how consumer graphs read
    /// resources staged from a peer device.
    pub fn input(&self, local: &str) -> Option<ResourceHandle> {
        let name = self.bindings.get(local).map_or(local, String::as_str);
        self.resources.get(name)
    }

    /// Publish a handle under one of this node's output names.
    pub fn publish(&self, output: impl Into<String>, handle: ResourceHandle) {
        self.resources.add(output, handle);
    }

    /// Sub-allocate `size` bytes of uniform data for this frame.
    ///
    /// Returns `None` when the ring is exhausted.
    pub fn allocate_uniform(&self, size: u64) -> Option<RingAllocation> {
        self.uniforms.allocate(size)
    }

    /// The encoder this node records into.
    pub fn encoder(&mut self) -> &mut CommandEncoder {
        &mut self.encoder
    }
}

/// A node of the task graph.
pub struct TaskNode {
    name: String,
    body: Box<dyn TaskBody>,
    inputs: Vec<String>,
    outputs: Vec<String>,
    /// Local input name -> producer output name.
    bindings: HashMap<String, String>,
    pub(super) successors: Vec<NodeId>,
    pub(super) priority: Option<Priority>,
}

impl TaskNode {
    /// Create a node running `body`.
    pub fn new(name: impl Into<String>, body: impl TaskBody + 'static) -> Self {
        Self {
            name: name.into(),
            body: Box::new(body),
            inputs: Vec::new(),
            outputs: Vec::new(),
            bindings: HashMap::new(),
            successors: Vec::new(),
            priority: None,
        }
    }

    /// Declare a required input. It must be bound before the graph is built.
    pub fn with_input(mut self, local: impl Into<String>) -> Self {
        self.inputs.push(local.into());
        self
    }

    /// Declare an output this node publishes.
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.outputs.push(output.into());
        self
    }

    /// Node name, unique within its graph.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared required inputs.
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Declared outputs.
    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Producer output bound to a local input.
    pub fn binding(&self, local: &str) -> Option<&str> {
        self.bindings.get(local).map(String::as_str)
    }

    /// All input bindings.
    pub fn bindings(&self) -> &HashMap<String, String> {
        &self.bindings
    }

    /// Successor edges.
    pub fn successors(&self) -> &[NodeId] {
        &self.successors
    }

    /// Priority assigned by the last `build_priorities()`.
    pub fn priority(&self) -> Option<Priority> {
        self.priority
    }

    pub(super) fn bind(&mut self, local: String, output: String) -> Option<String> {
        self.bindings.insert(local, output)
    }

    pub(super) fn recreate(&self, settings: &GraphSettings, resources: &ResourceTable) {
        self.body.recreate(settings, resources);
    }

    /// Run the body once and return the finished buffer, empty or not.
    pub(super) fn record(&self, inputs: &FrameInputs<'_>) -> CommandBuffer {
        tandem_core::profile_scope!(&self.name);

        let mut ctx = NodeContext {
            name: &self.name,
            frame: inputs.frame,
            render: inputs.render,
            resources: inputs.resources,
            bindings: &self.bindings,
            uniforms: inputs.uniforms,
            encoder: inputs.commands.encoder(self.name.as_str()),
        };
        self.body.record(&mut ctx);

        let buffer = ctx.encoder.finish();
        if buffer.is_empty() {
            log::trace!("task node `{}` recorded nothing", self.name);
        }
        buffer
    }
}

impl fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskNode")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("bindings", &self.bindings)
            .field("successors", &self.successors)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}
