//! # Tandem Graphics
//!
//! Render task-graph scheduling and cross-device frame pipelining.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`TaskGraph`] - DAG of task nodes with a deterministic submission order
//! - [`CompletionReconciler`] - Releases out-of-order completions in dependency order
//! - [`GraphRenderer`] - Drives one graph on one device, sequentially or in parallel
//! - [`CrossDeviceCoordinator`] - Keeps a producer device one frame ahead of a consumer
//! - [`DeviceQueue`] - The device boundary, with [`DummyDevice`] for testing
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use tandem_graphics::{
//!     DummyDevice, ExecutionMode, GraphRenderer, NodeContext, RenderContext, RendererConfig,
//!     TaskGraph, TaskNode,
//! };
//!
//! let mut graph = TaskGraph::new();
//! graph
//!     .add_node(TaskNode::new("clear", |ctx: &mut NodeContext<'_>| {
//!         ctx.encoder().marker("clear");
//!     }))
//!     .unwrap();
//! graph.build_priorities().unwrap();
//!
//! let device = Arc::new(DummyDevice::new("gpu0"));
//! let config = RendererConfig::new().with_mode(ExecutionMode::Sequential);
//! let mut renderer = GraphRenderer::new(graph, device.clone(), &config).unwrap();
//!
//! let report = renderer.render_frame(&RenderContext::new()).unwrap();
//! assert_eq!(report.submitted, 1);
//! assert_eq!(device.submitted_labels(), vec!["clear"]);
//! ```

pub mod backend;
pub mod context;
pub mod device;
pub mod error;
pub mod graph;
pub mod pipeline;
pub mod renderer;
pub mod resources;
pub mod scheduler;

// Re-export main types for convenience
pub use backend::DummyDevice;
pub use context::{Camera, CommandBuffer, CommandEncoder, CommandPool, DrawList, RenderContext};
pub use device::DeviceQueue;
pub use error::{GraphError, PipelineError};
pub use graph::{
    DependencyTable, ExecutionMode, GraphSettings, NodeContext, NodeId, Priority, TaskBody,
    TaskGraph, TaskNode, WorkerPool,
};
pub use pipeline::{
    CoordinatorConfig, CoordinatorFrame, CrossDeviceCoordinator, ExecutionCycle, PipelineTrace,
    TraceEvent,
};
pub use renderer::{GraphRenderer, RendererConfig};
pub use resources::{ResourceHandle, ResourceTable, UniformRing};
pub use scheduler::{
    CompletionReconciler, CompletionReporter, Fence, FrameReport, FrameSubmissionState,
    HandoffSemaphore, ReleaseBatch,
};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the graphics subsystem.
pub fn init() {
    log::info!("Tandem Graphics v{} initialized", VERSION);
}
