//! Single-device renderer: one task graph driven frame by frame.

use std::sync::Arc;

use crate::context::RenderContext;
use crate::device::DeviceQueue;
use crate::error::GraphError;
use crate::graph::{ExecutionMode, FrameInputs, GraphSettings, TaskGraph, WorkerPool};
use crate::resources::{ResourceTable, UniformRing};
use crate::scheduler::FrameReport;

/// Parameters for creating a [`GraphRenderer`].
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// How nodes are recorded.
    pub mode: ExecutionMode,
    /// Worker threads in parallel mode.
    pub worker_threads: usize,
    /// Size of the per-frame uniform ring in bytes.
    pub uniform_capacity: u64,
    /// Alignment of uniform sub-allocations.
    pub uniform_alignment: u64,
    /// Settings handed to node bodies when resources are (re)created.
    pub settings: GraphSettings,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Parallel,
            worker_threads: WorkerPool::default_threads(),
            uniform_capacity: 64 * 1024,
            uniform_alignment: UniformRing::DEFAULT_ALIGNMENT,
            settings: GraphSettings::default(),
        }
    }
}

impl RendererConfig {
    /// Create default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the execution mode.
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the worker thread count.
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Set the uniform ring size.
    pub fn with_uniform_capacity(mut self, capacity: u64) -> Self {
        self.uniform_capacity = capacity;
        self
    }

    /// Set the uniform alignment.
    pub fn with_uniform_alignment(mut self, alignment: u64) -> Self {
        self.uniform_alignment = alignment;
        self
    }

    /// Set the structural settings.
    pub fn with_settings(mut self, settings: GraphSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// Drives one built [`TaskGraph`] on one device.
///
/// Owns everything that lives as long as the graph: the resource table, the
/// uniform ring, and (in parallel mode) the worker pool. Per-frame submission
/// state is created inside every [`render_frame`](Self::render_frame) call.
pub struct GraphRenderer {
    graph: TaskGraph,
    device: Arc<dyn DeviceQueue>,
    mode: ExecutionMode,
    pool: Option<Arc<WorkerPool>>,
    uniforms: UniformRing,
    resources: Arc<ResourceTable>,
    settings: GraphSettings,
    frame: u64,
}

impl GraphRenderer {
    /// Create a renderer with its own worker pool.
    ///
    /// The graph must already be built. Every node's resources are created
    /// once with `config.settings`.
    pub fn new(
        graph: TaskGraph,
        device: Arc<dyn DeviceQueue>,
        config: &RendererConfig,
    ) -> Result<Self, GraphError> {
        let pool = match config.mode {
            ExecutionMode::Parallel => Some(Arc::new(WorkerPool::new(config.worker_threads)?)),
            ExecutionMode::Sequential => None,
        };
        Self::with_pool(graph, device, config, pool)
    }

    /// Create a renderer recording on an existing worker pool.
    pub fn with_pool(
        graph: TaskGraph,
        device: Arc<dyn DeviceQueue>,
        config: &RendererConfig,
        pool: Option<Arc<WorkerPool>>,
    ) -> Result<Self, GraphError> {
        if !graph.is_built() {
            return Err(GraphError::NotBuilt);
        }
        if config.mode == ExecutionMode::Parallel && pool.is_none() {
            return Err(GraphError::NoWorkerPool);
        }
        let uniforms = UniformRing::with_alignment(config.uniform_capacity, config.uniform_alignment)?;
        let resources = Arc::new(ResourceTable::new());
        graph.recreate_resources(&config.settings, &resources);

        log::debug!(
            "renderer on {}: {} nodes, {} mode",
            device.name(),
            graph.node_count(),
            config.mode
        );

        Ok(Self {
            graph,
            device,
            mode: config.mode,
            pool,
            uniforms,
            resources,
            settings: config.settings,
            frame: 0,
        })
    }

    /// Render the next frame.
    pub fn render_frame(&mut self, ctx: &RenderContext) -> Result<FrameReport, GraphError> {
        self.render_frame_at(self.frame, ctx)
    }

    /// Render `frame`, continuing the frame counter from there.
    pub fn render_frame_at(
        &mut self,
        frame: u64,
        ctx: &RenderContext,
    ) -> Result<FrameReport, GraphError> {
        tandem_core::profile_scope!("renderer: render_frame");

        let commands = self.device.create_command_pool();
        self.uniforms.reset();

        let inputs = FrameInputs {
            frame,
            render: ctx,
            commands: &commands,
            resources: &self.resources,
            uniforms: &self.uniforms,
        };
        let report = self.graph.begin_frame(
            self.mode,
            &inputs,
            self.pool.as_deref(),
            self.device.as_ref(),
        )?;

        tandem_core::profile_plot!("uniform bytes", self.uniforms.used());
        self.frame = frame + 1;
        Ok(report)
    }

    /// Apply new structural settings: every node recreates its resources.
    pub fn resize(&mut self, settings: GraphSettings) {
        if settings == self.settings {
            return;
        }
        log::info!(
            "renderer on {}: resize to {}x{} ({} frames in flight)",
            self.device.name(),
            settings.resolution.0,
            settings.resolution.1,
            settings.frames_in_flight
        );
        self.settings = settings;
        self.graph.recreate_resources(&self.settings, &self.resources);
    }

    /// The driven graph.
    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// The device submissions go to.
    pub fn device(&self) -> &Arc<dyn DeviceQueue> {
        &self.device
    }

    /// The graph's resource table.
    pub fn resources(&self) -> &Arc<ResourceTable> {
        &self.resources
    }

    /// The graph's uniform ring.
    pub fn uniforms(&self) -> &UniformRing {
        &self.uniforms
    }

    /// Execution mode.
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Current structural settings.
    pub fn settings(&self) -> GraphSettings {
        self.settings
    }

    /// Index of the next frame to render.
    pub fn frame_index(&self) -> u64 {
        self.frame
    }

    /// Worker threads available to this renderer (zero in sequential mode).
    pub fn worker_threads(&self) -> usize {
        self.pool.as_ref().map_or(0, |p| p.num_threads())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyDevice;
    use crate::graph::{NodeContext, TaskBody, TaskNode};
    use crate::resources::ResourceHandle;

    struct Target;

    impl TaskBody for Target {
        fn record(&self, ctx: &mut NodeContext<'_>) {
            if let Some(alloc) = ctx.allocate_uniform(128) {
                ctx.encoder().bind_uniforms(alloc.offset, alloc.size);
            }
        }

        fn recreate(&self, settings: &GraphSettings, resources: &ResourceTable) {
            resources.add("target", ResourceHandle::new(settings.resolution));
        }
    }

    fn built_graph() -> TaskGraph {
        let mut graph = TaskGraph::new();
        graph.add_node(TaskNode::new("target", Target)).unwrap();
        graph
            .add_node(TaskNode::new("present", |ctx: &mut NodeContext<'_>| {
                if ctx.input("target").is_some() {
                    ctx.encoder().marker("present");
                }
            }))
            .unwrap();
        graph.connect("target", "present").unwrap();
        graph.build_priorities().unwrap();
        graph
    }

    #[test]
    fn test_unbuilt_graph_rejected() {
        let device = Arc::new(DummyDevice::new("gpu0"));
        let result = GraphRenderer::new(TaskGraph::new(), device, &RendererConfig::new());
        assert!(matches!(result, Err(GraphError::NotBuilt)));
    }

    #[test]
    fn test_frames_advance_and_reset_uniforms() {
        let device = Arc::new(DummyDevice::new("gpu0"));
        let config = RendererConfig::new()
            .with_mode(ExecutionMode::Parallel)
            .with_worker_threads(2);
        let mut renderer = GraphRenderer::new(built_graph(), device.clone(), &config).unwrap();
        assert_eq!(renderer.worker_threads(), 2);

        for expected in 0..3 {
            let report = renderer.render_frame(&RenderContext::new()).unwrap();
            assert_eq!(report.frame, expected);
            assert_eq!(report.submission_order(), vec![0, 1]);
            assert_eq!(renderer.uniforms().used(), 128);
        }
        assert_eq!(renderer.frame_index(), 3);
        assert_eq!(device.flush_count(), 3);
        assert_eq!(renderer.uniforms().reset_count(), 2);
    }

    #[test]
    fn test_resize_recreates_resources() {
        let device = Arc::new(DummyDevice::new("gpu0"));
        let config = RendererConfig::new().with_mode(ExecutionMode::Sequential);
        let mut renderer = GraphRenderer::new(built_graph(), device, &config).unwrap();
        assert_eq!(renderer.worker_threads(), 0);

        renderer.resize(GraphSettings::default().with_resolution(320, 200));
        let target = renderer.resources().get("target").unwrap();
        assert_eq!(target.downcast_ref::<(u32, u32)>(), Some(&(320, 200)));
    }

    #[test]
    fn test_parallel_without_pool_rejected() {
        let device = Arc::new(DummyDevice::new("gpu0"));
        let config = RendererConfig::new().with_mode(ExecutionMode::Parallel);
        let result = GraphRenderer::with_pool(built_graph(), device, &config, None);
        assert!(matches!(result, Err(GraphError::NoWorkerPool)));
    }
}
