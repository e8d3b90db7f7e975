//! The demo frame: a deferred-style pass set.
//!
//! ```text
//! shadow ──► gbuffer ──► opaque ──► lighting ──► blur ──► dof ──► present
//!    └──────────────────────┘                                       ▲
//! lines ────────────────────────────────────────────────────────────┘
//! ```
//!
//! In the single-device pipeline all eight passes live in one graph. In the
//! dual-device pipeline everything up to `lighting` (plus `lines`) runs on the
//! producer and `blur`, `dof`, and `present` run on the consumer, reading
//! [`TRANSFERS`] from staging.

use parking_lot::Mutex;
use tandem_graphics::{
    Camera, DrawList, GraphError, GraphSettings, NodeContext, RenderContext, ResourceHandle,
    ResourceTable, TaskBody, TaskGraph, TaskNode,
};

/// Producer outputs copied to the consumer every frame.
pub const TRANSFERS: &[&str] = &["scene_color", "debug_lines"];

/// What a pass publishes for each of its outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    /// Output name.
    pub name: &'static str,
    /// Frame the target was rendered for.
    pub frame: u64,
    /// Target size in pixels.
    pub resolution: (u32, u32),
}

#[derive(Debug)]
struct Pass {
    reads: Vec<&'static str>,
    writes: Vec<&'static str>,
    draw: Option<&'static str>,
    needs_camera: bool,
    compute: bool,
    uniform_bytes: u64,
    resolution: Mutex<(u32, u32)>,
}

impl Pass {
    fn new() -> Self {
        Self {
            reads: Vec::new(),
            writes: Vec::new(),
            draw: None,
            needs_camera: false,
            compute: false,
            uniform_bytes: 0,
            resolution: Mutex::new((0, 0)),
        }
    }

    fn reads(mut self, names: &[&'static str]) -> Self {
        self.reads.extend_from_slice(names);
        self
    }

    fn writes(mut self, names: &[&'static str]) -> Self {
        self.writes.extend_from_slice(names);
        self
    }

    /// Draw a scene list from the camera's point of view.
    fn draws(mut self, list: &'static str) -> Self {
        self.draw = Some(list);
        self.needs_camera = true;
        self.uniform_bytes = 256;
        self
    }

    /// Full-screen compute over the render resolution.
    fn compute(mut self) -> Self {
        self.compute = true;
        self.uniform_bytes = 64;
        self
    }

    fn into_node(self, name: &'static str, declare_inputs: bool) -> TaskNode {
        let reads = self.reads.clone();
        let writes = self.writes.clone();
        let mut node = TaskNode::new(name, self);
        if declare_inputs {
            for input in reads {
                node = node.with_input(input);
            }
        }
        for output in writes {
            node = node.with_output(output);
        }
        node
    }
}

impl TaskBody for Pass {
    fn record(&self, ctx: &mut NodeContext<'_>) {
        if self.needs_camera && ctx.camera().is_none() {
            log::warn!("{}: no camera on frame {}, skipping", ctx.name(), ctx.frame());
            return;
        }
        for input in &self.reads {
            if ctx.input(input).is_none() {
                log::debug!("{}: `{input}` absent on frame {}", ctx.name(), ctx.frame());
                return;
            }
        }

        if self.uniform_bytes > 0 {
            match ctx.allocate_uniform(self.uniform_bytes) {
                Some(alloc) => ctx.encoder().bind_uniforms(alloc.offset, alloc.size),
                None => log::warn!("{}: uniform ring exhausted", ctx.name()),
            }
        }

        let resolution = *self.resolution.lock();
        if let Some(list) = self.draw {
            let Some(list) = ctx.draw_list(list) else {
                log::warn!("{}: draw list `{list}` absent, skipping", ctx.name());
                return;
            };
            ctx.encoder().draw(list);
        }
        if self.compute {
            let (width, height) = resolution;
            ctx.encoder().dispatch(width.div_ceil(8), height.div_ceil(8), 1);
        }

        let frame = ctx.frame();
        for &name in &self.writes {
            ctx.publish(
                name,
                ResourceHandle::new(Target {
                    name,
                    frame,
                    resolution,
                }),
            );
        }
    }

    fn recreate(&self, settings: &GraphSettings, _resources: &ResourceTable) {
        *self.resolution.lock() = settings.resolution;
    }
}

fn add_scene_passes(graph: &mut TaskGraph) -> Result<(), GraphError> {
    let passes = [
        (
            "shadow",
            Pass::new().draws("shadow_casters").writes(&["shadow_map"]),
        ),
        (
            "gbuffer",
            Pass::new()
                .draws("opaque")
                .writes(&["gbuffer_albedo", "gbuffer_depth"]),
        ),
        (
            "opaque",
            Pass::new()
                .draws("opaque")
                .reads(&["shadow_map", "gbuffer_depth"])
                .writes(&["hdr_color"]),
        ),
        (
            "lighting",
            Pass::new()
                .compute()
                .reads(&["hdr_color", "gbuffer_albedo", "shadow_map"])
                .writes(&["scene_color"]),
        ),
        ("lines", Pass::new().draws("lines").writes(&["debug_lines"])),
    ];
    add_passes(graph, passes, true)?;

    graph.connect("shadow", "gbuffer")?;
    graph.connect("shadow", "opaque")?;
    graph.connect("gbuffer", "opaque")?;
    graph.connect("opaque", "lighting")?;
    Ok(())
}

fn add_post_passes(graph: &mut TaskGraph, staged: bool) -> Result<(), GraphError> {
    let passes = [
        (
            "blur",
            Pass::new()
                .compute()
                .reads(&["scene_color"])
                .writes(&["blurred"]),
        ),
        (
            "dof",
            Pass::new()
                .compute()
                .reads(&["blurred"])
                .writes(&["post_color"]),
        ),
        (
            "present",
            Pass::new()
                .reads(&["post_color", "debug_lines"])
                .writes(&["swapchain"]),
        ),
    ];
    // Staged resources are looked up by name; they have no producer node in
    // this graph to bind to.
    add_passes(graph, passes, !staged)?;

    graph.connect("blur", "dof")?;
    graph.connect("dof", "present")?;
    if !staged {
        graph.connect("lighting", "blur")?;
        graph.connect("lines", "present")?;
    }
    Ok(())
}

fn add_passes<const N: usize>(
    graph: &mut TaskGraph,
    passes: [(&'static str, Pass); N],
    declare_inputs: bool,
) -> Result<(), GraphError> {
    let mut inputs = Vec::new();
    for (name, pass) in passes {
        if declare_inputs {
            inputs.extend(pass.reads.iter().map(|&input| (name, input)));
        }
        graph.add_node(pass.into_node(name, declare_inputs))?;
    }
    for (name, input) in inputs {
        graph.set_input_resource(name, input, input)?;
    }
    Ok(())
}

/// Every pass in one graph.
pub fn frame_graph() -> Result<TaskGraph, GraphError> {
    let mut graph = TaskGraph::new();
    add_scene_passes(&mut graph)?;
    add_post_passes(&mut graph, false)?;
    graph.build_priorities()?;
    Ok(graph)
}

/// The producer half: scene passes ending in [`TRANSFERS`].
pub fn producer_graph() -> Result<TaskGraph, GraphError> {
    let mut graph = TaskGraph::new();
    add_scene_passes(&mut graph)?;
    graph.build_priorities()?;
    Ok(graph)
}

/// The consumer half: post-processing over staged [`TRANSFERS`].
pub fn consumer_graph() -> Result<TaskGraph, GraphError> {
    let mut graph = TaskGraph::new();
    add_post_passes(&mut graph, true)?;
    graph.build_priorities()?;
    Ok(graph)
}

/// Scene state for `frame`: an orbiting camera plus the draw lists the passes
/// look up.
pub fn render_context(frame: u64, settings: &GraphSettings) -> RenderContext {
    let angle = frame as f32 * 0.05;
    let camera = Camera::new("main", settings.resolution).with_position([
        10.0 * angle.cos(),
        4.0,
        10.0 * angle.sin(),
    ]);
    RenderContext::new()
        .with_camera(camera)
        .with_draw_list(DrawList::new("shadow_casters", 96))
        .with_draw_list(DrawList::new("opaque", 128))
        .with_draw_list(DrawList::new("lines", 12 + (frame % 4) as u32))
}
