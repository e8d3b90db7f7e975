//! Per-frame inputs to a task graph and the command recording interface.
//!
//! The scene layer hands each frame a [`RenderContext`] (camera plus draw
//! lists) and the device layer hands it a [`CommandPool`]. Task nodes record
//! into a [`CommandEncoder`] allocated from the pool; the finished
//! [`CommandBuffer`] is what the completion reconciler releases to the device.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Camera state extracted from the scene for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Debug name of the camera entity.
    pub name: String,
    /// World-space position.
    pub position: [f32; 3],
    /// Viewport size in pixels.
    pub viewport: (u32, u32),
}

impl Camera {
    /// Create a camera with the given name and viewport.
    pub fn new(name: impl Into<String>, viewport: (u32, u32)) -> Self {
        Self {
            name: name.into(),
            position: [0.0; 3],
            viewport,
        }
    }

    /// Set the world-space position.
    pub fn with_position(mut self, position: [f32; 3]) -> Self {
        self.position = position;
        self
    }
}

/// A named list of draw items produced by the scene layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawList {
    /// Name the passes look the list up by (e.g. "opaque", "lines").
    pub name: String,
    /// Number of draw items.
    pub items: u32,
}

impl DrawList {
    /// Create a draw list.
    pub fn new(name: impl Into<String>, items: u32) -> Self {
        Self {
            name: name.into(),
            items,
        }
    }
}

/// Opaque per-frame render context: camera plus draw lists.
///
/// Cheap to clone; the producer thread receives its own copy per task.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    camera: Option<Camera>,
    draw_lists: Arc<HashMap<String, DrawList>>,
}

impl RenderContext {
    /// Create an empty context (no camera, no draw lists).
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the frame camera.
    pub fn with_camera(mut self, camera: Camera) -> Self {
        self.camera = Some(camera);
        self
    }

    /// Attach a draw list, replacing any list with the same name.
    pub fn with_draw_list(mut self, list: DrawList) -> Self {
        Arc::make_mut(&mut self.draw_lists).insert(list.name.clone(), list);
        self
    }

    /// The frame camera, if the scene provided one.
    pub fn camera(&self) -> Option<&Camera> {
        self.camera.as_ref()
    }

    /// Look up a draw list by name.
    pub fn draw_list(&self, name: &str) -> Option<&DrawList> {
        self.draw_lists.get(name)
    }
}

/// A single recorded command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Draw the items of a draw list.
    Draw {
        /// Draw list name.
        list: String,
        /// Number of draw items.
        count: u32,
    },
    /// Dispatch a compute workload.
    Dispatch {
        /// Workgroup counts.
        groups: [u32; 3],
    },
    /// Copy one named resource into another.
    Copy {
        /// Source resource name.
        src: String,
        /// Destination resource name.
        dst: String,
    },
    /// Bind a sub-allocation of the uniform ring.
    BindUniforms {
        /// Byte offset into the ring.
        offset: u64,
        /// Size in bytes.
        size: u64,
    },
    /// Debug marker.
    Marker(String),
}

/// A finished, immutable command buffer ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBuffer {
    label: String,
    pool: u32,
    commands: Vec<Command>,
}

impl CommandBuffer {
    /// Debug label (the recording node's name).
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Id of the pool the buffer was allocated from.
    pub fn pool(&self) -> u32 {
        self.pool
    }

    /// Recorded commands in recording order.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Whether nothing was recorded (e.g. a node that skipped its frame).
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Records commands for one task node.
#[derive(Debug)]
pub struct CommandEncoder {
    label: String,
    pool: u32,
    commands: Vec<Command>,
}

impl CommandEncoder {
    /// Record a draw of a draw list.
    pub fn draw(&mut self, list: &DrawList) {
        self.commands.push(Command::Draw {
            list: list.name.clone(),
            count: list.items,
        });
    }

    /// Record a compute dispatch.
    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.commands.push(Command::Dispatch { groups: [x, y, z] });
    }

    /// Record a resource copy.
    pub fn copy(&mut self, src: impl Into<String>, dst: impl Into<String>) {
        self.commands.push(Command::Copy {
            src: src.into(),
            dst: dst.into(),
        });
    }

    /// Record a uniform binding.
    pub fn bind_uniforms(&mut self, offset: u64, size: u64) {
        self.commands.push(Command::BindUniforms { offset, size });
    }

    /// Record a debug marker.
    pub fn marker(&mut self, text: impl Into<String>) {
        self.commands.push(Command::Marker(text.into()));
    }

    /// Number of commands recorded so far.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Finish recording.
    pub fn finish(self) -> CommandBuffer {
        CommandBuffer {
            label: self.label,
            pool: self.pool,
            commands: self.commands,
        }
    }
}

/// Command pool handle supplied by the device layer for one frame.
///
/// Shared by reference between worker threads; allocation is lock-free.
#[derive(Debug)]
pub struct CommandPool {
    id: u32,
    allocated: AtomicU32,
}

impl CommandPool {
    /// Create a pool with the given id.
    pub fn new(id: u32) -> Self {
        Self {
            id,
            allocated: AtomicU32::new(0),
        }
    }

    /// Pool id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Number of encoders allocated from this pool.
    pub fn allocated(&self) -> u32 {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Allocate an encoder for a node.
    pub fn encoder(&self, label: impl Into<String>) -> CommandEncoder {
        self.allocated.fetch_add(1, Ordering::Relaxed);
        CommandEncoder {
            label: label.into(),
            pool: self.id,
            commands: Vec::new(),
        }
    }
}
