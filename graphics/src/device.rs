//! Device boundary of the scheduler.
//!
//! The scheduler never creates pipelines, textures, or buffers itself. It
//! talks to a compute device through [`DeviceQueue`]: allocate a command pool
//! for a frame, submit released batches in order, flush, and copy buffers from
//! a peer device. Real backends implement this trait; [`DummyDevice`] records
//! everything for tests and the demo.
//!
//! [`DummyDevice`]: crate::backend::DummyDevice

use crate::context::{CommandBuffer, CommandPool};
use crate::pipeline::{StagingBuffer, TransferBuffer};
use crate::scheduler::Fence;

/// Submission queue of one compute device.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: the reconciler thread submits while
/// the pipeline's other thread may be issuing peer copies on the same device.
pub trait DeviceQueue: Send + Sync {
    /// Device name for logs.
    fn name(&self) -> &str;

    /// Allocate the command pool node encoders are drawn from for one frame.
    fn create_command_pool(&self) -> CommandPool;

    /// Submit a batch of command buffers.
    ///
    /// Buffers execute in slice order, after everything previously submitted.
    fn submit(&self, batch: &[CommandBuffer]);

    /// Flush all submitted work; the returned fence signals on completion.
    fn flush(&self) -> Fence;

    /// Copy a peer device's transfer buffer into a local staging buffer.
    ///
    /// The staged contents are valid only once the returned fence signals.
    fn copy_from_peer(&self, src: &TransferBuffer, dst: &StagingBuffer) -> Fence;
}
