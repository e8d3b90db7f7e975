//! Resources shared between task nodes.
//!
//! - [`ResourceTable`] - Named slots through which nodes exchange device objects
//! - [`ResourceHandle`] - Shared, type-erased handle to a device object
//! - [`UniformRing`] - Per-graph linear allocator for uniform/parameter data

mod ring_buffer;
mod table;

pub use ring_buffer::{RingAllocation, UniformRing};
pub use table::{ResourceHandle, ResourceTable};
