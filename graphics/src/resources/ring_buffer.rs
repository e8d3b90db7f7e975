//! Ring allocator for per-frame uniform and parameter data.
//!
//! Every task graph owns one [`UniformRing`]. Nodes sub-allocate from it while
//! recording (concurrently, from worker threads), and the renderer resets it
//! at the start of each frame. With two cycle slots in the cross-device
//! pipeline each slot has its own ring, so resetting cycle `C` never touches
//! offsets still referenced by cycle `C + 1`.
//!
//! The ring only hands out offsets; the backing device buffer belongs to the
//! device layer.
//!
//! ```ignore
//! let ring = UniformRing::new(64 * 1024)?;
//! let alloc = ring.allocate(std::mem::size_of::<CameraUniforms>() as u64)
//!     .expect("uniform ring exhausted");
//! encoder.bind_uniforms(alloc.offset, alloc.size);
//! // next frame
//! ring.reset();
//! ```

use parking_lot::Mutex;

use crate::error::GraphError;

/// A sub-allocation from a uniform ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RingAllocation {
    /// Byte offset into the ring.
    pub offset: u64,
    /// Size of the allocation in bytes.
    pub size: u64,
}

impl RingAllocation {
    /// Create a new ring allocation.
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// Get the end offset (offset + size).
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

#[derive(Debug, Default)]
struct RingState {
    write_offset: u64,
    reset_count: u64,
}

/// Thread-safe linear allocator over a fixed-capacity uniform buffer.
///
/// # Alignment
///
/// Allocations are aligned to the ring's alignment (default 256 bytes, the
/// usual minimum uniform buffer offset alignment).
#[derive(Debug)]
pub struct UniformRing {
    capacity: u64,
    alignment: u64,
    state: Mutex<RingState>,
}

impl UniformRing {
    /// Default alignment for allocations (256 bytes).
    pub const DEFAULT_ALIGNMENT: u64 = 256;

    /// Create a ring with the given capacity and the default alignment.
    pub fn new(capacity: u64) -> Result<Self, GraphError> {
        Self::with_alignment(capacity, Self::DEFAULT_ALIGNMENT)
    }

    /// Create a ring with a custom alignment (must be a power of 2).
    pub fn with_alignment(capacity: u64, alignment: u64) -> Result<Self, GraphError> {
        if !alignment.is_power_of_two() {
            return Err(GraphError::InvalidParameter(format!(
                "alignment must be a power of 2, got {alignment}"
            )));
        }

        if capacity == 0 {
            return Err(GraphError::InvalidParameter(
                "uniform ring capacity cannot be zero".to_string(),
            ));
        }

        let Some(capacity) = align_up(capacity, alignment) else {
            return Err(GraphError::InvalidParameter(format!(
                "uniform ring capacity {capacity} overflows when aligned to {alignment}"
            )));
        };

        Ok(Self {
            capacity,
            alignment,
            state: Mutex::new(RingState::default()),
        })
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Allocation alignment in bytes.
    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    /// Bytes used since the last reset.
    pub fn used(&self) -> u64 {
        self.state.lock().write_offset
    }

    /// Bytes remaining before the ring is exhausted.
    pub fn remaining(&self) -> u64 {
        self.capacity - self.used()
    }

    /// Number of resets that reclaimed a non-empty ring.
    pub fn reset_count(&self) -> u64 {
        self.state.lock().reset_count
    }

    /// Allocate `size` bytes.
    ///
    /// Returns `None` when the ring has no room left this frame.
    pub fn allocate(&self, size: u64) -> Option<RingAllocation> {
        let mut state = self.state.lock();

        if size == 0 {
            return Some(RingAllocation::new(state.write_offset, 0));
        }

        // write_offset never exceeds capacity, which is already aligned.
        let aligned_offset = align_up(state.write_offset, self.alignment)?;
        let Some(end) = aligned_offset
            .checked_add(size)
            .filter(|end| *end <= self.capacity)
        else {
            log::warn!(
                "uniform ring exhausted: requested {size} bytes at offset {aligned_offset} (capacity {})",
                self.capacity
            );
            return None;
        };

        state.write_offset = end;
        Some(RingAllocation::new(aligned_offset, size))
    }

    /// Reclaim the whole ring.
    ///
    /// Must only be called once the device has finished reading the previous
    /// frame's allocations from this ring.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        if state.write_offset > 0 {
            state.reset_count += 1;
            state.write_offset = 0;
        }
    }
}

/// Round `value` up to `alignment`, or `None` if that overflows.
#[inline]
fn align_up(value: u64, alignment: u64) -> Option<u64> {
    debug_assert!(alignment.is_power_of_two());
    value
        .checked_add(alignment - 1)
        .map(|v| v & !(alignment - 1))
}
