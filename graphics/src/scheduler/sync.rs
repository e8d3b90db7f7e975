//! Synchronization primitives shared by the reconciler and the pipeline.
//!
//! - [`Fence`]: device-to-host completion signal for submitted work or a
//!   peer copy. The host can block on it.
//! - [`HandoffSemaphore`]: binary signal from the producer device to the
//!   consumer device that one cycle's outputs are flushed and safe to read.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Status of a fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    /// The fence has not yet been signaled.
    Unsignaled,
    /// The fence has been signaled (device work complete).
    Signaled,
}

#[derive(Debug, Default)]
struct FenceInner {
    signaled: Mutex<bool>,
    cond: Condvar,
}

/// Host-visible completion signal for device work.
///
/// Clones share state: the device layer keeps one clone to signal, the
/// renderer keeps another to wait on.
///
/// ```ignore
/// let fence = device.flush();
/// fence.wait();
/// assert_eq!(fence.status(), FenceStatus::Signaled);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Fence {
    inner: Arc<FenceInner>,
}

impl Fence {
    /// Create a new fence in the unsignaled state.
    pub fn new_unsignaled() -> Self {
        Self::default()
    }

    /// Create a new fence in the signaled state.
    pub fn new_signaled() -> Self {
        let fence = Self::default();
        fence.signal();
        fence
    }

    /// Check the current status of the fence.
    pub fn status(&self) -> FenceStatus {
        if *self.inner.signaled.lock() {
            FenceStatus::Signaled
        } else {
            FenceStatus::Unsignaled
        }
    }

    /// Check if the fence is signaled (non-blocking).
    pub fn is_signaled(&self) -> bool {
        self.status() == FenceStatus::Signaled
    }

    /// Block until the fence is signaled.
    pub fn wait(&self) {
        let mut signaled = self.inner.signaled.lock();
        while !*signaled {
            self.inner.cond.wait(&mut signaled);
        }
    }

    /// Block until the fence is signaled or `timeout` elapses.
    ///
    /// Returns `true` if the fence was signaled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut signaled = self.inner.signaled.lock();
        while !*signaled {
            if self
                .inner
                .cond
                .wait_until(&mut signaled, deadline)
                .timed_out()
            {
                return *signaled;
            }
        }
        true
    }

    /// Reset the fence to the unsignaled state.
    ///
    /// Must only be called when no device work is pending on this fence.
    pub fn reset(&self) {
        *self.inner.signaled.lock() = false;
    }

    /// Signal the fence and wake every waiter.
    ///
    /// Called by the device layer when the work the fence guards completes.
    pub fn signal(&self) {
        *self.inner.signaled.lock() = true;
        self.inner.cond.notify_all();
    }
}

#[derive(Debug, Default)]
struct HandoffState {
    /// Frame index carried by a pending signal.
    pending: Option<u64>,
    closed: bool,
}

/// Binary producer-to-consumer hand-off for one execution cycle.
///
/// Each `signal` must be paired with exactly one `wait`. The signal carries
/// the frame index the producer just flushed so the consumer can check it
/// reads the cycle it expects. A second `signal` before the matching `wait`
/// means the producer ran more than one cycle ahead.
#[derive(Debug)]
pub struct HandoffSemaphore {
    cycle: usize,
    state: Mutex<HandoffState>,
    cond: Condvar,
}

impl HandoffSemaphore {
    /// Create an unsignaled semaphore for `cycle`.
    pub fn new(cycle: usize) -> Self {
        Self {
            cycle,
            state: Mutex::new(HandoffState::default()),
            cond: Condvar::new(),
        }
    }

    /// The cycle this semaphore gates.
    pub fn cycle(&self) -> usize {
        self.cycle
    }

    /// Signal that `frame`'s outputs for this cycle are flushed.
    pub fn signal(&self, frame: u64) {
        let mut state = self.state.lock();
        if let Some(previous) = state.pending {
            log::error!(
                "hand-off cycle {} signaled for frame {frame} while frame {previous} is unconsumed",
                self.cycle
            );
            debug_assert!(false, "hand-off semaphore signaled twice without a wait");
        }
        log::trace!("hand-off cycle {}: signal frame {frame}", self.cycle);
        state.pending = Some(frame);
        self.cond.notify_all();
    }

    /// Block until signaled, consuming the signal.
    ///
    /// Returns the signaled frame index, or `None` if the semaphore was
    /// closed (pipeline shutdown) before a signal arrived.
    pub fn wait(&self) -> Option<u64> {
        let mut state = self.state.lock();
        loop {
            if let Some(frame) = state.pending.take() {
                log::trace!("hand-off cycle {}: acquired frame {frame}", self.cycle);
                return Some(frame);
            }
            if state.closed {
                return None;
            }
            self.cond.wait(&mut state);
        }
    }

    /// Whether a signal is pending.
    pub fn is_signaled(&self) -> bool {
        self.state.lock().pending.is_some()
    }

    /// Wake every waiter and make further waits return `None` until reopened.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.cond.notify_all();
    }

    /// Clear any pending signal and accept waits again.
    pub fn reopen(&self) {
        let mut state = self.state.lock();
        state.closed = false;
        state.pending = None;
    }
}
