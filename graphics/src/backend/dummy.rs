//! Dummy device for testing and development.
//!
//! This device doesn't execute anything. It records every submitted batch,
//! flush, and peer copy so tests can check the exact order work reached the
//! queue, and it can simulate device latency by signaling fences from a
//! helper thread.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::context::{CommandBuffer, CommandPool};
use crate::device::DeviceQueue;
use crate::pipeline::{StagingBuffer, TransferBuffer};
use crate::scheduler::Fence;

/// A peer copy issued on the dummy device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRecord {
    /// Source transfer buffer name.
    pub src: String,
    /// Destination staging buffer name.
    pub dst: String,
    /// Frame stamp carried by the copied contents.
    pub frame: Option<u64>,
}

#[derive(Debug, Default)]
struct DeviceLog {
    batches: Vec<Vec<String>>,
    flushes: u64,
    copies: Vec<CopyRecord>,
}

/// Recording device.
#[derive(Debug)]
pub struct DummyDevice {
    name: String,
    latency: Option<Duration>,
    next_pool: AtomicU32,
    log: Mutex<DeviceLog>,
}

impl DummyDevice {
    /// Create a device that completes work instantly.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            latency: None,
            next_pool: AtomicU32::new(0),
            log: Mutex::new(DeviceLog::default()),
        }
    }

    /// Signal flush and copy fences only after `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Every submitted batch, as buffer labels.
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.log.lock().batches.clone()
    }

    /// All submitted buffer labels in queue order.
    pub fn submitted_labels(&self) -> Vec<String> {
        self.log.lock().batches.iter().flatten().cloned().collect()
    }

    /// Number of flushes.
    pub fn flush_count(&self) -> u64 {
        self.log.lock().flushes
    }

    /// Every peer copy in issue order.
    pub fn copies(&self) -> Vec<CopyRecord> {
        self.log.lock().copies.clone()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        *self.log.lock() = DeviceLog::default();
    }

    fn completion_fence(&self) -> Fence {
        let fence = Fence::new_unsignaled();
        match self.latency {
            Some(latency) => {
                let signal = fence.clone();
                std::thread::spawn(move || {
                    std::thread::sleep(latency);
                    signal.signal();
                });
            }
            None => fence.signal(),
        }
        fence
    }
}

impl DeviceQueue for DummyDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_command_pool(&self) -> CommandPool {
        CommandPool::new(self.next_pool.fetch_add(1, Ordering::Relaxed))
    }

    fn submit(&self, batch: &[CommandBuffer]) {
        let labels: Vec<String> = batch.iter().map(|b| b.label().to_string()).collect();
        log::trace!("{}: submit {:?}", self.name, labels);
        self.log.lock().batches.push(labels);
    }

    fn flush(&self) -> Fence {
        self.log.lock().flushes += 1;
        self.completion_fence()
    }

    fn copy_from_peer(&self, src: &TransferBuffer, dst: &StagingBuffer) -> Fence {
        let (frame, payload) = src.read();
        dst.write(frame, payload);
        self.log.lock().copies.push(CopyRecord {
            src: src.name().to_string(),
            dst: dst.name().to_string(),
            frame,
        });
        self.completion_fence()
    }
}
