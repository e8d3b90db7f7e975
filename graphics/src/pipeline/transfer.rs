//! Double-buffered transfer resources between the producer and consumer devices.
//!
//! The producer owns one [`TransferSet`] per execution cycle. At the end of a
//! cycle it captures the named outputs of that cycle's resource table into the
//! set, stamped with the frame index. The consumer copies the set into its own
//! [`StagingBuffer`]s through the device's peer-copy path and only then
//! publishes the staged contents to its graph.

use parking_lot::Mutex;

use crate::resources::{ResourceHandle, ResourceTable};
use crate::scheduler::FrameReport;

#[derive(Debug, Default)]
struct Contents {
    frame: Option<u64>,
    payload: Option<ResourceHandle>,
}

/// A producer-side buffer holding one named output of one cycle.
#[derive(Debug)]
pub struct TransferBuffer {
    name: String,
    contents: Mutex<Contents>,
}

impl TransferBuffer {
    /// Create an empty transfer buffer.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contents: Mutex::new(Contents::default()),
        }
    }

    /// Resource name this buffer carries.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Overwrite the contents.
    pub fn write(&self, frame: Option<u64>, payload: Option<ResourceHandle>) {
        *self.contents.lock() = Contents { frame, payload };
    }

    /// Frame stamp and payload.
    pub fn read(&self) -> (Option<u64>, Option<ResourceHandle>) {
        let contents = self.contents.lock();
        (contents.frame, contents.payload.clone())
    }

    /// Frame the contents were captured from.
    pub fn frame(&self) -> Option<u64> {
        self.contents.lock().frame
    }
}

/// A consumer-side copy of a [`TransferBuffer`].
#[derive(Debug)]
pub struct StagingBuffer {
    name: String,
    contents: Mutex<Contents>,
}

impl StagingBuffer {
    /// Create an empty staging buffer.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contents: Mutex::new(Contents::default()),
        }
    }

    /// Resource name this buffer stages.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Overwrite the contents. Called by the device's peer copy.
    pub fn write(&self, frame: Option<u64>, payload: Option<ResourceHandle>) {
        *self.contents.lock() = Contents { frame, payload };
    }

    /// Frame the staged contents were produced for.
    pub fn frame(&self) -> Option<u64> {
        self.contents.lock().frame
    }

    /// Staged payload.
    pub fn payload(&self) -> Option<ResourceHandle> {
        self.contents.lock().payload.clone()
    }

    /// Publish the staged payload into `table` under this buffer's name.
    ///
    /// An empty staging buffer removes any stale entry instead.
    pub fn publish(&self, table: &ResourceTable) {
        match self.payload() {
            Some(payload) => {
                table.add(self.name.as_str(), payload);
            }
            None => {
                table.remove(&self.name);
            }
        }
    }
}

/// All transfer buffers of one execution cycle.
#[derive(Debug)]
pub struct TransferSet {
    cycle: usize,
    buffers: Vec<TransferBuffer>,
    report: Mutex<Option<FrameReport>>,
}

impl TransferSet {
    /// Create a set for `cycle` with one buffer per name.
    pub fn new<I, S>(cycle: usize, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            cycle,
            buffers: names
                .into_iter()
                .map(|n| TransferBuffer::new(n.as_ref()))
                .collect(),
            report: Mutex::new(None),
        }
    }

    /// Cycle this set belongs to.
    pub fn cycle(&self) -> usize {
        self.cycle
    }

    /// Buffers in declaration order.
    pub fn buffers(&self) -> &[TransferBuffer] {
        &self.buffers
    }

    /// Look up a buffer by resource name.
    pub fn get(&self, name: &str) -> Option<&TransferBuffer> {
        self.buffers.iter().find(|b| b.name() == name)
    }

    /// Capture every transfer resource of `table` for `frame`.
    ///
    /// Returns the number of resources that were absent.
    pub fn capture(&self, frame: u64, table: &ResourceTable) -> usize {
        let mut missing = 0;
        for buffer in &self.buffers {
            let payload = table.get(buffer.name());
            if payload.is_none() {
                log::warn!(
                    "cycle {}: transfer resource `{}` absent at end of frame {frame}",
                    self.cycle,
                    buffer.name()
                );
                missing += 1;
            }
            buffer.write(Some(frame), payload);
        }
        missing
    }

    /// Store the producer's report for the captured frame.
    pub fn set_report(&self, report: FrameReport) {
        *self.report.lock() = Some(report);
    }

    /// Take the producer's report, if one is stored.
    pub fn take_report(&self) -> Option<FrameReport> {
        self.report.lock().take()
    }
}
