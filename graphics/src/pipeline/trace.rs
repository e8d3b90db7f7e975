//! Ordered event log of the cross-device pipeline.
//!
//! Recording is off by default. When enabled, both the consumer and the
//! producer thread append to one log, so the relative order of hand-offs,
//! copies, and enqueues can be inspected after the fact. The log keeps only
//! the most recent events; older ones are counted and discarded.

use std::collections::VecDeque;

use parking_lot::Mutex;

/// One step of the pipeline protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    /// The consumer queued a producer task.
    Enqueued { frame: u64, cycle: usize },
    /// The producer thread began rendering a cycle.
    ProducerStarted { frame: u64, cycle: usize },
    /// The producer flushed a cycle and signaled its hand-off.
    HandoffSignaled { frame: u64, cycle: usize },
    /// The consumer acquired a cycle's hand-off.
    HandoffAcquired { frame: u64, cycle: usize },
    /// The consumer finished copying a cycle's transfers into staging.
    StagingCopied { frame: u64, cycle: usize },
    /// The consumer finished its own graph for a frame.
    ConsumerFinished { frame: u64, cycle: usize },
}

impl TraceEvent {
    /// Frame the event refers to.
    pub fn frame(&self) -> u64 {
        match *self {
            Self::Enqueued { frame, .. }
            | Self::ProducerStarted { frame, .. }
            | Self::HandoffSignaled { frame, .. }
            | Self::HandoffAcquired { frame, .. }
            | Self::StagingCopied { frame, .. }
            | Self::ConsumerFinished { frame, .. } => frame,
        }
    }

    /// Cycle the event refers to.
    pub fn cycle(&self) -> usize {
        match *self {
            Self::Enqueued { cycle, .. }
            | Self::ProducerStarted { cycle, .. }
            | Self::HandoffSignaled { cycle, .. }
            | Self::HandoffAcquired { cycle, .. }
            | Self::StagingCopied { cycle, .. }
            | Self::ConsumerFinished { cycle, .. } => cycle,
        }
    }
}

#[derive(Debug, Default)]
struct TraceLog {
    events: VecDeque<TraceEvent>,
    dropped: u64,
}

/// Shared, bounded pipeline event log.
#[derive(Debug)]
pub struct PipelineTrace {
    enabled: bool,
    capacity: usize,
    log: Mutex<TraceLog>,
}

impl Default for PipelineTrace {
    fn default() -> Self {
        Self::new(false)
    }
}

impl PipelineTrace {
    /// Events kept by [`new`](Self::new), about 680 frames of history.
    pub const DEFAULT_CAPACITY: usize = 4096;

    /// Create a log; a disabled log drops every event.
    pub fn new(enabled: bool) -> Self {
        Self::with_capacity(enabled, Self::DEFAULT_CAPACITY)
    }

    /// Create a log holding at most `capacity` events (at least one).
    pub fn with_capacity(enabled: bool, capacity: usize) -> Self {
        Self {
            enabled,
            capacity: capacity.max(1),
            log: Mutex::new(TraceLog::default()),
        }
    }

    /// Whether events are recorded.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Most events the log holds at once.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an event, evicting the oldest one when full.
    pub fn record(&self, event: TraceEvent) {
        if !self.enabled {
            return;
        }
        let mut log = self.log.lock();
        if log.events.len() == self.capacity {
            log.events.pop_front();
            log.dropped += 1;
        }
        log.events.push_back(event);
    }

    /// Snapshot of the retained events, oldest first.
    pub fn events(&self) -> Vec<TraceEvent> {
        self.log.lock().events.iter().copied().collect()
    }

    /// Events evicted since the last [`clear`](Self::clear).
    pub fn dropped(&self) -> u64 {
        self.log.lock().dropped
    }

    /// Index of the first retained event matching `pred`.
    pub fn position(&self, pred: impl Fn(&TraceEvent) -> bool) -> Option<usize> {
        self.log.lock().events.iter().position(pred)
    }

    /// Drop every recorded event.
    pub fn clear(&self) {
        let mut log = self.log.lock();
        log.events.clear();
        log.dropped = 0;
    }
}
