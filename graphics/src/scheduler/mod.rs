//! Completion reconciliation: out-of-order recording, in-order submission.
//!
//! In parallel mode task nodes finish recording in whatever order the worker
//! pool happens to run them. The device, however, must receive command
//! buffers in an order that never submits a node before its predecessors.
//! This module turns the first into the second.
//!
//! # Protocol
//!
//! | Step | Who | What |
//! |------|-----|------|
//! | 1 | renderer | creates a fresh [`FrameSubmissionState`] sized to the graph |
//! | 2 | worker | [`CompletionReporter::report`] stores the buffer, queues the priority, wakes the reconciler |
//! | 3 | reconciler | drains the queue, merges deferred priorities, sorts ascending, releases every priority whose dependencies are all released, defers the rest |
//! | 4 | reconciler | submits the release batch, adds its size to the finished count |
//! | 5 | reconciler | once every node is finished, flushes the device |
//!
//! A node that finishes before one of its predecessors (a "dependency jump")
//! simply waits in the deferred list until the predecessor is released.
//!
//! # Module Contents
//!
//! - [`FrameSubmissionState`] - Per-frame shared state, one lock plus one condition variable
//! - [`CompletionReporter`] - Worker-side handle used to report finished nodes
//! - [`CompletionReconciler`] - Release loop driven by the renderer's thread
//! - [`ReleaseBatch`] - Dependency-safe, priority-sorted group of buffers
//! - [`FrameReport`] - What a rendered frame submitted
//! - [`Fence`], [`HandoffSemaphore`] - Synchronization primitives

mod sync;

pub use sync::{Fence, FenceStatus, HandoffSemaphore};

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use crate::context::CommandBuffer;
use crate::device::DeviceQueue;
use crate::graph::{DependencyTable, Priority};

#[derive(Debug)]
struct SubmissionInner {
    /// Recorded buffers waiting for release, by priority.
    ready_buffers: Vec<Option<CommandBuffer>>,
    /// Set once a priority has been released to the device.
    ready_flags: Vec<bool>,
    /// Set once a priority has reported completion.
    reported: Vec<bool>,
    /// Priorities reported since the reconciler last woke.
    pending: VecDeque<Priority>,
    /// Number of nodes released so far.
    finished: usize,
    /// Name of a node whose body panicked.
    poisoned: Option<String>,
}

/// Per-frame submission state shared by workers and the reconciler.
///
/// This is the only cross-thread mutable state of the scheduler. It is
/// created fresh for every frame and dropped when the frame is flushed.
#[derive(Debug)]
pub struct FrameSubmissionState {
    node_count: usize,
    inner: Mutex<SubmissionInner>,
    available: Condvar,
}

impl FrameSubmissionState {
    /// Create cleared state for a graph of `node_count` nodes.
    pub fn new(node_count: usize) -> Self {
        Self {
            node_count,
            inner: Mutex::new(SubmissionInner {
                ready_buffers: vec![None; node_count],
                ready_flags: vec![false; node_count],
                reported: vec![false; node_count],
                pending: VecDeque::new(),
                finished: 0,
                poisoned: None,
            }),
            available: Condvar::new(),
        }
    }

    /// Clear every buffer and flag and set the finished count to zero.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.ready_buffers.iter_mut().for_each(|b| *b = None);
        inner.ready_flags.iter_mut().for_each(|f| *f = false);
        inner.reported.iter_mut().for_each(|r| *r = false);
        inner.pending.clear();
        inner.finished = 0;
        inner.poisoned = None;
    }

    /// Number of nodes this frame waits for.
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Number of nodes released so far.
    pub fn finished(&self) -> usize {
        self.inner.lock().finished
    }

    /// Whether `priority` has been released to the device.
    pub fn is_released(&self, priority: Priority) -> bool {
        self.inner
            .lock()
            .ready_flags
            .get(priority)
            .copied()
            .unwrap_or(false)
    }

    /// Name of the node that poisoned this frame, if any.
    pub fn poisoned(&self) -> Option<String> {
        self.inner.lock().poisoned.clone()
    }

    /// Handle for workers to report completions through.
    pub fn reporter(&self) -> CompletionReporter<'_> {
        CompletionReporter { state: self }
    }

    fn report(&self, priority: Priority, buffer: CommandBuffer) {
        let mut inner = self.inner.lock();
        if priority >= self.node_count {
            log::error!(
                "completion reported for priority {priority}, graph has {} nodes",
                self.node_count
            );
            debug_assert!(false, "completion priority out of range");
            return;
        }
        if std::mem::replace(&mut inner.reported[priority], true) {
            log::error!("priority {priority} reported completion twice in one frame");
            debug_assert!(false, "duplicate completion report");
            return;
        }
        log::trace!("completed priority {priority} (`{}`)", buffer.label());
        inner.ready_buffers[priority] = Some(buffer);
        inner.pending.push_back(priority);
        self.available.notify_one();
    }

    fn poison(&self, node: &str) {
        let mut inner = self.inner.lock();
        if inner.poisoned.is_none() {
            inner.poisoned = Some(node.to_string());
        }
        self.available.notify_all();
    }
}

/// Worker-side handle to a frame's [`FrameSubmissionState`].
#[derive(Debug, Clone, Copy)]
pub struct CompletionReporter<'a> {
    state: &'a FrameSubmissionState,
}

impl CompletionReporter<'_> {
    /// Report that the node with `priority` finished recording `buffer`.
    ///
    /// Every node reports exactly once per frame, including nodes that
    /// skipped their work and recorded nothing.
    pub fn report(&self, priority: Priority, buffer: CommandBuffer) {
        self.state.report(priority, buffer);
    }

    /// Mark the frame as failed because `node`'s body panicked.
    ///
    /// Wakes the reconciler so it does not wait for a report that will never
    /// come.
    pub fn poison(&self, node: &str) {
        self.state.poison(node);
    }
}

/// A dependency-safe group of buffers, sorted by ascending priority.
#[derive(Debug, Default)]
pub struct ReleaseBatch {
    priorities: Vec<Priority>,
    buffers: Vec<CommandBuffer>,
}

impl ReleaseBatch {
    /// Released priorities, ascending.
    pub fn priorities(&self) -> &[Priority] {
        &self.priorities
    }

    /// Released buffers, in the same order as [`priorities`](Self::priorities).
    pub fn buffers(&self) -> &[CommandBuffer] {
        &self.buffers
    }

    /// Number of released buffers.
    pub fn len(&self) -> usize {
        self.priorities.len()
    }

    /// Whether nothing was released.
    pub fn is_empty(&self) -> bool {
        self.priorities.is_empty()
    }

    fn push(&mut self, priority: Priority, buffer: CommandBuffer) {
        self.priorities.push(priority);
        self.buffers.push(buffer);
    }
}

/// Summary of one rendered frame.
#[derive(Debug, Clone)]
pub struct FrameReport {
    /// Frame index.
    pub frame: u64,
    /// Priorities of every submitted batch, in submission order.
    pub batches: Vec<Vec<Priority>>,
    /// Total number of submitted buffers.
    pub submitted: usize,
    /// Signaled once the device finished the frame's work.
    pub fence: Fence,
}

impl FrameReport {
    /// All submitted priorities, flattened in submission order.
    pub fn submission_order(&self) -> Vec<Priority> {
        self.batches.iter().flatten().copied().collect()
    }
}

/// Release loop for one frame of one graph.
///
/// Runs on exactly one thread (the renderer's). Holds the deferred
/// ("continue-wait") priorities between wakes.
#[derive(Debug)]
pub struct CompletionReconciler<'a> {
    state: &'a FrameSubmissionState,
    dependencies: &'a DependencyTable,
    continue_wait: Vec<Priority>,
}

impl<'a> CompletionReconciler<'a> {
    /// Create a reconciler over `state` gated by `dependencies`.
    pub fn new(state: &'a FrameSubmissionState, dependencies: &'a DependencyTable) -> Self {
        debug_assert_eq!(state.node_count(), dependencies.len());
        Self {
            state,
            dependencies,
            continue_wait: Vec::new(),
        }
    }

    /// Priorities reported but withheld because a dependency is not released yet.
    pub fn deferred(&self) -> &[Priority] {
        &self.continue_wait
    }

    /// Release whatever is releasable right now, without blocking.
    pub fn try_release(&mut self) -> ReleaseBatch {
        let mut inner = self.state.inner.lock();
        self.release_locked(&mut inner)
    }

    /// Block until at least one new completion arrives, then release.
    ///
    /// The returned batch may still be empty if every new completion is a
    /// dependency jump. Returns `None` if the frame was poisoned.
    pub fn wait_release(&mut self) -> Option<ReleaseBatch> {
        let mut inner = self.state.inner.lock();
        while inner.pending.is_empty() && inner.poisoned.is_none() {
            self.state.available.wait(&mut inner);
        }
        if inner.poisoned.is_some() {
            return None;
        }
        Some(self.release_locked(&mut inner))
    }

    /// Submit a released batch and count it as finished.
    pub fn submit(&self, batch: &ReleaseBatch, device: &dyn DeviceQueue) {
        if batch.is_empty() {
            return;
        }
        log::trace!(
            "{}: submitting batch {:?}",
            device.name(),
            batch.priorities()
        );
        device.submit(batch.buffers());
        self.state.inner.lock().finished += batch.len();
    }

    /// Release and submit until every node is finished, then flush.
    ///
    /// Blocks indefinitely if a node never reports. Panics if a node body
    /// panicked while this frame was in flight.
    pub fn run_to_completion(&mut self, frame: u64, device: &dyn DeviceQueue) -> FrameReport {
        tandem_core::profile_scope!("reconciler: run_to_completion");

        let mut batches = Vec::new();
        let mut submitted = 0;
        while submitted < self.state.node_count() {
            let Some(batch) = self.wait_release() else {
                let node = self.state.poisoned().unwrap_or_default();
                log::error!("frame {frame}: task node `{node}` panicked, abandoning frame");
                panic!("task node `{node}` panicked while recording frame {frame}");
            };
            if batch.is_empty() {
                continue;
            }
            self.submit(&batch, device);
            submitted += batch.len();
            batches.push(batch.priorities);
        }

        let fence = device.flush();
        log::debug!(
            "frame {frame}: {} buffers in {} batches on {}",
            submitted,
            batches.len(),
            device.name()
        );
        FrameReport {
            frame,
            batches,
            submitted,
            fence,
        }
    }

    fn release_locked(&mut self, inner: &mut SubmissionInner) -> ReleaseBatch {
        let mut candidates: Vec<Priority> = inner.pending.drain(..).collect();
        candidates.append(&mut self.continue_wait);
        candidates.sort_unstable();
        candidates.dedup();

        let mut batch = ReleaseBatch::default();
        for priority in candidates {
            let ready = self
                .dependencies
                .dependencies(priority)
                .iter()
                .all(|&dep| inner.ready_flags[dep]);
            if !ready {
                log::trace!("priority {priority} withheld, waiting on a dependency");
                self.continue_wait.push(priority);
                continue;
            }
            inner.ready_flags[priority] = true;
            match inner.ready_buffers[priority].take() {
                Some(buffer) => batch.push(priority, buffer),
                None => {
                    log::error!("priority {priority} released without a recorded buffer");
                    debug_assert!(false, "released priority has no buffer");
                }
            }
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyDevice;
    use crate::context::CommandPool;

    fn buffer(pool: &CommandPool, label: &str) -> CommandBuffer {
        pool.encoder(label).finish()
    }

    /// Shadow(0), GBuffer(1) after Shadow, Opaque(2) after both, Lighting(3) after Opaque.
    fn deferred_table() -> DependencyTable {
        DependencyTable::from_lists(vec![vec![], vec![0], vec![0, 1], vec![2]])
    }

    #[test]
    fn test_withholds_dependency_jump() {
        let deps = deferred_table();
        let state = FrameSubmissionState::new(4);
        let pool = CommandPool::new(0);
        let reporter = state.reporter();
        let mut reconciler = CompletionReconciler::new(&state, &deps);

        reporter.report(1, buffer(&pool, "gbuffer"));
        let batch = reconciler.try_release();
        assert!(batch.is_empty());
        assert_eq!(reconciler.deferred(), &[1]);

        reporter.report(0, buffer(&pool, "shadow"));
        let batch = reconciler.try_release();
        assert_eq!(batch.priorities(), &[0, 1]);
        assert_eq!(batch.buffers()[0].label(), "shadow");
        assert!(reconciler.deferred().is_empty());
    }

    #[test]
    fn test_release_batch_is_sorted() {
        let deps = DependencyTable::from_lists(vec![vec![], vec![], vec![]]);
        let state = FrameSubmissionState::new(3);
        let pool = CommandPool::new(0);
        let mut reconciler = CompletionReconciler::new(&state, &deps);

        state.reporter().report(2, buffer(&pool, "c"));
        state.reporter().report(0, buffer(&pool, "a"));
        state.reporter().report(1, buffer(&pool, "b"));

        assert_eq!(reconciler.try_release().priorities(), &[0, 1, 2]);
    }

    #[test]
    fn test_run_to_completion_flushes_once() {
        let deps = deferred_table();
        let state = FrameSubmissionState::new(4);
        let pool = CommandPool::new(0);
        let device = DummyDevice::new("gpu0");

        for (priority, label) in [(3, "lighting"), (2, "opaque"), (1, "gbuffer"), (0, "shadow")] {
            state.reporter().report(priority, buffer(&pool, label));
        }

        let report = CompletionReconciler::new(&state, &deps).run_to_completion(7, &device);
        assert_eq!(report.frame, 7);
        assert_eq!(report.submitted, 4);
        assert_eq!(report.submission_order(), vec![0, 1, 2, 3]);
        assert_eq!(state.finished(), 4);
        assert_eq!(device.flush_count(), 1);
        assert!(report.fence.is_signaled());
    }

    #[test]
    fn test_reconciler_wakes_on_report_from_other_thread() {
        let deps = deferred_table();
        let state = FrameSubmissionState::new(4);
        let pool = CommandPool::new(0);
        let device = DummyDevice::new("gpu0");

        let report = std::thread::scope(|s| {
            s.spawn(|| {
                for (priority, label) in
                    [(1, "gbuffer"), (3, "lighting"), (0, "shadow"), (2, "opaque")]
                {
                    std::thread::sleep(std::time::Duration::from_millis(2));
                    state.reporter().report(priority, buffer(&pool, label));
                }
            });
            CompletionReconciler::new(&state, &deps).run_to_completion(0, &device)
        });

        assert_eq!(report.submission_order(), vec![0, 1, 2, 3]);
        assert_eq!(
            device.submitted_labels(),
            vec!["shadow", "gbuffer", "opaque", "lighting"]
        );
    }

    #[test]
    fn test_empty_graph_flushes_immediately() {
        let deps = DependencyTable::from_lists(Vec::new());
        let state = FrameSubmissionState::new(0);
        let device = DummyDevice::new("gpu0");

        let report = CompletionReconciler::new(&state, &deps).run_to_completion(0, &device);
        assert_eq!(report.submitted, 0);
        assert_eq!(device.flush_count(), 1);
    }

    #[test]
    fn test_poison_wakes_waiter() {
        let deps = deferred_table();
        let state = FrameSubmissionState::new(4);
        let mut reconciler = CompletionReconciler::new(&state, &deps);

        state.reporter().poison("shadow");
        assert!(reconciler.wait_release().is_none());
        assert_eq!(state.poisoned().as_deref(), Some("shadow"));
    }

    #[test]
    fn test_reset_clears_frame() {
        let deps = DependencyTable::from_lists(vec![vec![]]);
        let state = FrameSubmissionState::new(1);
        let pool = CommandPool::new(0);
        let device = DummyDevice::new("gpu0");

        state.reporter().report(0, buffer(&pool, "only"));
        CompletionReconciler::new(&state, &deps).run_to_completion(0, &device);
        assert!(state.is_released(0));

        state.reset();
        assert!(!state.is_released(0));
        assert_eq!(state.finished(), 0);

        state.reporter().report(0, buffer(&pool, "only"));
        let report = CompletionReconciler::new(&state, &deps).run_to_completion(1, &device);
        assert_eq!(report.submitted, 1);
    }
}
