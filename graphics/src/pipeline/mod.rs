//! Cross-device pipelining: a producer device one frame ahead of a consumer.
//!
//! [`CrossDeviceCoordinator`] overlaps two devices across frame boundaries.
//! The producer device does the bulk of the rendering on a dedicated thread;
//! the consumer device (driven by the caller's thread) copies the producer's
//! outputs, finishes post-processing, and presents.
//!
//! # Frame Overlap
//!
//! Everything the producer touches is double-buffered by [`ExecutionCycle`]
//! (`frame % 2`): one task graph, one resource table, and one [`TransferSet`]
//! per cycle, plus one [`HandoffSemaphore`] per cycle.
//!
//! ```text
//! consumer: [enqueue 0,1][wait C0][copy C0][graph 0] [enqueue 2][wait C1][copy C1][graph 1] ...
//! producer: [graph 0 (C0)][signal C0][graph 1 (C1)][signal C1]   [graph 2 (C0)][signal C0] ...
//!
//! Time ─────────────────────────────────────────────────────────────────────────────────►
//! ```
//!
//! Per consumer frame `N`:
//!
//! 1. enqueue the producer task for frame `N + 1` (frame 0 primes frames 0 and 1)
//! 2. wait on the hand-off semaphore of cycle `N % 2`
//! 3. peer-copy that cycle's transfer set into local staging buffers and wait
//!    on the copy fences
//! 4. publish the staged resources and run the consumer graph
//!
//! The producer can therefore be rendering cycle `C + 1` while the consumer
//! reads cycle `C`, and never further ahead.
//!
//! # Lifecycle
//!
//! ```text
//! new() ──► start() ──► render_frame() × N ──► stop() ──► join()
//! ```
//!
//! `stop()` flips the running flag and wakes every waiter; the producer exits
//! between tasks. Dropping a running coordinator stops and joins it with a
//! warning.
//!
//! # Example
//!
//! ```ignore
//! let mut coordinator = CrossDeviceCoordinator::new(
//!     producer_device,
//!     consumer_device,
//!     |_cycle| build_scene_graph(),
//!     build_present_graph()?,
//!     CoordinatorConfig::new().with_transfer("scene_color"),
//! )?;
//! coordinator.start()?;
//! while running {
//!     coordinator.render_frame(&scene.render_context())?;
//! }
//! coordinator.stop();
//! coordinator.join()?;
//! ```

mod trace;
mod transfer;

pub use trace::{PipelineTrace, TraceEvent};
pub use transfer::{StagingBuffer, TransferBuffer, TransferSet};

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::context::RenderContext;
use crate::device::DeviceQueue;
use crate::error::{GraphError, PipelineError};
use crate::graph::{ExecutionMode, TaskGraph, WorkerPool};
use crate::renderer::{GraphRenderer, RendererConfig};
use crate::scheduler::{FrameReport, HandoffSemaphore};

/// Number of execution cycles (pipeline depth).
pub const CYCLE_COUNT: usize = 2;

/// Alternating index selecting the active double-buffered resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecutionCycle(usize);

impl ExecutionCycle {
    /// Cycle used by `frame`.
    pub fn of_frame(frame: u64) -> Self {
        Self((frame % CYCLE_COUNT as u64) as usize)
    }

    /// Cycle index (0 or 1).
    pub fn index(self) -> usize {
        self.0
    }

    /// The other cycle.
    pub fn next(self) -> Self {
        Self((self.0 + 1) % CYCLE_COUNT)
    }
}

impl fmt::Display for ExecutionCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

/// Parameters for creating a [`CrossDeviceCoordinator`].
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Renderer parameters of both producer graphs.
    pub producer: RendererConfig,
    /// Renderer parameters of the consumer graph.
    pub consumer: RendererConfig,
    /// Name of the producer thread.
    pub producer_thread_name: String,
    /// Producer outputs copied to the consumer every frame.
    pub transfers: Vec<String>,
    /// Record a [`PipelineTrace`].
    pub trace: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            producer: RendererConfig::default(),
            consumer: RendererConfig::default(),
            producer_thread_name: "tandem: producer".to_string(),
            transfers: Vec::new(),
            trace: false,
        }
    }
}

impl CoordinatorConfig {
    /// Create default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the producer renderer parameters.
    pub fn with_producer(mut self, config: RendererConfig) -> Self {
        self.producer = config;
        self
    }

    /// Set the consumer renderer parameters.
    pub fn with_consumer(mut self, config: RendererConfig) -> Self {
        self.consumer = config;
        self
    }

    /// Set the producer thread name.
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.producer_thread_name = name.into();
        self
    }

    /// Add a producer output to copy to the consumer.
    pub fn with_transfer(mut self, name: impl Into<String>) -> Self {
        self.transfers.push(name.into());
        self
    }

    /// Enable or disable the pipeline trace.
    pub fn with_trace(mut self, enabled: bool) -> Self {
        self.trace = enabled;
        self
    }
}

/// What one consumer frame did.
#[derive(Debug)]
pub struct CoordinatorFrame {
    /// Consumer frame index.
    pub frame: u64,
    /// Cycle consumed.
    pub cycle: ExecutionCycle,
    /// Frame index carried by the cycle's hand-off.
    pub consumed_frame: u64,
    /// Producer report of the consumed frame.
    pub producer: Option<FrameReport>,
    /// Consumer report.
    pub consumer: FrameReport,
}

#[derive(Debug)]
struct ProducerTask {
    frame: u64,
    cycle: ExecutionCycle,
    context: RenderContext,
}

#[derive(Debug, Default)]
struct TaskQueue {
    tasks: VecDeque<ProducerTask>,
    running: bool,
}

#[derive(Debug)]
enum ProducerFailure {
    Graph(GraphError),
    Panicked,
}

/// State shared between the consumer and the producer thread.
struct Shared {
    queue: Mutex<TaskQueue>,
    queue_ready: Condvar,
    slots: [Mutex<GraphRenderer>; CYCLE_COUNT],
    transfers: [Arc<TransferSet>; CYCLE_COUNT],
    handoffs: [HandoffSemaphore; CYCLE_COUNT],
    failure: Mutex<Option<ProducerFailure>>,
    trace: PipelineTrace,
}

impl Shared {
    fn enqueue(&self, task: ProducerTask) {
        self.trace.record(TraceEvent::Enqueued {
            frame: task.frame,
            cycle: task.cycle.index(),
        });
        log::trace!("enqueue producer frame {} ({})", task.frame, task.cycle);
        self.queue.lock().tasks.push_back(task);
        self.queue_ready.notify_one();
    }

    fn next_task(&self) -> Option<ProducerTask> {
        let mut queue = self.queue.lock();
        loop {
            if !queue.running {
                return None;
            }
            if let Some(task) = queue.tasks.pop_front() {
                return Some(task);
            }
            self.queue_ready.wait(&mut queue);
        }
    }

    /// Flip the running flag and wake every waiter on both sides.
    fn shut_down(&self) {
        {
            let mut queue = self.queue.lock();
            queue.running = false;
            queue.tasks.clear();
        }
        self.queue_ready.notify_all();
        for handoff in &self.handoffs {
            handoff.close();
        }
    }

    fn fail(&self, failure: ProducerFailure) {
        log::error!("producer thread failed: {failure:?}");
        self.failure.lock().get_or_insert(failure);
        self.shut_down();
    }

    fn run_cycle(&self, task: &ProducerTask) -> Result<(), GraphError> {
        tandem_core::profile_scope!("producer: cycle");

        let cycle = task.cycle.index();
        self.trace.record(TraceEvent::ProducerStarted {
            frame: task.frame,
            cycle,
        });

        let mut renderer = self.slots[cycle].lock();
        let report = renderer.render_frame_at(task.frame, &task.context)?;
        report.fence.wait();

        let transfers = &self.transfers[cycle];
        transfers.capture(task.frame, renderer.resources());
        transfers.set_report(report);
        drop(renderer);

        self.handoffs[cycle].signal(task.frame);
        self.trace.record(TraceEvent::HandoffSignaled {
            frame: task.frame,
            cycle,
        });
        tandem_core::profile_frame_mark_named!("producer cycle");
        Ok(())
    }
}

/// Stops the pipeline if the producer thread unwinds.
struct FailOnUnwind<'a>(&'a Shared);

impl Drop for FailOnUnwind<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.fail(ProducerFailure::Panicked);
        }
    }
}

fn producer_loop(shared: Arc<Shared>) {
    tandem_core::set_thread_name!("tandem: producer");
    let _guard = FailOnUnwind(&shared);

    while let Some(task) = shared.next_task() {
        if let Err(err) = shared.run_cycle(&task) {
            shared.fail(ProducerFailure::Graph(err));
            return;
        }
    }
    log::debug!("producer thread exiting");
}

/// Drives a producer graph pair and a consumer graph on two devices.
pub struct CrossDeviceCoordinator {
    shared: Arc<Shared>,
    consumer: GraphRenderer,
    staging: Vec<StagingBuffer>,
    thread_name: String,
    handle: Option<JoinHandle<()>>,
    frame: u64,
}

impl CrossDeviceCoordinator {
    /// Create a stopped coordinator.
    ///
    /// `build_producer` is called once per cycle to build that cycle's
    /// producer graph instance; both instances share one worker pool. Every
    /// graph must be built.
    pub fn new<F>(
        producer_device: Arc<dyn DeviceQueue>,
        consumer_device: Arc<dyn DeviceQueue>,
        mut build_producer: F,
        consumer_graph: TaskGraph,
        config: CoordinatorConfig,
    ) -> Result<Self, PipelineError>
    where
        F: FnMut(ExecutionCycle) -> Result<TaskGraph, GraphError>,
    {
        let pool = match config.producer.mode {
            ExecutionMode::Parallel => {
                Some(Arc::new(WorkerPool::new(config.producer.worker_threads)?))
            }
            ExecutionMode::Sequential => None,
        };
        let mut producer = |cycle: ExecutionCycle| -> Result<Mutex<GraphRenderer>, GraphError> {
            let graph = build_producer(cycle)?;
            let renderer = GraphRenderer::with_pool(
                graph,
                producer_device.clone(),
                &config.producer,
                pool.clone(),
            )?;
            Ok(Mutex::new(renderer))
        };
        let slots = [
            producer(ExecutionCycle(0))?,
            producer(ExecutionCycle(1))?,
        ];

        let consumer = GraphRenderer::new(consumer_graph, consumer_device, &config.consumer)?;

        let shared = Arc::new(Shared {
            queue: Mutex::new(TaskQueue::default()),
            queue_ready: Condvar::new(),
            slots,
            transfers: [
                Arc::new(TransferSet::new(0, &config.transfers)),
                Arc::new(TransferSet::new(1, &config.transfers)),
            ],
            handoffs: [HandoffSemaphore::new(0), HandoffSemaphore::new(1)],
            failure: Mutex::new(None),
            trace: PipelineTrace::new(config.trace),
        });

        Ok(Self {
            shared,
            consumer,
            staging: config.transfers.iter().map(StagingBuffer::new).collect(),
            thread_name: config.producer_thread_name,
            handle: None,
            frame: 0,
        })
    }

    /// Spawn the producer thread. The next frame rendered is frame 0.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        if self.handle.is_some() {
            return Err(PipelineError::AlreadyRunning);
        }

        {
            let mut queue = self.shared.queue.lock();
            queue.tasks.clear();
            queue.running = true;
        }
        for handoff in &self.shared.handoffs {
            handoff.reopen();
        }
        *self.shared.failure.lock() = None;
        self.frame = 0;

        let shared = self.shared.clone();
        let handle = std::thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || producer_loop(shared))
            .map_err(|err| {
                self.shared.queue.lock().running = false;
                err
            })?;
        self.handle = Some(handle);

        log::info!(
            "cross-device pipeline started: producer on {}, consumer on {}",
            self.shared.slots[0].lock().device().name(),
            self.consumer.device().name()
        );
        Ok(())
    }

    /// Ask the producer thread to exit and wake every waiter.
    ///
    /// Queued but unstarted producer tasks are dropped.
    pub fn stop(&self) {
        log::info!("cross-device pipeline stopping after {} frames", self.frame);
        self.shared.shut_down();
    }

    /// Wait for the producer thread to exit.
    ///
    /// Returns the producer's failure, if it failed.
    pub fn join(&mut self) -> Result<(), PipelineError> {
        let handle = self.handle.take().ok_or(PipelineError::NotRunning)?;
        let panicked = handle.join().is_err();
        match self.shared.failure.lock().take() {
            Some(ProducerFailure::Graph(err)) => Err(err.into()),
            Some(ProducerFailure::Panicked) => Err(PipelineError::ProducerPanicked),
            None if panicked => Err(PipelineError::ProducerPanicked),
            None => Ok(()),
        }
    }

    /// Whether the producer thread has been started and not joined.
    pub fn is_running(&self) -> bool {
        self.handle.is_some() && self.shared.queue.lock().running
    }

    /// Run consumer frame `N`, keeping the producer one frame ahead.
    pub fn render_frame(&mut self, ctx: &RenderContext) -> Result<CoordinatorFrame, PipelineError> {
        tandem_core::profile_scope!("coordinator: render_frame");

        if self.handle.is_none() {
            return Err(PipelineError::NotRunning);
        }

        let frame = self.frame;
        if frame == 0 {
            for primed in 0..CYCLE_COUNT as u64 {
                self.enqueue(primed, ctx);
            }
        } else {
            self.enqueue(frame + 1, ctx);
        }

        let cycle = ExecutionCycle::of_frame(frame);
        let Some(produced) = self.shared.handoffs[cycle.index()].wait() else {
            return Err(self.producer_stopped(frame, cycle));
        };
        self.shared.trace.record(TraceEvent::HandoffAcquired {
            frame: produced,
            cycle: cycle.index(),
        });

        // The hand-off is spent and the next frame is queued; any error from
        // here on stops the pipeline.
        let result = self.consume(frame, cycle, produced, ctx);
        if let Err(err) = &result {
            log::error!("frame {frame}: consumer failed after hand-off, stopping pipeline: {err}");
            self.shared.shut_down();
        }
        result
    }

    fn consume(
        &mut self,
        frame: u64,
        cycle: ExecutionCycle,
        produced: u64,
        ctx: &RenderContext,
    ) -> Result<CoordinatorFrame, PipelineError> {
        if produced != frame {
            return Err(PipelineError::CycleMismatch {
                cycle: cycle.index(),
                expected: frame,
                actual: produced,
            });
        }

        let transfers = self.shared.transfers[cycle.index()].clone();
        self.stage(&transfers);
        self.shared.trace.record(TraceEvent::StagingCopied {
            frame,
            cycle: cycle.index(),
        });

        let consumer = self.consumer.render_frame_at(frame, ctx)?;
        self.shared.trace.record(TraceEvent::ConsumerFinished {
            frame,
            cycle: cycle.index(),
        });
        tandem_core::frame_mark!();

        log::debug!("frame {frame}: consumed {cycle}");
        self.frame = frame + 1;
        Ok(CoordinatorFrame {
            frame,
            cycle,
            consumed_frame: produced,
            producer: transfers.take_report(),
            consumer,
        })
    }

    /// Index of the next consumer frame.
    pub fn frame_index(&self) -> u64 {
        self.frame
    }

    /// The pipeline trace (empty unless enabled in the config).
    pub fn trace(&self) -> &PipelineTrace {
        &self.shared.trace
    }

    /// The consumer renderer.
    pub fn consumer(&self) -> &GraphRenderer {
        &self.consumer
    }

    /// The consumer's staging buffers.
    pub fn staging(&self) -> &[StagingBuffer] {
        &self.staging
    }

    fn enqueue(&self, frame: u64, ctx: &RenderContext) {
        self.shared.enqueue(ProducerTask {
            frame,
            cycle: ExecutionCycle::of_frame(frame),
            context: ctx.clone(),
        });
    }

    /// Peer-copy a cycle's transfers and publish them once every copy landed.
    fn stage(&self, transfers: &TransferSet) {
        tandem_core::profile_scope!("coordinator: stage transfers");

        let device = self.consumer.device();
        let fences: Vec<_> = transfers
            .buffers()
            .iter()
            .zip(&self.staging)
            .map(|(src, dst)| device.copy_from_peer(src, dst))
            .collect();
        for fence in &fences {
            fence.wait();
        }

        let table = self.consumer.resources();
        for staging in &self.staging {
            staging.publish(table);
        }
    }

    fn producer_stopped(&self, frame: u64, cycle: ExecutionCycle) -> PipelineError {
        if matches!(*self.shared.failure.lock(), Some(ProducerFailure::Panicked)) {
            PipelineError::ProducerPanicked
        } else {
            PipelineError::ProducerStopped {
                frame,
                cycle: cycle.index(),
            }
        }
    }
}

impl Drop for CrossDeviceCoordinator {
    fn drop(&mut self) {
        if self.handle.is_some() {
            log::warn!("cross-device coordinator dropped while running; stopping producer");
            self.shared.shut_down();
            if let Err(err) = self.join() {
                log::error!("producer thread ended with: {err}");
            }
        }
    }
}
