//! Error types for graph construction and cross-device pipelining.

use thiserror::Error;

/// Configuration errors raised while building or driving a [`TaskGraph`](crate::graph::TaskGraph).
///
/// These are detected at build time and are meant to abort renderer
/// construction loudly rather than be recovered from.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A task node with this name is already registered.
    #[error("task node `{0}` is already registered")]
    DuplicateNode(String),
    /// No task node with this name is registered.
    #[error("task node `{0}` is not registered")]
    UnknownNode(String),
    /// A node was connected to itself.
    #[error("task node `{0}` cannot be its own successor")]
    SelfEdge(String),
    /// A node declares a required input that was never bound.
    #[error("input `{input}` of task node `{node}` is not bound to a producer output")]
    MissingInputBinding {
        /// Consumer node.
        node: String,
        /// Local input name.
        input: String,
    },
    /// An input is bound to an output name no node declares.
    #[error("input `{input}` of task node `{node}` is bound to `{output}`, which no task node produces")]
    UnknownOutput {
        /// Consumer node.
        node: String,
        /// Local input name.
        input: String,
        /// Producer output name.
        output: String,
    },
    /// The successor edges form a cycle.
    #[error("dependency cycle detected among: {}", .0.join(", "))]
    CyclicDependency(Vec<String>),
    /// Frame execution was requested before `build_priorities()`.
    #[error("task graph used before build_priorities()")]
    NotBuilt,
    /// Parallel execution was requested without a worker pool.
    #[error("parallel execution requires a worker pool")]
    NoWorkerPool,
    /// An invalid parameter was provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// The worker pool could not be created.
    #[error("failed to create worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Errors raised by the [`CrossDeviceCoordinator`](crate::pipeline::CrossDeviceCoordinator).
#[derive(Debug, Error)]
pub enum PipelineError {
    /// One of the coordinator's graphs is misconfigured.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// The producer thread could not be spawned.
    #[error("failed to spawn producer thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),
    /// `start()` was called twice.
    #[error("coordinator is already running")]
    AlreadyRunning,
    /// A frame was requested while the producer thread is not running.
    #[error("coordinator is not running")]
    NotRunning,
    /// The producer stopped before handing off the cycle the consumer waits on.
    #[error("producer thread stopped before signaling cycle {cycle} of frame {frame}")]
    ProducerStopped {
        /// Frame the consumer was waiting for.
        frame: u64,
        /// Cycle the consumer was waiting on.
        cycle: usize,
    },
    /// The producer thread panicked.
    #[error("producer thread panicked")]
    ProducerPanicked,
    /// A hand-off carried output from a different frame than expected.
    #[error("hand-off for cycle {cycle} carried frame {actual}, expected frame {expected}")]
    CycleMismatch {
        /// Cycle index.
        cycle: usize,
        /// Frame the consumer expected.
        expected: u64,
        /// Frame the producer signaled.
        actual: u64,
    },
}
