//! Command line arguments trait and default implementation.
//!
//! Uses clap for CLI parsing with:
//! - Help text (`--help`)
//! - Validation and clear error messages
//! - Warnings for options that have no effect in the chosen pipeline

use std::time::Duration;

use tandem_graphics::{ExecutionMode, GraphSettings};

/// How the demo graph is spread over devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineKind {
    /// One graph on one device.
    Single,
    /// Scene passes on a producer device one frame ahead of the
    /// post-processing passes on a consumer device.
    #[default]
    Dual,
}

/// Trait for parsing command line arguments.
///
/// Every method has a default so an implementation only overrides the
/// options it cares about.
///
/// # Example
///
/// ```ignore
/// use tandem_app::{AppArgs, PipelineKind};
///
/// struct BenchArgs;
///
/// impl AppArgs for BenchArgs {
///     fn parse() -> Self {
///         BenchArgs
///     }
///
///     fn pipeline(&self) -> PipelineKind {
///         PipelineKind::Single
///     }
///
///     fn frames(&self) -> u64 {
///         10_000
///     }
/// }
/// ```
pub trait AppArgs: Sized {
    /// Parse command line arguments.
    fn parse() -> Self;

    /// How task nodes are recorded.
    ///
    /// Default: `ExecutionMode::Parallel`
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Parallel
    }

    /// Single- or dual-device pipeline.
    ///
    /// Default: `PipelineKind::Dual`
    fn pipeline(&self) -> PipelineKind {
        PipelineKind::Dual
    }

    /// Worker threads for parallel recording.
    ///
    /// Default: `None` (one per available core)
    fn workers(&self) -> Option<usize> {
        None
    }

    /// Number of frames to render before exiting.
    ///
    /// Default: 60
    fn frames(&self) -> u64 {
        60
    }

    /// Render resolution.
    ///
    /// Default: 1280x720
    fn resolution(&self) -> (u32, u32) {
        (1280, 720)
    }

    /// Simulated device completion latency.
    ///
    /// Default: `None` (fences signal immediately)
    fn latency(&self) -> Option<Duration> {
        None
    }

    /// Print the built graphs in Graphviz DOT format.
    ///
    /// Default: false
    fn dot(&self) -> bool {
        false
    }

    /// Record and log the cross-device pipeline trace.
    ///
    /// Default: false
    fn trace(&self) -> bool {
        false
    }

    /// Structural graph settings derived from the other options.
    fn settings(&self) -> GraphSettings {
        let (width, height) = self.resolution();
        GraphSettings::default().with_resolution(width, height)
    }
}

// ============================================================================
// CLI Enums (clap value enums)
// ============================================================================

/// Execution mode selection for CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CliMode {
    /// Record every node on the calling thread in priority order.
    Sequential,
    /// Record nodes on a worker pool as their dependencies finish.
    #[default]
    Parallel,
}

impl From<CliMode> for ExecutionMode {
    fn from(cli: CliMode) -> Self {
        match cli {
            CliMode::Sequential => ExecutionMode::Sequential,
            CliMode::Parallel => ExecutionMode::Parallel,
        }
    }
}

/// Pipeline selection for CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CliPipeline {
    /// One device renders the whole frame.
    Single,
    /// Producer and consumer devices overlap across frame boundaries.
    #[default]
    Dual,
}

impl From<CliPipeline> for PipelineKind {
    fn from(cli: CliPipeline) -> Self {
        match cli {
            CliPipeline::Single => PipelineKind::Single,
            CliPipeline::Dual => PipelineKind::Dual,
        }
    }
}

// ============================================================================
// Default App Args
// ============================================================================

/// Default command line arguments implementation.
///
/// # Examples
///
/// ```bash
/// # Show help
/// ./tandem-demo --help
///
/// # Single device, sequential recording, 10 frames
/// ./tandem-demo --pipeline single --mode sequential --frames 10
///
/// # Dual device with 2 ms simulated latency and a pipeline trace
/// ./tandem-demo --latency-ms 2 --trace
///
/// # Dump the graphs as DOT
/// ./tandem-demo --dot --frames 0
/// ```
#[derive(Debug, Clone)]
pub struct DefaultAppArgs {
    mode: ExecutionMode,
    pipeline: PipelineKind,
    workers: Option<usize>,
    frames: u64,
    width: u32,
    height: u32,
    latency: Option<Duration>,
    dot: bool,
    trace: bool,
}

impl Default for DefaultAppArgs {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Parallel,
            pipeline: PipelineKind::Dual,
            workers: None,
            frames: 60,
            width: 1280,
            height: 720,
            latency: None,
            dot: false,
            trace: false,
        }
    }
}

impl DefaultAppArgs {
    /// Set the execution mode.
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the pipeline kind.
    pub fn with_pipeline(mut self, pipeline: PipelineKind) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Set the worker thread count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Set the number of frames.
    pub fn with_frames(mut self, frames: u64) -> Self {
        self.frames = frames;
        self
    }

    /// Set the render resolution.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the simulated device latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Enable the pipeline trace.
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }
}

mod native {
    use super::*;
    use clap::Parser;

    /// Tandem demo arguments.
    #[derive(Parser, Debug)]
    #[command(
        name = "tandem-demo",
        about = "Render task graph scheduler demo",
        long_about = "Runs a deferred-style task graph on simulated devices.\n\n\
            PIPELINES:\n\
            \n\
            • single: one device records and submits the whole frame.\n\
            \n\
            • dual: shadow, gbuffer, opaque, lighting and lines run on a producer\n\
              device one frame ahead; blur, dof and present run on a consumer device.\n\
            \n\
            EXAMPLES:\n\
              # Parallel recording on 4 workers\n\
              ./tandem-demo --workers 4\n\
            \n\
              # Sequential single-device run\n\
              ./tandem-demo --pipeline single --mode sequential",
        version
    )]
    pub(super) struct ClapArgs {
        /// How task nodes are recorded.
        #[arg(long, default_value = "parallel", value_enum)]
        pub mode: CliMode,

        /// Single- or dual-device pipeline.
        #[arg(long, default_value = "dual", value_enum)]
        pub pipeline: CliPipeline,

        /// Worker threads for parallel recording (default: one per core).
        #[arg(long)]
        pub workers: Option<usize>,

        /// Number of frames to render.
        #[arg(long, default_value = "60")]
        pub frames: u64,

        /// Render width in pixels.
        #[arg(long, default_value = "1280")]
        pub width: u32,

        /// Render height in pixels.
        #[arg(long, default_value = "720")]
        pub height: u32,

        /// Simulated device completion latency in milliseconds.
        #[arg(long)]
        pub latency_ms: Option<u64>,

        /// Print the built graphs in Graphviz DOT format.
        #[arg(long)]
        pub dot: bool,

        /// Record and log the cross-device pipeline trace.
        #[arg(long)]
        pub trace: bool,
    }

    impl From<ClapArgs> for DefaultAppArgs {
        fn from(args: ClapArgs) -> Self {
            if args.workers.is_some() && args.mode == CliMode::Sequential {
                log::warn!("--workers has no effect with --mode sequential");
            }
            if args.trace && args.pipeline == CliPipeline::Single {
                log::warn!("--trace only applies to --pipeline dual");
            }

            Self {
                mode: args.mode.into(),
                pipeline: args.pipeline.into(),
                workers: args.workers,
                frames: args.frames,
                width: args.width,
                height: args.height,
                latency: args.latency_ms.map(Duration::from_millis),
                dot: args.dot,
                trace: args.trace,
            }
        }
    }

}

impl AppArgs for DefaultAppArgs {
    fn parse() -> Self {
        use clap::Parser;
        native::ClapArgs::parse().into()
    }

    fn mode(&self) -> ExecutionMode {
        self.mode
    }

    fn pipeline(&self) -> PipelineKind {
        self.pipeline
    }

    fn workers(&self) -> Option<usize> {
        self.workers
    }

    fn frames(&self) -> u64 {
        self.frames
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn latency(&self) -> Option<Duration> {
        self.latency
    }

    fn dot(&self) -> bool {
        self.dot
    }

    fn trace(&self) -> bool {
        self.trace
    }
}
