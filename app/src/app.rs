//! Demo driver: builds the scene graphs for the chosen pipeline and renders
//! frames on dummy devices.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tandem_graphics::{
    CoordinatorConfig, CrossDeviceCoordinator, DummyDevice, ExecutionMode, GraphRenderer,
    GraphSettings, PipelineError, RendererConfig,
};

use crate::args::{AppArgs, PipelineKind};
use crate::scene;

/// Totals of one [`App::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Frames rendered.
    pub frames: u64,
    /// Command buffers submitted across all devices.
    pub submitted: usize,
    /// Wall time of the frame loop.
    pub elapsed: Duration,
}

enum Driver {
    Single(GraphRenderer),
    Dual(Box<CrossDeviceCoordinator>),
}

/// The demo application.
pub struct App {
    driver: Driver,
    settings: GraphSettings,
    dot: Vec<String>,
    frame: u64,
}

impl App {
    /// Build the graphs and devices described by `args`.
    ///
    /// A dual-device app starts its producer thread here.
    pub fn new<A: AppArgs>(args: &A) -> Result<Self, PipelineError> {
        let settings = args.settings();
        let renderer_config = |mode: ExecutionMode| {
            let config = RendererConfig::new().with_mode(mode).with_settings(settings);
            match args.workers() {
                Some(workers) => config.with_worker_threads(workers),
                None => config,
            }
        };
        let device = |name: &str| {
            let device = DummyDevice::new(name);
            Arc::new(match args.latency() {
                Some(latency) => device.with_latency(latency),
                None => device,
            })
        };

        let mut dot = Vec::new();
        let driver = match args.pipeline() {
            PipelineKind::Single => {
                let graph = scene::frame_graph()?;
                dot.push(graph.to_dot());
                let renderer =
                    GraphRenderer::new(graph, device("gpu0"), &renderer_config(args.mode()))?;
                log::info!(
                    "single-device pipeline: {} nodes, {} mode, {} workers",
                    renderer.graph().node_count(),
                    renderer.mode(),
                    renderer.worker_threads()
                );
                Driver::Single(renderer)
            }
            PipelineKind::Dual => {
                let mut config = CoordinatorConfig::new()
                    .with_producer(renderer_config(args.mode()))
                    .with_consumer(renderer_config(args.mode()))
                    .with_trace(args.trace());
                for name in scene::TRANSFERS {
                    config = config.with_transfer(*name);
                }

                let consumer_graph = scene::consumer_graph()?;
                let consumer_dot = consumer_graph.to_dot();
                let mut coordinator = CrossDeviceCoordinator::new(
                    device("gpu0"),
                    device("gpu1"),
                    |cycle| {
                        let graph = scene::producer_graph()?;
                        if cycle.index() == 0 {
                            dot.push(graph.to_dot());
                        }
                        Ok(graph)
                    },
                    consumer_graph,
                    config,
                )?;
                dot.push(consumer_dot);
                coordinator.start()?;
                Driver::Dual(Box::new(coordinator))
            }
        };

        Ok(Self {
            driver,
            settings,
            dot,
            frame: 0,
        })
    }

    /// The built graphs in Graphviz DOT format, producer first.
    pub fn dot_graphs(&self) -> &[String] {
        &self.dot
    }

    /// Index of the next frame.
    pub fn frame_index(&self) -> u64 {
        self.frame
    }

    /// Render one frame and wait for the device(s) to finish it.
    ///
    /// Returns the number of command buffers submitted for the frame.
    pub fn render_frame(&mut self) -> Result<usize, PipelineError> {
        tandem_core::profile_scope!("app: frame");

        let ctx = scene::render_context(self.frame, &self.settings);
        let submitted = match &mut self.driver {
            Driver::Single(renderer) => {
                let report = renderer.render_frame(&ctx)?;
                report.fence.wait();
                log::debug!(
                    "frame {}: {} buffers in {} batches",
                    report.frame,
                    report.submitted,
                    report.batches.len()
                );
                report.submitted
            }
            Driver::Dual(coordinator) => {
                let frame = coordinator.render_frame(&ctx)?;
                frame.consumer.fence.wait();
                let produced = frame.producer.as_ref().map_or(0, |r| r.submitted);
                log::debug!(
                    "frame {} ({}): {produced} producer + {} consumer buffers",
                    frame.frame,
                    frame.cycle,
                    frame.consumer.submitted
                );
                produced + frame.consumer.submitted
            }
        };

        self.frame += 1;
        Ok(submitted)
    }

    /// Stop the producer thread, if any, and report how it ended.
    pub fn shutdown(self) -> Result<(), PipelineError> {
        let Driver::Dual(mut coordinator) = self.driver else {
            return Ok(());
        };
        coordinator.stop();
        let result = coordinator.join();

        let trace = coordinator.trace();
        if trace.is_enabled() {
            if trace.dropped() > 0 {
                log::info!("trace: {} earlier events dropped", trace.dropped());
            }
            for event in trace.events() {
                log::info!("trace: {event:?}");
            }
        }
        result
    }

    /// Build, render `args.frames()` frames, and shut down.
    pub fn run<A: AppArgs>(args: A) -> Result<RunSummary, PipelineError> {
        tandem_core::init();
        tandem_graphics::init();

        let mut app = Self::new(&args)?;
        if args.dot() {
            for graph in app.dot_graphs() {
                println!("{graph}");
            }
        }

        let start = Instant::now();
        let mut submitted = 0;
        for _ in 0..args.frames() {
            submitted += app.render_frame()?;
        }
        let summary = RunSummary {
            frames: app.frame_index(),
            submitted,
            elapsed: start.elapsed(),
        };
        app.shutdown()?;

        log::info!(
            "rendered {} frames ({} command buffers) in {:.2?}",
            summary.frames,
            summary.submitted,
            summary.elapsed
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::DefaultAppArgs;
    use rstest::rstest;

    #[rstest]
    #[case::single_sequential(PipelineKind::Single, ExecutionMode::Sequential)]
    #[case::single_parallel(PipelineKind::Single, ExecutionMode::Parallel)]
    #[case::dual_sequential(PipelineKind::Dual, ExecutionMode::Sequential)]
    #[case::dual_parallel(PipelineKind::Dual, ExecutionMode::Parallel)]
    fn test_run_submits_every_pass(#[case] pipeline: PipelineKind, #[case] mode: ExecutionMode) {
        let args = DefaultAppArgs::default()
            .with_pipeline(pipeline)
            .with_mode(mode)
            .with_workers(2)
            .with_frames(5);

        let summary = App::run(args).unwrap();
        assert_eq!(summary.frames, 5);
        assert_eq!(summary.submitted, 5 * 8);
    }

    #[test]
    fn test_dot_graphs_per_pipeline() {
        let single = App::new(&DefaultAppArgs::default().with_pipeline(PipelineKind::Single))
            .unwrap();
        assert_eq!(single.dot_graphs().len(), 1);

        let dual = App::new(&DefaultAppArgs::default().with_workers(2)).unwrap();
        assert_eq!(dual.dot_graphs().len(), 2);
        assert!(dual.dot_graphs()[1].contains("present"));
        dual.shutdown().unwrap();
    }

    #[test]
    fn test_dual_with_latency() {
        let args = DefaultAppArgs::default()
            .with_workers(2)
            .with_frames(4)
            .with_latency(Duration::from_millis(1))
            .with_trace(true);
        let summary = App::run(args).unwrap();
        assert_eq!(summary.frames, 4);
    }
}
