//! Cross-device coordinator integration tests.
//!
//! Both devices are [`DummyDevice`]s, optionally with simulated latency so the
//! producer and consumer genuinely overlap.
//!
//! # Test Categories
//!
//! - **Cycle discipline**: frame `N` runs on cycle `N % 2` and consumes exactly
//!   what the producer rendered for `N`
//! - **Priming**: frame 0 enqueues cycles 0 and 1 before its first read
//! - **Pipeline depth**: the producer is never more than one cycle ahead
//! - **Lifecycle**: start/stop/join, restart, drop while running
//! - **Failures**: a panicking producer stops the pipeline instead of hanging
//!
//! ```bash
//! cargo test -p tandem-graphics --test pipeline_tests
//! ```

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rstest::rstest;

use common::init_logging;
use tandem_graphics::{
    Camera, CoordinatorConfig, CrossDeviceCoordinator, DrawList, DummyDevice, ExecutionCycle,
    ExecutionMode, GraphError, NodeContext, PipelineError, RenderContext, RendererConfig,
    ResourceHandle, TaskGraph, TaskNode, TraceEvent,
};

/// What a producer graph stamps into its transfer output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SceneColor {
    frame: u64,
    cycle: usize,
}

/// Shadow -> GBuffer -> Lighting, publishing `scene_color` stamped with the
/// frame and the cycle the graph instance belongs to.
fn producer_graph(cycle: ExecutionCycle, panic_on: Option<u64>) -> Result<TaskGraph, GraphError> {
    let mut graph = TaskGraph::new();
    graph.add_node(TaskNode::new("shadow", |ctx: &mut NodeContext<'_>| {
        if ctx.camera().is_none() {
            return;
        }
        ctx.encoder().marker("shadow");
    }))?;
    graph.add_node(
        TaskNode::new("gbuffer", |ctx: &mut NodeContext<'_>| {
            let Some(list) = ctx.draw_list("opaque") else {
                return;
            };
            ctx.encoder().draw(list);
            ctx.publish("gbuffer_albedo", ResourceHandle::new(ctx.frame()));
        })
        .with_output("gbuffer_albedo"),
    )?;
    let index = cycle.index();
    graph.add_node(
        TaskNode::new("lighting", move |ctx: &mut NodeContext<'_>| {
            if panic_on == Some(ctx.frame()) {
                panic!("lighting failed on frame {}", ctx.frame());
            }
            let stamp = SceneColor {
                frame: ctx.frame(),
                cycle: index,
            };
            ctx.publish("scene_color", ResourceHandle::new(stamp));
            ctx.encoder().dispatch(16, 9, 1);
        })
        .with_input("albedo")
        .with_output("scene_color"),
    )?;
    graph.connect("shadow", "gbuffer")?;
    graph.connect("gbuffer", "lighting")?;
    graph.set_input_resource("lighting", "albedo", "gbuffer_albedo")?;
    graph.build_priorities()?;
    Ok(graph)
}

/// Present node that counts frames whose staged `scene_color` does not match.
fn consumer_graph(mismatches: Arc<AtomicU64>) -> TaskGraph {
    let mut graph = TaskGraph::new();
    graph
        .add_node(TaskNode::new("present", move |ctx: &mut NodeContext<'_>| {
            let staged = ctx
                .input("scene_color")
                .and_then(|h| h.downcast_ref::<SceneColor>().copied());
            let expected = SceneColor {
                frame: ctx.frame(),
                cycle: ExecutionCycle::of_frame(ctx.frame()).index(),
            };
            if staged != Some(expected) {
                log::warn!("frame {} staged {staged:?}", ctx.frame());
                mismatches.fetch_add(1, Ordering::SeqCst);
            }
            ctx.encoder().marker("present");
        }))
        .unwrap();
    graph.build_priorities().unwrap();
    graph
}

fn render_context() -> RenderContext {
    RenderContext::new()
        .with_camera(Camera::new("main", (1280, 720)))
        .with_draw_list(DrawList::new("opaque", 64))
}

struct Harness {
    coordinator: CrossDeviceCoordinator,
    producer: Arc<DummyDevice>,
    consumer: Arc<DummyDevice>,
    mismatches: Arc<AtomicU64>,
}

fn harness(mode: ExecutionMode, latency: Option<Duration>, panic_on: Option<u64>) -> Harness {
    init_logging();

    let mut producer = DummyDevice::new("producer");
    let mut consumer = DummyDevice::new("consumer");
    if let Some(latency) = latency {
        producer = producer.with_latency(latency);
        consumer = consumer.with_latency(latency / 2);
    }
    let producer = Arc::new(producer);
    let consumer = Arc::new(consumer);
    let mismatches = Arc::new(AtomicU64::new(0));

    let config = CoordinatorConfig::new()
        .with_producer(RendererConfig::new().with_mode(mode).with_worker_threads(2))
        .with_consumer(RendererConfig::new().with_mode(ExecutionMode::Sequential))
        .with_transfer("scene_color")
        .with_trace(true);
    let coordinator = CrossDeviceCoordinator::new(
        producer.clone(),
        consumer.clone(),
        |cycle| producer_graph(cycle, panic_on),
        consumer_graph(mismatches.clone()),
        config,
    )
    .unwrap();

    Harness {
        coordinator,
        producer,
        consumer,
        mismatches,
    }
}

// ============================================================================
// Cycle Discipline
// ============================================================================

#[rstest]
#[case::parallel_one_frame(ExecutionMode::Parallel, 1)]
#[case::parallel_two_frames(ExecutionMode::Parallel, 2)]
#[case::parallel_many_frames(ExecutionMode::Parallel, 9)]
#[case::sequential_many_frames(ExecutionMode::Sequential, 9)]
fn test_frame_consumes_own_cycle(#[case] mode: ExecutionMode, #[case] frames: u64) {
    let mut h = harness(mode, Some(Duration::from_millis(1)), None);
    h.coordinator.start().unwrap();

    for n in 0..frames {
        let frame = h.coordinator.render_frame(&render_context()).unwrap();
        assert_eq!(frame.frame, n);
        assert_eq!(frame.cycle.index(), (n % 2) as usize);
        assert_eq!(frame.consumed_frame, n);
        let producer = frame.producer.expect("producer report");
        assert_eq!(producer.frame, n);
        assert_eq!(producer.submission_order(), vec![0, 1, 2]);
        assert_eq!(h.coordinator.staging()[0].frame(), Some(n));
    }

    h.coordinator.stop();
    h.coordinator.join().unwrap();

    assert_eq!(h.mismatches.load(Ordering::SeqCst), 0);
    assert_eq!(h.consumer.flush_count(), frames);
    assert_eq!(h.consumer.copies().len() as u64, frames);
    for (n, copy) in h.consumer.copies().iter().enumerate() {
        assert_eq!(copy.frame, Some(n as u64));
    }
    // The producer is always one frame ahead, so it may have rendered one
    // extra frame before it was stopped.
    assert!(h.producer.flush_count() >= frames);
    assert!(h.producer.flush_count() <= frames + 1);
}

#[test]
fn test_producer_submits_in_dependency_order() {
    let mut h = harness(ExecutionMode::Parallel, None, None);
    h.coordinator.start().unwrap();
    for _ in 0..3 {
        h.coordinator.render_frame(&render_context()).unwrap();
    }
    h.coordinator.stop();
    h.coordinator.join().unwrap();

    for batch_labels in h.producer.submitted_labels().chunks(3) {
        assert_eq!(batch_labels, ["shadow", "gbuffer", "lighting"]);
    }
}

// ============================================================================
// Priming and Pipeline Depth
// ============================================================================

#[test]
fn test_first_frame_primes_both_cycles() {
    let mut h = harness(ExecutionMode::Parallel, Some(Duration::from_millis(2)), None);
    h.coordinator.start().unwrap();
    h.coordinator.render_frame(&render_context()).unwrap();

    let events = h.coordinator.trace().events();
    let first_read = events
        .iter()
        .position(|e| matches!(e, TraceEvent::HandoffAcquired { .. }))
        .unwrap();
    let enqueued: Vec<TraceEvent> = events[..first_read]
        .iter()
        .filter(|e| matches!(e, TraceEvent::Enqueued { .. }))
        .copied()
        .collect();
    assert_eq!(
        enqueued,
        vec![
            TraceEvent::Enqueued { frame: 0, cycle: 0 },
            TraceEvent::Enqueued { frame: 1, cycle: 1 },
        ]
    );

    h.coordinator.stop();
    h.coordinator.join().unwrap();
}

#[test]
fn test_steady_state_enqueues_one_frame_ahead() {
    let mut h = harness(ExecutionMode::Parallel, None, None);
    h.coordinator.start().unwrap();
    for _ in 0..4 {
        h.coordinator.render_frame(&render_context()).unwrap();
    }
    h.coordinator.stop();
    h.coordinator.join().unwrap();

    let enqueued: Vec<u64> = h
        .coordinator
        .trace()
        .events()
        .iter()
        .filter_map(|e| match e {
            TraceEvent::Enqueued { frame, .. } => Some(*frame),
            _ => None,
        })
        .collect();
    assert_eq!(enqueued, vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_producer_never_more_than_one_cycle_ahead() {
    let mut h = harness(ExecutionMode::Parallel, Some(Duration::from_millis(1)), None);
    h.coordinator.start().unwrap();
    let frames = 8;
    for _ in 0..frames {
        h.coordinator.render_frame(&render_context()).unwrap();
    }
    h.coordinator.stop();
    h.coordinator.join().unwrap();

    let trace = h.coordinator.trace();
    for f in 2..frames {
        let started = trace.position(|e| *e == TraceEvent::ProducerStarted {
            frame: f,
            cycle: (f % 2) as usize,
        });
        let Some(started) = started else {
            continue;
        };
        let copied = trace
            .position(|e| *e == TraceEvent::StagingCopied {
                frame: f - 2,
                cycle: (f % 2) as usize,
            })
            .unwrap();
        assert!(
            copied < started,
            "producer started frame {f} before frame {} was copied",
            f - 2
        );
    }

    for event in trace.events() {
        assert_eq!(event.cycle(), (event.frame() % 2) as usize, "{event:?}");
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_stop_and_join() {
    let mut h = harness(ExecutionMode::Sequential, None, None);
    h.coordinator.start().unwrap();
    assert!(h.coordinator.is_running());
    h.coordinator.render_frame(&render_context()).unwrap();

    h.coordinator.stop();
    assert!(!h.coordinator.is_running());
    h.coordinator.join().unwrap();

    assert!(matches!(
        h.coordinator.render_frame(&render_context()),
        Err(PipelineError::NotRunning)
    ));
    assert!(matches!(h.coordinator.join(), Err(PipelineError::NotRunning)));
}

#[test]
fn test_restart_after_join() {
    let mut h = harness(ExecutionMode::Parallel, None, None);
    h.coordinator.start().unwrap();
    for _ in 0..3 {
        h.coordinator.render_frame(&render_context()).unwrap();
    }
    h.coordinator.stop();
    h.coordinator.join().unwrap();

    h.coordinator.start().unwrap();
    assert_eq!(h.coordinator.frame_index(), 0);
    for n in 0..3 {
        let frame = h.coordinator.render_frame(&render_context()).unwrap();
        assert_eq!(frame.consumed_frame, n);
    }
    h.coordinator.stop();
    h.coordinator.join().unwrap();
    assert_eq!(h.mismatches.load(Ordering::SeqCst), 0);
}

#[test]
fn test_drop_while_running_does_not_hang() {
    let mut h = harness(ExecutionMode::Parallel, Some(Duration::from_millis(1)), None);
    h.coordinator.start().unwrap();
    h.coordinator.render_frame(&render_context()).unwrap();
    drop(h);
}

#[test]
fn test_missing_context_is_soft_failure() {
    let mut h = harness(ExecutionMode::Parallel, None, None);
    h.coordinator.start().unwrap();

    // No camera and no draw lists: passes skip their work but the frame still
    // completes and the hand-off still happens.
    let frame = h.coordinator.render_frame(&RenderContext::new()).unwrap();
    let producer = frame.producer.unwrap();
    assert_eq!(producer.submitted, 3);
    assert_eq!(frame.consumed_frame, 0);

    h.coordinator.stop();
    h.coordinator.join().unwrap();
}

#[test]
fn test_missing_transfer_resource_stages_nothing() {
    init_logging();
    let mismatches = Arc::new(AtomicU64::new(0));
    let config = CoordinatorConfig::new()
        .with_producer(RendererConfig::new().with_mode(ExecutionMode::Sequential))
        .with_consumer(RendererConfig::new().with_mode(ExecutionMode::Sequential))
        .with_transfer("scene_color")
        .with_transfer("scene_depth");
    let mut coordinator = CrossDeviceCoordinator::new(
        Arc::new(DummyDevice::new("producer")),
        Arc::new(DummyDevice::new("consumer")),
        |cycle| producer_graph(cycle, None),
        consumer_graph(mismatches.clone()),
        config,
    )
    .unwrap();
    coordinator.start().unwrap();

    for _ in 0..2 {
        coordinator.render_frame(&render_context()).unwrap();
        let depth = &coordinator.staging()[1];
        assert_eq!(depth.name(), "scene_depth");
        assert!(depth.payload().is_none());
        assert!(!coordinator.consumer().resources().contains("scene_depth"));
        assert!(coordinator.consumer().resources().contains("scene_color"));
    }

    coordinator.stop();
    coordinator.join().unwrap();
    assert_eq!(mismatches.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Failures
// ============================================================================

#[rstest]
#[case::sequential(ExecutionMode::Sequential)]
#[case::parallel(ExecutionMode::Parallel)]
fn test_producer_panic_stops_pipeline(#[case] mode: ExecutionMode) {
    let mut h = harness(mode, None, Some(2));
    h.coordinator.start().unwrap();

    h.coordinator.render_frame(&render_context()).unwrap();
    h.coordinator.render_frame(&render_context()).unwrap();
    let err = h.coordinator.render_frame(&render_context()).unwrap_err();
    assert!(matches!(err, PipelineError::ProducerPanicked), "{err}");

    assert!(matches!(
        h.coordinator.join(),
        Err(PipelineError::ProducerPanicked)
    ));
}

#[test]
fn test_unbuilt_producer_graph_rejected() {
    let result = CrossDeviceCoordinator::new(
        Arc::new(DummyDevice::new("producer")),
        Arc::new(DummyDevice::new("consumer")),
        |_| Ok(TaskGraph::new()),
        consumer_graph(Arc::new(AtomicU64::new(0))),
        CoordinatorConfig::new(),
    );
    assert!(matches!(
        result,
        Err(PipelineError::Graph(GraphError::NotBuilt))
    ));
}
