//! Common utilities for scheduler integration tests.
//!
//! Small DAG fixtures, graph construction helpers, and order checks shared by
//! the reconciler and pipeline tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tandem_graphics::{NodeContext, Priority, TaskGraph, TaskNode};

/// Install the test logger once.
pub fn init_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();
}

// ============================================================================
// DAG Fixtures
// ============================================================================

/// A named DAG: node names in insertion order plus `from -> to` edges.
#[derive(Debug, Clone)]
pub struct Dag {
    pub name: &'static str,
    pub nodes: Vec<&'static str>,
    pub edges: Vec<(&'static str, &'static str)>,
}

/// Shadow, GBuffer after Shadow, Opaque after both, Lighting after Opaque.
pub fn deferred() -> Dag {
    Dag {
        name: "deferred",
        nodes: vec!["shadow", "gbuffer", "opaque", "lighting"],
        edges: vec![
            ("shadow", "gbuffer"),
            ("shadow", "opaque"),
            ("gbuffer", "opaque"),
            ("opaque", "lighting"),
        ],
    }
}

/// top -> {left, right} -> bottom.
pub fn diamond() -> Dag {
    Dag {
        name: "diamond",
        nodes: vec!["top", "left", "right", "bottom"],
        edges: vec![
            ("top", "left"),
            ("top", "right"),
            ("left", "bottom"),
            ("right", "bottom"),
        ],
    }
}

/// A straight line of five nodes.
pub fn chain() -> Dag {
    Dag {
        name: "chain",
        nodes: vec!["a", "b", "c", "d", "e"],
        edges: vec![("a", "b"), ("b", "c"), ("c", "d"), ("d", "e")],
    }
}

/// Two independent roots converging on shared descendants, inserted out of
/// topological order.
pub fn converging() -> Dag {
    Dag {
        name: "converging",
        nodes: vec!["present", "blur", "dof", "shadow", "gbuffer", "lines"],
        edges: vec![
            ("shadow", "blur"),
            ("gbuffer", "blur"),
            ("gbuffer", "dof"),
            ("blur", "dof"),
            ("dof", "present"),
            ("lines", "present"),
        ],
    }
}

/// The full deferred demo pipeline.
pub fn frame_graph() -> Dag {
    Dag {
        name: "frame_graph",
        nodes: vec![
            "shadow", "gbuffer", "opaque", "lighting", "blur", "dof", "lines",
        ],
        edges: vec![
            ("shadow", "gbuffer"),
            ("shadow", "opaque"),
            ("gbuffer", "opaque"),
            ("opaque", "lighting"),
            ("lighting", "blur"),
            ("blur", "dof"),
            ("lighting", "lines"),
        ],
    }
}

/// Every fixture small enough for exhaustive permutation checks.
pub fn all_fixtures() -> Vec<Dag> {
    vec![deferred(), diamond(), chain(), converging(), frame_graph()]
}

/// Names available to [`random_dag`].
const RANDOM_NAMES: [&str; 16] = [
    "n00", "n01", "n02", "n03", "n04", "n05", "n06", "n07", "n08", "n09", "n10", "n11", "n12",
    "n13", "n14", "n15",
];

/// Seeded SplitMix64 stream for generated fixtures.
pub struct SeededRng(u64);

impl SeededRng {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }

    /// Uniform in `0..bound`.
    pub fn below(&mut self, bound: usize) -> usize {
        (self.next_u64() % bound.max(1) as u64) as usize
    }

    /// Fisher-Yates shuffle.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            items.swap(i, self.below(i + 1));
        }
    }
}

/// A random DAG of 2 to 16 nodes.
///
/// Edges only run forward in a hidden topological order, with a per-graph
/// density between 10% and 70%. Nodes are inserted in shuffled order, so
/// insertion order and topology disagree.
pub fn random_dag(seed: u64) -> Dag {
    let mut rng = SeededRng::new(seed);
    let len = 2 + rng.below(RANDOM_NAMES.len() - 1);
    let density = 10 + rng.below(61);

    let mut topo: Vec<&'static str> = RANDOM_NAMES[..len].to_vec();
    rng.shuffle(&mut topo);

    let mut edges = Vec::new();
    for i in 0..len {
        for j in i + 1..len {
            if rng.below(100) < density {
                edges.push((topo[i], topo[j]));
            }
        }
    }

    let mut nodes = topo;
    rng.shuffle(&mut nodes);
    Dag {
        name: "random",
        nodes,
        edges,
    }
}

// ============================================================================
// Graph Construction
// ============================================================================

/// Build a graph whose nodes record one marker each.
pub fn build_graph(dag: &Dag) -> TaskGraph {
    build_graph_with(dag, |_| Duration::ZERO, None)
}

/// Build a graph whose nodes sleep `delay(name)` before recording and count
/// their executions in `counts`.
pub fn build_graph_with(
    dag: &Dag,
    delay: impl Fn(&str) -> Duration,
    counts: Option<&Arc<HashMap<&'static str, AtomicUsize>>>,
) -> TaskGraph {
    let mut graph = TaskGraph::new();
    for &name in &dag.nodes {
        let pause = delay(name);
        let counts = counts.cloned();
        graph
            .add_node(TaskNode::new(name, move |ctx: &mut NodeContext<'_>| {
                if !pause.is_zero() {
                    std::thread::sleep(pause);
                }
                if let Some(counts) = &counts {
                    counts[name].fetch_add(1, Ordering::SeqCst);
                }
                ctx.encoder().marker(name);
            }))
            .unwrap();
    }
    for (from, to) in &dag.edges {
        graph.connect(from, to).unwrap();
    }
    graph.build_priorities().unwrap();
    graph
}

/// Per-node execution counters for a fixture.
pub fn counters(dag: &Dag) -> Arc<HashMap<&'static str, AtomicUsize>> {
    Arc::new(
        dag.nodes
            .iter()
            .map(|&name| (name, AtomicUsize::new(0)))
            .collect(),
    )
}

/// Deterministic pseudo-random delay in `0..max_micros` derived from a seed
/// and a node name.
pub fn scrambled_delay(seed: u64, max_micros: u64) -> impl Fn(&str) -> Duration {
    move |name: &str| {
        let mut h = seed ^ 0x9e37_79b9_7f4a_7c15;
        for byte in name.bytes() {
            h = (h ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3);
        }
        Duration::from_micros(h % max_micros.max(1))
    }
}

// ============================================================================
// Order Checks
// ============================================================================

/// All permutations of `0..n` (Heap's algorithm).
pub fn permutations(n: usize) -> Vec<Vec<usize>> {
    fn heap(k: usize, items: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if k <= 1 {
            out.push(items.clone());
            return;
        }
        heap(k - 1, items, out);
        for i in 0..k - 1 {
            if k % 2 == 0 {
                items.swap(i, k - 1);
            } else {
                items.swap(0, k - 1);
            }
            heap(k - 1, items, out);
        }
    }

    let mut items: Vec<usize> = (0..n).collect();
    let mut out = Vec::new();
    heap(n, &mut items, &mut out);
    out
}

/// Assert `order` (priorities in submission order) contains every node
/// exactly once and submits every edge's source before its target.
pub fn assert_linear_extension(graph: &TaskGraph, dag: &Dag, order: &[Priority]) {
    assert_eq!(
        order.len(),
        dag.nodes.len(),
        "{}: wrong number of submissions in {order:?}",
        dag.name
    );
    let mut position = vec![usize::MAX; order.len()];
    for (index, &priority) in order.iter().enumerate() {
        assert_eq!(
            position[priority],
            usize::MAX,
            "{}: priority {priority} submitted twice",
            dag.name
        );
        position[priority] = index;
    }
    for (from, to) in &dag.edges {
        let from_priority = graph.priority(from).unwrap();
        let to_priority = graph.priority(to).unwrap();
        assert!(
            position[from_priority] < position[to_priority],
            "{}: `{from}` submitted after `{to}` in {order:?}",
            dag.name
        );
    }
}

/// Same as [`assert_linear_extension`] for submitted buffer labels.
pub fn assert_labels_linear_extension(graph: &TaskGraph, dag: &Dag, labels: &[String]) {
    let order: Vec<Priority> = labels
        .iter()
        .map(|label| graph.priority(label).unwrap())
        .collect();
    assert_linear_extension(graph, dag, &order);
}
