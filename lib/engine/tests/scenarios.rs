//! End-to-end execution scenarios over the full engine stack: SQLite
//! store, built-in tool registry, and pure node kinds (no network).

use async_trait::async_trait;
use flowstone_ai::ModelGateway;
use flowstone_core::{AppConfig, ExecutionId, NodeId};
use flowstone_engine::engine::{BroadcastSink, Engine, EventSink};
use flowstone_engine::error::EngineError;
use flowstone_store::{SqliteStore, Store};
use flowstone_tools::ToolRegistry;
use flowstone_workflow::definition::Workflow;
use flowstone_workflow::edge::Edge;
use flowstone_workflow::event::ExecutionEvent;
use flowstone_workflow::execution::{ExecutionStatus, NodeStatus};
use flowstone_workflow::node::{
    InputData, LoopData, LoopKind, Node, NodeData, OutputData, ToolData, TransformData,
};
use serde_json::{Value as JsonValue, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct CollectingSink {
    events: Mutex<Vec<ExecutionEvent>>,
}

impl CollectingSink {
    fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Event names in delivery order, log lines filtered out.
    fn names(&self) -> Vec<&'static str> {
        self.events()
            .iter()
            .filter(|e| e.name() != "log")
            .map(ExecutionEvent::name)
            .collect()
    }

    fn started_nodes(&self) -> Vec<NodeId> {
        self.events()
            .iter()
            .filter(|e| e.name() == "node:start")
            .filter_map(|e| e.node_id().cloned())
            .collect()
    }

    fn completed_nodes(&self) -> Vec<NodeId> {
        self.events()
            .iter()
            .filter(|e| e.name() == "node:complete")
            .filter_map(|e| e.node_id().cloned())
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingSink {
    async fn deliver(&self, _execution_id: ExecutionId, event: &ExecutionEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn input_node(id: &str, label: &str) -> Node {
    Node::new(id, label, NodeData::Input(InputData::default()))
}

fn output_node(id: &str, label: &str) -> Node {
    Node::new(id, label, NodeData::Output(OutputData::default()))
}

fn transform_node(id: &str, label: &str, expression: &str) -> Node {
    Node::new(
        id,
        label,
        NodeData::Transform(TransformData {
            transform: Some(expression.to_string()),
            ..TransformData::default()
        }),
    )
}

async fn engine_with_sink(
    sink: Arc<dyn EventSink>,
) -> (Engine<SqliteStore>, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::in_memory().await.expect("store"));
    let config = Arc::new(AppConfig::default());
    let gateway = Arc::new(ModelGateway::new(&config));
    let engine = Engine::new(
        Arc::clone(&store),
        Arc::new(ToolRegistry::with_builtins()),
        gateway,
        config,
        sink,
    );
    (engine, store)
}

/// S1 — linear chain: input 3 through "input * 2" yields 6, with the
/// full event sequence in causal order.
#[tokio::test]
async fn s1_linear_chain() {
    let sink = Arc::new(CollectingSink::new());
    let (engine, store) = engine_with_sink(Arc::clone(&sink) as _).await;

    let mut workflow = Workflow::new("s1", "Linear chain");
    workflow.add_node(input_node("A", "in"));
    workflow.add_node(transform_node("B", "double", "input * 2"));
    workflow.add_node(output_node("C", "out"));
    workflow.add_edge(Edge::new("e1", "A", "B"));
    workflow.add_edge(Edge::new("e2", "B", "C"));
    store.create_workflow(&workflow).await.expect("create");

    let execution = engine
        .execute_workflow(&"s1".into(), json!(3))
        .await
        .expect("execute");
    let final_execution = engine.wait_for(execution.id).await.expect("wait");

    assert_eq!(final_execution.status, ExecutionStatus::Completed);
    assert_eq!(final_execution.output, Some(json!(6)));
    assert_eq!(
        sink.names(),
        vec![
            "node:start",
            "node:complete",
            "node:start",
            "node:complete",
            "node:start",
            "node:complete",
            "execution:complete",
        ]
    );
}

/// S2 — diamond with fan-in: D receives a mapping keyed by upstream
/// labels.
#[tokio::test]
async fn s2_diamond_fan_in() {
    let sink = Arc::new(CollectingSink::new());
    let (engine, store) = engine_with_sink(Arc::clone(&sink) as _).await;

    let mut workflow = Workflow::new("s2", "Diamond");
    workflow.add_node(input_node("A", "in"));
    workflow.add_node(transform_node("B", "left", "input + 1"));
    workflow.add_node(transform_node("C", "right", "input * 10"));
    workflow.add_node(output_node("D", "out"));
    workflow.add_edge(Edge::new("e1", "A", "B"));
    workflow.add_edge(Edge::new("e2", "A", "C"));
    workflow.add_edge(Edge::new("e3", "B", "D"));
    workflow.add_edge(Edge::new("e4", "C", "D"));
    store.create_workflow(&workflow).await.expect("create");

    let execution = engine
        .execute_workflow(&"s2".into(), json!(4))
        .await
        .expect("execute");
    let final_execution = engine.wait_for(execution.id).await.expect("wait");

    assert_eq!(final_execution.status, ExecutionStatus::Completed);
    assert_eq!(
        final_execution.output,
        Some(json!({ "left": 5, "right": 40 }))
    );

    // Property 3 — topological respect: every edge's source completes
    // before its target starts.
    let events = sink.events();
    let position = |name: &str, node: &str| {
        events
            .iter()
            .position(|e| e.name() == name && e.node_id().is_some_and(|id| id.as_str() == node))
            .unwrap_or_else(|| panic!("missing {name} for {node}"))
    };
    for (source, target) in [("A", "B"), ("A", "C"), ("B", "D"), ("C", "D")] {
        assert!(
            position("node:complete", source) < position("node:start", target),
            "{source} must complete before {target} starts"
        );
    }

    // Property 4 — at most one start per node.
    for node in ["A", "B", "C", "D"] {
        let starts = sink
            .started_nodes()
            .iter()
            .filter(|id| id.as_str() == node)
            .count();
        assert_eq!(starts, 1, "{node} started {starts} times");
    }

    // Property 6 — fan-in stability: D's gathered input keys equal the
    // upstream labels with those upstreams' recorded outputs.
    let b_state = final_execution.node_state(&"B".into()).expect("B state");
    let c_state = final_execution.node_state(&"C".into()).expect("C state");
    let d_state = final_execution.node_state(&"D".into()).expect("D state");
    assert_eq!(
        d_state.output,
        Some(json!({
            "left": b_state.output.clone().unwrap(),
            "right": c_state.output.clone().unwrap(),
        }))
    );
}

/// S3 — cycle rejected synchronously; no execution record is created.
#[tokio::test]
async fn s3_cycle_rejected() {
    let (engine, store) = engine_with_sink(Arc::new(CollectingSink::new()) as _).await;

    let mut workflow = Workflow::new("s3", "Cycle");
    workflow.add_node(transform_node("a", "a", "input"));
    workflow.add_node(transform_node("b", "b", "input"));
    workflow.add_node(transform_node("c", "c", "input"));
    workflow.add_edge(Edge::new("e1", "a", "b"));
    workflow.add_edge(Edge::new("e2", "b", "c"));
    workflow.add_edge(Edge::new("e3", "c", "b"));
    store.create_workflow(&workflow).await.expect("create");

    let err = engine
        .execute_workflow(&"s3".into(), json!(null))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert!(
        store
            .list_executions(None)
            .await
            .expect("list")
            .is_empty()
    );
}

/// S4 — fail-fast: the failing node errors, downstream never starts,
/// and the persisted status matches the terminal event.
#[tokio::test]
async fn s4_fail_fast() {
    let sink = Arc::new(CollectingSink::new());
    let (engine, store) = engine_with_sink(Arc::clone(&sink) as _).await;

    let mut workflow = Workflow::new("s4", "Fail fast");
    workflow.add_node(input_node("A", "in"));
    workflow.add_node(transform_node("B", "boom", "nonexistent.field"));
    workflow.add_node(output_node("C", "out"));
    workflow.add_edge(Edge::new("e1", "A", "B"));
    workflow.add_edge(Edge::new("e2", "B", "C"));
    store.create_workflow(&workflow).await.expect("create");

    let execution = engine
        .execute_workflow(&"s4".into(), json!(1))
        .await
        .expect("execute");
    let final_execution = engine.wait_for(execution.id).await.expect("wait");

    assert_eq!(final_execution.status, ExecutionStatus::Error);
    assert!(final_execution.error.is_some());
    assert!(!sink.started_nodes().contains(&"C".into()));

    // Property 8 — persisted status matches the last execution:* event.
    assert_eq!(sink.names().last(), Some(&"execution:error"));
}

/// S5 — cooperative cancel: two parallel slow branches, stop after the
/// batch starts. No unfinished node completes; terminal status is
/// `stopped`; in-flight nodes settle as skipped.
#[tokio::test]
async fn s5_cooperative_cancel() {
    let broadcast = Arc::new(BroadcastSink::new(256));
    let mut live = broadcast.subscribe();
    let (engine, store) = engine_with_sink(Arc::clone(&broadcast) as _).await;

    let slow_branch = |id: &str, label: &str| {
        Node::new(
            id,
            label,
            NodeData::Tool(ToolData {
                tool_id: Some("shell".to_string()),
                tool_config: Some(
                    json!({ "command": "sleep 3" })
                        .as_object()
                        .cloned()
                        .unwrap(),
                ),
                ..ToolData::default()
            }),
        )
    };

    let mut workflow = Workflow::new("s5", "Cancel");
    workflow.add_node(input_node("A", "in"));
    workflow.add_node(slow_branch("B1", "first"));
    workflow.add_node(slow_branch("B2", "second"));
    workflow.add_node(output_node("C", "out"));
    workflow.add_edge(Edge::new("e1", "A", "B1"));
    workflow.add_edge(Edge::new("e2", "A", "B2"));
    workflow.add_edge(Edge::new("e3", "B1", "C"));
    workflow.add_edge(Edge::new("e4", "B2", "C"));
    store.create_workflow(&workflow).await.expect("create");

    let execution = engine
        .execute_workflow(&"s5".into(), json!(null))
        .await
        .expect("execute");

    // Wait until one of the slow branches has started.
    let deadline = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let (_, event) = live.recv().await.expect("live event");
            if let ExecutionEvent::NodeStart { node_id, .. } = &event
                && node_id.as_str().starts_with('B')
            {
                break;
            }
        }
    });
    deadline.await.expect("a slow branch must start");

    engine.stop_execution(execution.id).await.expect("stop");

    let final_execution = store
        .get_execution(execution.id)
        .await
        .expect("get")
        .expect("present");
    assert_eq!(final_execution.status, ExecutionStatus::Stopped);

    // No unfinished node completed; C never ran.
    for node in ["B1", "B2", "C"] {
        let state = final_execution.node_state(&node.into());
        if let Some(state) = state {
            assert_ne!(state.status, NodeStatus::Completed, "{node} completed");
            assert_ne!(state.status, NodeStatus::Running, "{node} left running");
        }
    }

    // Stopping an already-stopped execution is an error (deregistered).
    let err = engine.stop_execution(execution.id).await.unwrap_err();
    assert!(matches!(err, EngineError::UnknownExecution { .. }));
}

/// S6 — forEach loop passes the sequence through as one value.
#[tokio::test]
async fn s6_for_each_loop() {
    let sink = Arc::new(CollectingSink::new());
    let (engine, store) = engine_with_sink(Arc::clone(&sink) as _).await;

    let mut workflow = Workflow::new("s6", "ForEach");
    workflow.add_node(input_node("A", "in"));
    workflow.add_node(Node::new(
        "B",
        "each",
        NodeData::Loop(LoopData {
            loop_type: LoopKind::ForEach,
            ..LoopData::default()
        }),
    ));
    workflow.add_node(output_node("C", "out"));
    workflow.add_edge(Edge::new("e1", "A", "B"));
    workflow.add_edge(Edge::new("e2", "B", "C"));
    store.create_workflow(&workflow).await.expect("create");

    let execution = engine
        .execute_workflow(&"s6".into(), json!(["x", "y", "z"]))
        .await
        .expect("execute");
    let final_execution = engine.wait_for(execution.id).await.expect("wait");

    assert_eq!(final_execution.status, ExecutionStatus::Completed);
    assert_eq!(final_execution.output, Some(json!(["x", "y", "z"])));
    // Three items, but exactly one downstream dispatch of C.
    assert_eq!(
        sink.completed_nodes()
            .iter()
            .filter(|id| id.as_str() == "C")
            .count(),
        1
    );
}

/// Property 5 — output determinism for pure graphs: identical inputs
/// produce identical outputs across repeated executions.
#[tokio::test]
async fn pure_graph_determinism() {
    let (engine, store) = engine_with_sink(Arc::new(CollectingSink::new()) as _).await;

    let mut workflow = Workflow::new("pure", "Pure");
    workflow.add_node(input_node("A", "in"));
    workflow.add_node(transform_node("B", "left", "input.n + 1"));
    workflow.add_node(transform_node("C", "right", "input.n * 3"));
    workflow.add_node(output_node("D", "out"));
    workflow.add_edge(Edge::new("e1", "A", "B"));
    workflow.add_edge(Edge::new("e2", "A", "C"));
    workflow.add_edge(Edge::new("e3", "B", "D"));
    workflow.add_edge(Edge::new("e4", "C", "D"));
    store.create_workflow(&workflow).await.expect("create");

    let mut outputs = Vec::new();
    for _ in 0..3 {
        let execution = engine
            .execute_workflow(&"pure".into(), json!({ "n": 7 }))
            .await
            .expect("execute");
        let final_execution = engine.wait_for(execution.id).await.expect("wait");
        assert_eq!(final_execution.status, ExecutionStatus::Completed);
        outputs.push(
            serde_json::to_string(&final_execution.output.unwrap_or(JsonValue::Null))
                .expect("encode"),
        );
    }
    assert!(outputs.windows(2).all(|w| w[0] == w[1]));
}

/// Property 7 — cancellation liveness: after stop, no further
/// node:start appears and the execution terminates promptly.
#[tokio::test]
async fn cancellation_liveness() {
    let broadcast = Arc::new(BroadcastSink::new(256));
    let mut live = broadcast.subscribe();
    let (engine, store) = engine_with_sink(Arc::clone(&broadcast) as _).await;

    // A chain of slow nodes; stopping during the first leaves the rest
    // unvisited.
    let slow = |id: &str| {
        Node::new(
            id,
            id,
            NodeData::Tool(ToolData {
                tool_id: Some("shell".to_string()),
                tool_config: Some(
                    json!({ "command": "sleep 2" })
                        .as_object()
                        .cloned()
                        .unwrap(),
                ),
                ..ToolData::default()
            }),
        )
    };

    let mut workflow = Workflow::new("live", "Liveness");
    workflow.add_node(slow("S1"));
    workflow.add_node(slow("S2"));
    workflow.add_edge(Edge::new("e1", "S1", "S2"));
    store.create_workflow(&workflow).await.expect("create");

    let execution = engine
        .execute_workflow(&"live".into(), json!(null))
        .await
        .expect("execute");

    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let (_, event) = live.recv().await.expect("live event");
            if event.name() == "node:start" {
                break;
            }
        }
    })
    .await
    .expect("first node must start");

    let stopped_at = std::time::Instant::now();
    engine.stop_execution(execution.id).await.expect("stop");
    // Bounded by the longest single in-flight dispatch (the 2s sleep),
    // with generous slack for slow machines.
    assert!(stopped_at.elapsed() < Duration::from_secs(8));

    // No node:start may follow the stop.
    let mut post_stop_starts = 0;
    while let Ok((_, event)) = live.try_recv() {
        if event.name() == "node:start" && event.node_id().is_some_and(|id| id.as_str() == "S2") {
            post_stop_starts += 1;
        }
    }
    assert_eq!(post_stop_starts, 0);
}
