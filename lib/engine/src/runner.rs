//! The DAG runner: one per execution.
//!
//! Owns the in-memory output table, remaining in-degree counters, and
//! the ready queue. The runner task is the single writer of all
//! scheduling state; only the dispatch batch itself is concurrent.
//!
//! Scheduling loop: drain the ready queue into a batch, dispatch the
//! batch concurrently, wait for all to settle, then fold results back
//! into the counters. A node failure signals cancellation, lets the
//! in-flight batch drain, and fails the execution with the first
//! captured error. An external stop discards in-flight results and
//! terminates with no further events.

use crate::dispatch::NodeDispatcher;
use crate::error::DispatchError;
use flowstone_core::{AppConfig, ExecutionId, NodeId};
use flowstone_tools::ExecutionContext;
use flowstone_workflow::definition::Workflow;
use flowstone_workflow::event::{EventEmitter, ExecutionEvent};
use flowstone_workflow::execution::LogLevel;
use flowstone_workflow::graph::WorkflowGraph;
use flowstone_workflow::node::{Node, NodeKind};
use futures::future::join_all;
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Terminal outcome of one runner.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// All reached nodes completed; carries the selected result.
    Completed(JsonValue),
    /// A node error aborted the execution (fail-fast).
    Failed(String),
    /// An external stop ended the execution.
    Stopped,
}

/// Drives one execution of a workflow to terminal status.
pub struct DagRunner {
    workflow: Arc<Workflow>,
    graph: WorkflowGraph,
    execution_id: ExecutionId,
    input: JsonValue,
    dispatcher: Arc<NodeDispatcher>,
    config: Arc<AppConfig>,
    emitter: EventEmitter,
    cancel: CancellationToken,
}

impl DagRunner {
    /// Creates a runner over an already-validated workflow graph.
    #[must_use]
    pub fn new(
        workflow: Arc<Workflow>,
        graph: WorkflowGraph,
        execution_id: ExecutionId,
        input: JsonValue,
        dispatcher: Arc<NodeDispatcher>,
        config: Arc<AppConfig>,
        emitter: EventEmitter,
    ) -> Self {
        Self {
            workflow,
            graph,
            execution_id,
            input,
            dispatcher,
            config,
            emitter,
            cancel: CancellationToken::new(),
        }
    }

    /// Returns the cancellation token; `cancel()` on it is `stop()`.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Requests a cooperative stop.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Runs the scheduling loop to a terminal outcome.
    pub async fn run(self) -> RunOutcome {
        // Merged variables-plus-input map, snapshotted once per run.
        let variables = self.merged_variables();

        let mut outputs: HashMap<NodeId, JsonValue> = HashMap::new();
        let mut remaining: HashMap<NodeId, usize> = HashMap::new();
        let mut ready: VecDeque<NodeId> = VecDeque::new();

        for node_id in self.graph.node_ids() {
            let in_degree = self.graph.in_degree(node_id);
            remaining.insert(node_id.clone(), in_degree);
            if in_degree == 0 {
                ready.push_back(node_id.clone());
            }
        }

        // Input-kind nodes resolve to the execution input; seed the
        // table so fan-in never misses them.
        for node in &self.workflow.nodes {
            if node.kind() == NodeKind::Input {
                outputs.insert(node.id.clone(), self.input.clone());
            }
        }

        let mut first_error: Option<String> = None;

        while !ready.is_empty() {
            if self.cancel.is_cancelled() {
                break;
            }

            // Drain the ready queue into a batch, gathering each node's
            // input while the output table is quiescent.
            let mut batch: Vec<(&Node, JsonValue)> = Vec::with_capacity(ready.len());
            while let Some(node_id) = ready.pop_front() {
                let Some(node) = self.workflow.node(&node_id) else {
                    continue;
                };
                batch.push((node, self.gather_input(&node_id, &outputs)));
            }

            self.emitter.log(
                LogLevel::Debug,
                None,
                format!("dispatching batch of {}", batch.len()),
            );

            let futures = batch.into_iter().map(|(node, input)| {
                let ctx = ExecutionContext::new(
                    self.execution_id,
                    self.workflow.id.clone(),
                    node.id.clone(),
                    variables.clone(),
                    Arc::clone(&self.config),
                    self.emitter.clone(),
                );
                let dispatcher = Arc::clone(&self.dispatcher);
                let emitter = self.emitter.clone();
                let cancel = self.cancel.clone();
                let upstream_not_allowed =
                    node.kind() == NodeKind::Input && self.graph.in_degree(&node.id) > 0;
                async move {
                    emitter.emit(ExecutionEvent::NodeStart {
                        node_id: node.id.clone(),
                        kind: node.kind(),
                    });
                    let result = if upstream_not_allowed {
                        Err(DispatchError::UpstreamNotAllowed {
                            node_id: node.id.clone(),
                        })
                    } else {
                        dispatcher.dispatch(node, input, &ctx, &cancel).await
                    };
                    (node.id.clone(), result)
                }
            });

            let settled = join_all(futures).await;

            // An external stop (no captured error) discards the whole
            // drained batch: outputs are dropped and no events follow.
            let externally_stopped = self.cancel.is_cancelled() && first_error.is_none();

            for (node_id, result) in settled {
                if externally_stopped {
                    continue;
                }
                match result {
                    Ok(output) => {
                        outputs.insert(node_id.clone(), output.clone());
                        self.emitter.emit(ExecutionEvent::NodeComplete {
                            node_id: node_id.clone(),
                            output,
                        });
                        for successor in self.graph.successors(&node_id) {
                            if let Some(count) = remaining.get_mut(successor) {
                                *count = count.saturating_sub(1);
                                if *count == 0 && !self.cancel.is_cancelled() {
                                    ready.push_back(successor.clone());
                                }
                            }
                        }
                    }
                    // A node that observed the abort is recorded as
                    // skipped at finalization, not failed.
                    Err(DispatchError::Cancelled) => {}
                    Err(error) => {
                        let message = error.to_string();
                        self.emitter.emit(ExecutionEvent::NodeError {
                            node_id: node_id.clone(),
                            error: message.clone(),
                        });
                        if first_error.is_none() {
                            first_error = Some(message);
                            self.cancel.cancel();
                        }
                    }
                }
            }
        }

        if let Some(error) = first_error {
            self.emitter.emit(ExecutionEvent::ExecutionError {
                error: error.clone(),
            });
            return RunOutcome::Failed(error);
        }

        if self.cancel.is_cancelled() {
            // User-initiated stop: terminal status is written by the
            // engine; no execution event is emitted.
            return RunOutcome::Stopped;
        }

        let output = self.select_result(&outputs);
        self.emitter.emit(ExecutionEvent::ExecutionComplete {
            output: output.clone(),
        });
        RunOutcome::Completed(output)
    }

    fn merged_variables(&self) -> JsonMap<String, JsonValue> {
        let mut merged = self.workflow.variables.clone().unwrap_or_default();
        if let JsonValue::Object(input) = &self.input {
            for (key, value) in input {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }

    /// Gathers the input for a node from its upstream outputs.
    ///
    /// - No incoming edges: the execution's input record.
    /// - One upstream: that upstream's output, verbatim.
    /// - Several upstreams: a mapping keyed by each upstream's label
    ///   (falling back to node id); key collisions take the later
    ///   insertion, in document edge order.
    fn gather_input(&self, node_id: &NodeId, outputs: &HashMap<NodeId, JsonValue>) -> JsonValue {
        let predecessors = self.graph.predecessors(node_id);
        match predecessors {
            [] => self.input.clone(),
            [single] => outputs.get(single).cloned().unwrap_or(JsonValue::Null),
            several => {
                let mut gathered = JsonMap::new();
                for upstream_id in several {
                    let key = self
                        .workflow
                        .node(upstream_id)
                        .map_or_else(|| upstream_id.as_str().to_string(), |n| {
                            n.label_or_id().to_string()
                        });
                    let value = outputs.get(upstream_id).cloned().unwrap_or(JsonValue::Null);
                    gathered.insert(key, value);
                }
                JsonValue::Object(gathered)
            }
        }
    }

    /// Result selection on clean termination: the `output`-kind nodes'
    /// values, else the terminal nodes' values, keyed by label when
    /// there are several.
    fn select_result(&self, outputs: &HashMap<NodeId, JsonValue>) -> JsonValue {
        let output_nodes: Vec<&Node> = self
            .workflow
            .nodes
            .iter()
            .filter(|n| n.kind() == NodeKind::Output)
            .collect();

        let selected: Vec<&Node> = if output_nodes.is_empty() {
            self.graph
                .terminal_nodes()
                .iter()
                .filter_map(|id| self.workflow.node(id))
                .collect()
        } else {
            output_nodes
        };

        match selected.as_slice() {
            [] => JsonValue::Null,
            [single] => outputs.get(&single.id).cloned().unwrap_or(JsonValue::Null),
            several => {
                let mut map = JsonMap::new();
                for node in several {
                    map.insert(
                        node.label_or_id().to_string(),
                        outputs.get(&node.id).cloned().unwrap_or(JsonValue::Null),
                    );
                }
                JsonValue::Object(map)
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use flowstone_ai::ModelGateway;
    use flowstone_tools::ToolRegistry;
    use flowstone_workflow::edge::Edge;
    use flowstone_workflow::graph::validate_workflow;
    use flowstone_workflow::node::{
        InputData, NodeData, OutputData, TransformData,
    };
    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn transform(id: &str, label: &str, expression: &str) -> Node {
        Node::new(
            id,
            label,
            NodeData::Transform(TransformData {
                transform: Some(expression.to_string()),
                ..TransformData::default()
            }),
        )
    }

    fn runner_for(
        workflow: Workflow,
        input: JsonValue,
    ) -> (DagRunner, UnboundedReceiver<ExecutionEvent>) {
        let graph = validate_workflow(&workflow).expect("valid workflow");
        let config = Arc::new(AppConfig::default());
        let dispatcher = Arc::new(NodeDispatcher::new(
            Arc::new(ToolRegistry::with_builtins()),
            Arc::new(ModelGateway::new(&config)),
        ));
        let (emitter, rx) = EventEmitter::channel();
        let runner = DagRunner::new(
            Arc::new(workflow),
            graph,
            ExecutionId::new(),
            input,
            dispatcher,
            config,
            emitter,
        );
        (runner, rx)
    }

    fn drain(mut rx: UnboundedReceiver<ExecutionEvent>) -> Vec<ExecutionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if !matches!(event, ExecutionEvent::Log { .. }) {
                events.push(event);
            }
        }
        events
    }

    #[tokio::test]
    async fn linear_chain_runs_in_order() {
        let mut workflow = Workflow::new("wf-chain", "Chain");
        workflow.add_node(Node::new("a", "in", NodeData::Input(InputData::default())));
        workflow.add_node(transform("b", "double", "input * 2"));
        workflow.add_node(Node::new("c", "out", NodeData::Output(OutputData::default())));
        workflow.add_edge(Edge::new("e1", "a", "b"));
        workflow.add_edge(Edge::new("e2", "b", "c"));

        let (runner, rx) = runner_for(workflow, json!(3));
        let outcome = runner.run().await;
        assert_eq!(outcome, RunOutcome::Completed(json!(6)));

        let names: Vec<&str> = drain(rx).iter().map(ExecutionEvent::name).collect();
        assert_eq!(
            names,
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

    #[tokio::test]
    async fn diamond_fan_in_keys_by_label() {
        let mut workflow = Workflow::new("wf-diamond", "Diamond");
        workflow.add_node(Node::new("a", "in", NodeData::Input(InputData::default())));
        workflow.add_node(transform("b", "left", "input + 1"));
        workflow.add_node(transform("c", "right", "input * 10"));
        workflow.add_node(Node::new("d", "out", NodeData::Output(OutputData::default())));
        workflow.add_edge(Edge::new("e1", "a", "b"));
        workflow.add_edge(Edge::new("e2", "a", "c"));
        workflow.add_edge(Edge::new("e3", "b", "d"));
        workflow.add_edge(Edge::new("e4", "c", "d"));

        let (runner, _rx) = runner_for(workflow, json!(4));
        let outcome = runner.run().await;
        assert_eq!(
            outcome,
            RunOutcome::Completed(json!({ "left": 5, "right": 40 }))
        );
    }

    #[tokio::test]
    async fn failure_aborts_downstream() {
        let mut workflow = Workflow::new("wf-fail", "Fail fast");
        workflow.add_node(Node::new("a", "in", NodeData::Input(InputData::default())));
        workflow.add_node(transform("b", "boom", "nonexistent.field"));
        workflow.add_node(Node::new("c", "out", NodeData::Output(OutputData::default())));
        workflow.add_edge(Edge::new("e1", "a", "b"));
        workflow.add_edge(Edge::new("e2", "b", "c"));

        let (runner, rx) = runner_for(workflow, json!(1));
        let outcome = runner.run().await;
        assert!(matches!(outcome, RunOutcome::Failed(_)));

        let events = drain(rx);
        let names: Vec<&str> = events.iter().map(ExecutionEvent::name).collect();
        assert!(names.contains(&"node:error"));
        assert!(names.contains(&"execution:error"));
        // `c` never starts.
        let started: Vec<&NodeId> = events
            .iter()
            .filter(|e| e.name() == "node:start")
            .filter_map(ExecutionEvent::node_id)
            .collect();
        assert!(!started.contains(&&NodeId::from("c")));
    }

    #[tokio::test]
    async fn no_output_node_selects_terminals() {
        let mut workflow = Workflow::new("wf-term", "Terminals");
        workflow.add_node(Node::new("a", "in", NodeData::Input(InputData::default())));
        workflow.add_node(transform("b", "only", "input + 1"));
        workflow.add_edge(Edge::new("e1", "a", "b"));

        let (runner, _rx) = runner_for(workflow, json!(1));
        assert_eq!(runner.run().await, RunOutcome::Completed(json!(2)));
    }

    #[tokio::test]
    async fn multiple_outputs_key_by_label() {
        let mut workflow = Workflow::new("wf-multi", "Multi-output");
        workflow.add_node(Node::new("a", "in", NodeData::Input(InputData::default())));
        workflow.add_node(transform("b", "inc", "input + 1"));
        workflow.add_node(transform("c", "dec", "input - 1"));
        workflow.add_node(Node::new("ob", "plus", NodeData::Output(OutputData::default())));
        workflow.add_node(Node::new("oc", "minus", NodeData::Output(OutputData::default())));
        workflow.add_edge(Edge::new("e1", "a", "b"));
        workflow.add_edge(Edge::new("e2", "a", "c"));
        workflow.add_edge(Edge::new("e3", "b", "ob"));
        workflow.add_edge(Edge::new("e4", "c", "oc"));

        let (runner, _rx) = runner_for(workflow, json!(10));
        assert_eq!(
            runner.run().await,
            RunOutcome::Completed(json!({ "plus": 11, "minus": 9 }))
        );
    }

    #[tokio::test]
    async fn stop_before_run_yields_stopped_without_events() {
        let mut workflow = Workflow::new("wf-stop", "Stop");
        workflow.add_node(Node::new("a", "in", NodeData::Input(InputData::default())));

        let (runner, rx) = runner_for(workflow, json!(null));
        runner.stop();
        assert_eq!(runner.run().await, RunOutcome::Stopped);
        assert!(drain(rx).is_empty());
    }

    #[tokio::test]
    async fn disconnected_node_still_runs() {
        let mut workflow = Workflow::new("wf-island", "Island");
        workflow.add_node(Node::new("a", "in", NodeData::Input(InputData::default())));
        workflow.add_node(transform("island", "island", "\"alone\""));

        let (runner, _rx) = runner_for(workflow, json!(1));
        let outcome = runner.run().await;
        // Both are terminal; result maps by label.
        assert_eq!(
            outcome,
            RunOutcome::Completed(json!({ "in": 1, "island": "alone" }))
        );
    }
}
