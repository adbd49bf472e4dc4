//! Execution context handed to tool invocations.

use flowstone_core::{AppConfig, ExecutionId, NodeId, WorkflowId};
use flowstone_workflow::execution::LogLevel;
use flowstone_workflow::event::EventEmitter;
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::sync::Arc;

/// Per-invocation context for a tool (or dispatcher) call.
///
/// Carries the identity of the running node, the merged
/// variables-plus-input map, the configuration snapshot taken at
/// execution start, and the emitter that routes `emit(event, data)`
/// calls onto the runner's event stream.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// The execution this invocation belongs to.
    pub execution_id: ExecutionId,
    /// The workflow being executed.
    pub workflow_id: WorkflowId,
    /// The node currently dispatching.
    pub node_id: NodeId,
    /// Workflow variables merged with the execution input record.
    pub variables: JsonMap<String, JsonValue>,
    /// Configuration snapshot, including credential material.
    pub config: Arc<AppConfig>,
    emitter: EventEmitter,
}

impl ExecutionContext {
    /// Creates a context for one node invocation.
    #[must_use]
    pub fn new(
        execution_id: ExecutionId,
        workflow_id: WorkflowId,
        node_id: NodeId,
        variables: JsonMap<String, JsonValue>,
        config: Arc<AppConfig>,
        emitter: EventEmitter,
    ) -> Self {
        Self {
            execution_id,
            workflow_id,
            node_id,
            variables,
            config,
            emitter,
        }
    }

    /// Routes a tool-level event into the runner's event stream.
    ///
    /// Surfaces as a `log` event carrying the event name and payload,
    /// attributed to the current node.
    pub fn emit(&self, event: impl Into<String>, data: JsonValue) {
        self.emitter
            .log_data(LogLevel::Info, Some(self.node_id.clone()), event, data);
    }

    /// Emits a plain log line attributed to the current node.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emitter.log(level, Some(self.node_id.clone()), message);
    }

    /// Returns a variable (or input-record field) by name.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&JsonValue> {
        self.variables.get(name)
    }
}
