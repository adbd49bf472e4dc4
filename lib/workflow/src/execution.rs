//! Execution records and their status machines.
//!
//! An execution is one run of a workflow to terminal status, with its
//! own input, output, per-node state, and log. Statuses transition
//! monotonically:
//! - Execution: `pending → running → (completed | error | stopped)`
//! - Node: `pending → running → (completed | error | skipped)`
//!
//! No reverse transitions. A node's output is recorded exactly once, at
//! the `completed` transition.

use chrono::{DateTime, Utc};
use flowstone_core::{ExecutionId, NodeId, WorkflowId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// The overall status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Created, not yet scheduled.
    Pending,
    /// Actively executing.
    Running,
    /// All reached nodes completed.
    Completed,
    /// A node error aborted the execution.
    Error,
    /// The user stopped the execution.
    Stopped,
}

impl ExecutionStatus {
    /// Returns true if this is a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Stopped)
    }

    /// Returns the lowercase wire name of this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Stopped => "stopped",
        }
    }
}

/// The status of a single node within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Waiting for upstream nodes.
    Pending,
    /// Currently executing.
    Running,
    /// Completed successfully.
    Completed,
    /// Failed.
    Error,
    /// Cancelled while in flight, or never finished; its output (if
    /// any) was discarded.
    Skipped,
}

impl NodeStatus {
    /// Returns true if this is a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Skipped)
    }
}

/// Per-node execution state. Created lazily at the first transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeState {
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Set exactly once, at the `completed` transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Reserved for a node-level retry policy; stays 0 in the core.
    #[serde(default)]
    pub retry_count: u32,
}

impl NodeState {
    /// Creates a state in `running`, stamped now.
    #[must_use]
    pub fn running() -> Self {
        Self {
            status: NodeStatus::Running,
            started_at: Some(Utc::now()),
            completed_at: None,
            output: None,
            error: None,
            retry_count: 0,
        }
    }

    /// Transitions to `completed`, recording the output.
    pub fn complete(&mut self, output: JsonValue) {
        self.status = NodeStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.output = Some(output);
    }

    /// Transitions to `error`.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = NodeStatus::Error;
        self.completed_at = Some(Utc::now());
        self.error = Some(error.into());
    }

    /// Transitions to `skipped`.
    pub fn skip(&mut self) {
        self.status = NodeStatus::Skipped;
        self.completed_at = Some(Utc::now());
    }
}

impl Default for NodeState {
    fn default() -> Self {
        Self {
            status: NodeStatus::Pending,
            started_at: None,
            completed_at: None,
            output: None,
            error: None,
            retry_count: 0,
        }
    }
}

/// Severity of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the lowercase wire name of this level.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// One line in an execution's append-only log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl LogLine {
    /// Creates a log line stamped now.
    #[must_use]
    pub fn new(level: LogLevel, node_id: Option<NodeId>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            node_id,
            message: message.into(),
            data: None,
        }
    }

    /// Attaches a structured payload.
    #[must_use]
    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = Some(data);
        self
    }
}

/// A record of a single workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    /// Unique identifier for this execution.
    pub id: ExecutionId,
    /// The workflow being executed.
    pub workflow_id: WorkflowId,
    /// Current status.
    pub status: ExecutionStatus,
    /// Input record the execution was started with.
    pub input: JsonValue,
    /// Terminal output (if completed).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<JsonValue>,
    /// Terminal error message (if failed).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the execution started.
    pub started_at: DateTime<Utc>,
    /// When the execution reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Per-node execution state, created lazily at first transition.
    #[serde(default)]
    pub node_states: HashMap<NodeId, NodeState>,
    /// Recent log window. The full log lives in the store.
    #[serde(default)]
    pub logs: Vec<LogLine>,
}

impl Execution {
    /// Creates a new pending execution.
    #[must_use]
    pub fn new(workflow_id: WorkflowId, input: JsonValue) -> Self {
        Self {
            id: ExecutionId::new(),
            workflow_id,
            status: ExecutionStatus::Pending,
            input,
            output: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
            node_states: HashMap::new(),
            logs: Vec::new(),
        }
    }

    /// Transitions to `running`.
    pub fn start(&mut self) {
        self.status = ExecutionStatus::Running;
        self.started_at = Utc::now();
    }

    /// Transitions to `completed`, recording the output.
    pub fn complete(&mut self, output: JsonValue) {
        self.status = ExecutionStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.output = Some(output);
    }

    /// Transitions to `error`.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = ExecutionStatus::Error;
        self.completed_at = Some(Utc::now());
        self.error = Some(error.into());
    }

    /// Transitions to `stopped`.
    pub fn stop(&mut self) {
        self.status = ExecutionStatus::Stopped;
        self.completed_at = Some(Utc::now());
    }

    /// Returns the state of a node, if it transitioned at least once.
    #[must_use]
    pub fn node_state(&self, node_id: &NodeId) -> Option<&NodeState> {
        self.node_states.get(node_id)
    }

    /// Applies a partial update.
    pub fn apply(&mut self, update: ExecutionUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(output) = update.output {
            self.output = Some(output);
        }
        if let Some(error) = update.error {
            self.error = Some(error);
        }
        if let Some(completed_at) = update.completed_at {
            self.completed_at = Some(completed_at);
        }
    }
}

/// A partial update to an execution. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutionUpdate {
    pub status: Option<ExecutionStatus>,
    pub output: Option<JsonValue>,
    pub error: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionUpdate {
    /// Update that marks an execution completed with its output, now.
    #[must_use]
    pub fn completed(output: JsonValue) -> Self {
        Self {
            status: Some(ExecutionStatus::Completed),
            output: Some(output),
            error: None,
            completed_at: Some(Utc::now()),
        }
    }

    /// Update that marks an execution failed, now.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(ExecutionStatus::Error),
            output: None,
            error: Some(error.into()),
            completed_at: Some(Utc::now()),
        }
    }

    /// Update that marks an execution stopped, now.
    #[must_use]
    pub fn stopped() -> Self {
        Self {
            status: Some(ExecutionStatus::Stopped),
            output: None,
            error: None,
            completed_at: Some(Utc::now()),
        }
    }
}
