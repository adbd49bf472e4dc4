//! Error types for the engine crate.

use crate::expr::ExprError;
use flowstone_ai::AiError;
use flowstone_core::{ExecutionId, NodeId, WorkflowId};
use flowstone_store::StoreError;
use flowstone_tools::ToolError;
use flowstone_workflow::ValidationError;
use std::fmt;

/// Errors from a single node dispatch. Fatal to the enclosing execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// A required per-kind data field is absent.
    MissingNodeData { node_id: NodeId, field: &'static str },
    /// A `tool` node has no `toolId`.
    MissingToolId { node_id: NodeId },
    /// The named tool is not in the registry.
    UnknownTool { tool_id: String },
    /// An `input` node has incoming edges.
    UpstreamNotAllowed { node_id: NodeId },
    /// Expression or user-code evaluation failed.
    Expression(ExprError),
    /// A tool invocation failed.
    Tool(ToolError),
    /// A model gateway call failed.
    Model(AiError),
    /// The node observed the cancellation flag and aborted its work.
    Cancelled,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingNodeData { node_id, field } => {
                write!(f, "node {node_id} is missing required data field '{field}'")
            }
            Self::MissingToolId { node_id } => {
                write!(f, "tool node {node_id} has no toolId")
            }
            Self::UnknownTool { tool_id } => write!(f, "unknown tool: {tool_id}"),
            Self::UpstreamNotAllowed { node_id } => {
                write!(f, "input node {node_id} must not have incoming edges")
            }
            Self::Expression(e) => write!(f, "expression error: {e}"),
            Self::Tool(e) => write!(f, "tool error: {e}"),
            Self::Model(e) => write!(f, "model error: {e}"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for DispatchError {}

impl From<ExprError> for DispatchError {
    fn from(e: ExprError) -> Self {
        Self::Expression(e)
    }
}

impl From<ToolError> for DispatchError {
    fn from(e: ToolError) -> Self {
        Self::Tool(e)
    }
}

impl From<AiError> for DispatchError {
    fn from(e: AiError) -> Self {
        Self::Model(e)
    }
}

/// Errors from engine-level operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The named workflow does not exist.
    UnknownWorkflow { workflow_id: WorkflowId },
    /// The named execution is not active.
    UnknownExecution { execution_id: ExecutionId },
    /// The workflow failed structural validation.
    Validation(ValidationError),
    /// A store operation failed.
    Storage(StoreError),
    /// The concurrent execution limit is reached.
    TooManyExecutions { limit: usize },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownWorkflow { workflow_id } => {
                write!(f, "unknown workflow: {workflow_id}")
            }
            Self::UnknownExecution { execution_id } => {
                write!(f, "unknown execution: {execution_id}")
            }
            Self::Validation(e) => write!(f, "validation failed: {e}"),
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::TooManyExecutions { limit } => {
                write!(f, "concurrent execution limit reached ({limit})")
            }
        }
    }
}

impl std::error::Error for EngineError {}

impl From<ValidationError> for EngineError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        Self::Storage(e)
    }
}
