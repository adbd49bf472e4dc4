//! The persistence seam.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flowstone_core::{ExecutionId, NodeId, TemplateId, WorkflowId};
use flowstone_workflow::definition::{Workflow, WorkflowSummary, WorkflowUpdate};
use flowstone_workflow::execution::{Execution, ExecutionUpdate, LogLine, NodeStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A reusable workflow blueprint, listable by category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: TemplateId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: String,
    /// The workflow document this template instantiates.
    pub workflow: JsonValue,
    pub created_at: DateTime<Utc>,
}

impl Template {
    /// Creates a template from a workflow document.
    #[must_use]
    pub fn new(name: impl Into<String>, category: impl Into<String>, workflow: JsonValue) -> Self {
        Self {
            id: TemplateId::new(),
            name: name.into(),
            description: None,
            category: category.into(),
            workflow,
            created_at: Utc::now(),
        }
    }
}

/// Durable key-addressed storage for workflows, executions, templates,
/// and logs.
///
/// Contracts:
/// - Every update is durably committed before the call returns.
/// - Concurrent mutations to distinct executions proceed independently;
///   mutations to the same execution are serialized.
/// - The store is the sole authority on persisted execution status.
#[async_trait]
pub trait Store: Send + Sync {
    /// Persists a new workflow.
    async fn create_workflow(&self, workflow: &Workflow) -> Result<(), StoreError>;

    /// Applies a partial update, overwriting nodes/edges atomically and
    /// advancing the modification timestamp. Returns the updated record.
    async fn update_workflow(
        &self,
        id: &WorkflowId,
        update: WorkflowUpdate,
    ) -> Result<Workflow, StoreError>;

    /// Deletes a workflow.
    async fn delete_workflow(&self, id: &WorkflowId) -> Result<(), StoreError>;

    /// Fetches a workflow by id.
    async fn get_workflow(&self, id: &WorkflowId) -> Result<Option<Workflow>, StoreError>;

    /// Lists workflows, ordered by descending modification time.
    async fn list_workflows(&self) -> Result<Vec<WorkflowSummary>, StoreError>;

    /// Persists a new execution.
    async fn create_execution(&self, execution: &Execution) -> Result<(), StoreError>;

    /// Applies a partial update to an execution.
    async fn update_execution(
        &self,
        id: ExecutionId,
        update: ExecutionUpdate,
    ) -> Result<(), StoreError>;

    /// Fetches an execution by id.
    async fn get_execution(&self, id: ExecutionId) -> Result<Option<Execution>, StoreError>;

    /// Lists executions, optionally filtered by workflow, newest first.
    async fn list_executions(
        &self,
        workflow_id: Option<&WorkflowId>,
    ) -> Result<Vec<Execution>, StoreError>;

    /// Read-modify-writes one node's state inside the named execution.
    ///
    /// Atomic with respect to concurrent updates to the same execution.
    async fn update_execution_node_state(
        &self,
        execution_id: ExecutionId,
        node_id: &NodeId,
        status: NodeStatus,
        output: Option<JsonValue>,
        error: Option<String>,
    ) -> Result<(), StoreError>;

    /// Appends a log line. Append-only.
    async fn append_log(&self, execution_id: ExecutionId, line: LogLine) -> Result<(), StoreError>;

    /// Returns the full log of an execution, oldest first.
    async fn logs(&self, execution_id: ExecutionId) -> Result<Vec<LogLine>, StoreError>;

    /// Persists a new template.
    async fn create_template(&self, template: &Template) -> Result<(), StoreError>;

    /// Fetches a template by id.
    async fn get_template(&self, id: &TemplateId) -> Result<Option<Template>, StoreError>;

    /// Lists templates, optionally filtered by category.
    async fn list_templates(&self, category: Option<&str>) -> Result<Vec<Template>, StoreError>;
}
