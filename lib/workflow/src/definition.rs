//! Workflow definition types.
//!
//! A workflow is a named, versionless record: identity, metadata, and
//! the node/edge lists that induce its graph. Edits overwrite the node
//! and edge lists atomically and advance the modification timestamp.

use crate::edge::Edge;
use crate::node::Node;
use chrono::{DateTime, Utc};
use flowstone_core::{NodeId, WorkflowId};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

/// A complete workflow document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    /// Unique identifier, chosen by the document author.
    pub id: WorkflowId,
    /// Human-readable name.
    pub name: String,
    /// Description of what this workflow does.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Ordered node list.
    pub nodes: Vec<Node>,
    /// Ordered edge list. Order is meaningful for fan-in determinism.
    pub edges: Vec<Edge>,
    /// Free-form variables available to executions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<JsonMap<String, JsonValue>>,
    /// Free-form metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonMap<String, JsonValue>>,
    /// When this workflow was created.
    pub created_at: DateTime<Utc>,
    /// When this workflow was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Creates a new empty workflow.
    #[must_use]
    pub fn new(id: impl Into<WorkflowId>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            nodes: Vec::new(),
            edges: Vec::new(),
            variables: None,
            metadata: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the node with the given id, if any.
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// Adds a node.
    pub fn add_node(&mut self, node: Node) -> &mut Self {
        self.nodes.push(node);
        self
    }

    /// Adds an edge.
    pub fn add_edge(&mut self, edge: Edge) -> &mut Self {
        self.edges.push(edge);
        self
    }

    /// Marks the workflow as updated (bumps the modification timestamp).
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Applies a partial update, advancing the modification timestamp.
    pub fn apply(&mut self, update: WorkflowUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(description) = update.description {
            self.description = Some(description);
        }
        if let Some(nodes) = update.nodes {
            self.nodes = nodes;
        }
        if let Some(edges) = update.edges {
            self.edges = edges;
        }
        if let Some(variables) = update.variables {
            self.variables = Some(variables);
        }
        if let Some(metadata) = update.metadata {
            self.metadata = Some(metadata);
        }
        self.touch();
    }
}

/// A partial update to a workflow. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub nodes: Option<Vec<Node>>,
    pub edges: Option<Vec<Edge>>,
    pub variables: Option<JsonMap<String, JsonValue>>,
    pub metadata: Option<JsonMap<String, JsonValue>>,
}

/// Summary information about a workflow (for listings).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub id: WorkflowId,
    pub name: String,
    pub description: Option<String>,
    pub node_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl From<&Workflow> for WorkflowSummary {
    fn from(workflow: &Workflow) -> Self {
        Self {
            id: workflow.id.clone(),
            name: workflow.name.clone(),
            description: workflow.description.clone(),
            node_count: workflow.nodes.len(),
            updated_at: workflow.updated_at,
        }
    }
}
