//! Edge types for workflow graphs.
//!
//! An edge states that the target's dispatch requires the source's
//! completed output. Port handles are advisory: the runtime treats every
//! edge into a node as contributing exactly one upstream value.

use flowstone_core::{EdgeId, NodeId};
use serde::{Deserialize, Serialize};

/// A directed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    /// Unique identifier for this edge within the workflow.
    pub id: EdgeId,
    /// The source node id.
    pub source: NodeId,
    /// The target node id.
    pub target: NodeId,
    /// Advisory source-port label from the editor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    /// Advisory target-port label from the editor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    /// Human label for the edge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Edge {
    /// Creates a new edge between two nodes.
    #[must_use]
    pub fn new(id: impl Into<EdgeId>, source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
            label: None,
        }
    }

    /// Sets the human label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_document_shape() {
        let json = r#"{
            "id": "e1",
            "source": "a",
            "target": "b",
            "sourceHandle": "out",
            "label": "left"
        }"#;
        let edge: Edge = serde_json::from_str(json).expect("deserialize");
        assert_eq!(edge.source, "a");
        assert_eq!(edge.target, "b");
        assert_eq!(edge.source_handle.as_deref(), Some("out"));
        assert!(edge.target_handle.is_none());
    }

    #[test]
    fn edge_serde_roundtrip() {
        let edge = Edge::new("e1", "a", "b").with_label("left");
        let json = serde_json::to_string(&edge).expect("serialize");
        let parsed: Edge = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(edge, parsed);
    }
}
