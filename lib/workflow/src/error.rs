//! Error types for the workflow crate.

use flowstone_core::{EdgeId, NodeId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Structural validation failures for a workflow document.
///
/// Validation is pure and idempotent; it runs before execution start and
/// before generator output is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationError {
    /// Two nodes share an identifier.
    DuplicateNodeId { node_id: NodeId },
    /// An edge references a node that does not exist in the workflow.
    DanglingEdge { edge_id: EdgeId, endpoint: NodeId },
    /// The graph induced by the edges contains a directed cycle.
    CycleDetected,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateNodeId { node_id } => {
                write!(f, "duplicate node id: {node_id}")
            }
            Self::DanglingEdge { edge_id, endpoint } => {
                write!(
                    f,
                    "edge {edge_id} references missing node: {endpoint}"
                )
            }
            Self::CycleDetected => write!(f, "workflow graph contains a cycle"),
        }
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dangling_edge_names_the_endpoint() {
        let err = ValidationError::DanglingEdge {
            edge_id: EdgeId::from("e3"),
            endpoint: NodeId::from("ghost"),
        };
        let message = err.to_string();
        assert!(message.contains("e3"));
        assert!(message.contains("ghost"));
    }

    #[test]
    fn cycle_detected_display() {
        assert!(ValidationError::CycleDetected.to_string().contains("cycle"));
    }
}
