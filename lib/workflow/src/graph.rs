//! Validated workflow graph.
//!
//! Built from a workflow document in one pass over its node and edge
//! lists. Construction performs the structural checks, in order:
//! 1. Node identifiers are unique
//! 2. Reference integrity: every edge endpoint names an existing node
//! 3. Acyclicity (via [`WorkflowGraph::validate`])
//!
//! Disconnected nodes are legal and merely unreachable. The adjacency
//! lists preserve document edge order so multi-parent fan-in is
//! deterministic.

use crate::definition::Workflow;
use crate::error::ValidationError;
use flowstone_core::NodeId;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// The dependency graph induced by a workflow's edges.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    /// The underlying directed graph, used for cycle detection.
    graph: DiGraph<NodeId, ()>,
    /// Map from node id to petgraph's NodeIndex for O(1) lookup.
    node_index_map: HashMap<NodeId, NodeIndex>,
    /// Downstream neighbors per node, in document edge order.
    forward: HashMap<NodeId, Vec<NodeId>>,
    /// Upstream neighbors per node, in document edge order.
    reverse: HashMap<NodeId, Vec<NodeId>>,
    /// Node ids in document order.
    order: Vec<NodeId>,
}

impl WorkflowGraph {
    /// Builds the graph from a workflow document.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateNodeId` if two nodes share an id, or
    /// `DanglingEdge` naming the missing endpoint if an edge references
    /// an unknown node. Cycle detection is separate; see [`Self::validate`].
    pub fn build(workflow: &Workflow) -> Result<Self, ValidationError> {
        let mut graph = DiGraph::new();
        let mut node_index_map = HashMap::new();
        let mut order = Vec::with_capacity(workflow.nodes.len());

        for node in &workflow.nodes {
            if node_index_map.contains_key(&node.id) {
                return Err(ValidationError::DuplicateNodeId {
                    node_id: node.id.clone(),
                });
            }
            let index = graph.add_node(node.id.clone());
            node_index_map.insert(node.id.clone(), index);
            order.push(node.id.clone());
        }

        let mut forward: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        let mut reverse: HashMap<NodeId, Vec<NodeId>> = HashMap::new();

        for edge in &workflow.edges {
            let Some(&source_idx) = node_index_map.get(&edge.source) else {
                return Err(ValidationError::DanglingEdge {
                    edge_id: edge.id.clone(),
                    endpoint: edge.source.clone(),
                });
            };
            let Some(&target_idx) = node_index_map.get(&edge.target) else {
                return Err(ValidationError::DanglingEdge {
                    edge_id: edge.id.clone(),
                    endpoint: edge.target.clone(),
                });
            };

            graph.add_edge(source_idx, target_idx, ());
            forward
                .entry(edge.source.clone())
                .or_default()
                .push(edge.target.clone());
            reverse
                .entry(edge.target.clone())
                .or_default()
                .push(edge.source.clone());
        }

        Ok(Self {
            graph,
            node_index_map,
            forward,
            reverse,
            order,
        })
    }

    /// Checks the graph for directed cycles.
    ///
    /// # Errors
    ///
    /// Returns `CycleDetected` if any back-edge exists.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if petgraph::algo::is_cyclic_directed(&self.graph) {
            return Err(ValidationError::CycleDetected);
        }
        Ok(())
    }

    /// Returns true if the graph contains the given node.
    #[must_use]
    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.node_index_map.contains_key(node_id)
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.order.len()
    }

    /// Node ids in document order.
    #[must_use]
    pub fn node_ids(&self) -> &[NodeId] {
        &self.order
    }

    /// Number of incoming edges for a node.
    #[must_use]
    pub fn in_degree(&self, node_id: &NodeId) -> usize {
        self.reverse.get(node_id).map_or(0, Vec::len)
    }

    /// Downstream neighbors of a node, in document edge order.
    #[must_use]
    pub fn successors(&self, node_id: &NodeId) -> &[NodeId] {
        self.forward.get(node_id).map_or(&[], Vec::as_slice)
    }

    /// Upstream neighbors of a node, in document edge order.
    #[must_use]
    pub fn predecessors(&self, node_id: &NodeId) -> &[NodeId] {
        self.reverse.get(node_id).map_or(&[], Vec::as_slice)
    }

    /// Nodes with no incoming edges, in document order.
    #[must_use]
    pub fn entry_nodes(&self) -> Vec<NodeId> {
        self.order
            .iter()
            .filter(|id| self.in_degree(id) == 0)
            .cloned()
            .collect()
    }

    /// Nodes with no outgoing edges, in document order.
    #[must_use]
    pub fn terminal_nodes(&self) -> Vec<NodeId> {
        self.order
            .iter()
            .filter(|id| self.successors(id).is_empty())
            .cloned()
            .collect()
    }
}

/// Runs the full structural validation of a workflow document.
///
/// Pure and idempotent: builds the graph (unique ids, reference
/// integrity) and checks acyclicity. Returns the graph so callers can
/// reuse the adjacency indices.
///
/// # Errors
///
/// Returns the first [`ValidationError`] encountered.
pub fn validate_workflow(workflow: &Workflow) -> Result<WorkflowGraph, ValidationError> {
    let graph = WorkflowGraph::build(workflow)?;
    graph.validate()?;
    Ok(graph)
}
