// src/dag/converter.rs

//! Converts the backend's planned step graph into a [`NodeRegistry`].

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use tracing::debug;

use crate::backend::StepGraph;
use crate::dag::node::{DagNode, NodeId};
use crate::dag::registry::NodeRegistry;
use crate::errors::{FlowwatchError, Result};

/// Build one node per step vertex, mirror every edge as a node-to-node
/// link and compute each node's `dag_level`.
///
/// Fails on duplicate step names or a cyclic graph.
pub fn convert_step_graph(graph: &StepGraph) -> Result<NodeRegistry> {
    let order = toposort(graph, None).map_err(|cycle| {
        FlowwatchError::DagCycle(format!(
            "cycle detected in step graph involving step '{}'",
            graph[cycle.node_id()].name
        ))
    })?;

    let mut registry = NodeRegistry::new();
    let mut ids: HashMap<NodeIndex, NodeId> = HashMap::with_capacity(graph.node_count());

    for idx in graph.node_indices() {
        let step = &graph[idx];
        let id = registry.insert(DagNode::new(step.name.clone(), step.features.clone()))?;
        ids.insert(idx, id);
    }

    for edge in graph.edge_references() {
        registry.link(ids[&edge.source()], ids[&edge.target()]);
    }

    // Longest path from a root, relaxed in topological order.
    for idx in order {
        let id = ids[&idx];
        let level = registry.node(id).dag_level;
        let successors = registry.node(id).successors().to_vec();
        for succ in successors {
            let node = registry.node_mut(succ);
            node.dag_level = node.dag_level.max(level + 1);
        }
    }

    debug!(nodes = registry.len(), edges = graph.edge_count(), "converted step graph");
    Ok(registry)
}
