// src/dag/registry.rs

//! Node arena with two lookup indices.
//!
//! Step names are known at plan time and indexed once by the graph
//! converter. Job ids only appear when the backend starts a step; they are a
//! secondary index over the same arena entries, never a separate allocation.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use crate::dag::node::{DagNode, NodeId};
use crate::errors::{FlowwatchError, Result};
use crate::types::JobId;

#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    nodes: Vec<DagNode>,
    by_name: BTreeMap<String, NodeId>,
    by_job_id: HashMap<JobId, NodeId>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the arena and the name index.
    pub(crate) fn insert(&mut self, node: DagNode) -> Result<NodeId> {
        if self.by_name.contains_key(&node.name) {
            return Err(FlowwatchError::BackendError(format!(
                "duplicate step name '{}' in step graph",
                node.name
            )));
        }
        let id = NodeId(self.nodes.len());
        self.by_name.insert(node.name.clone(), id);
        self.nodes.push(node);
        Ok(id)
    }

    /// Record a `from -> to` edge on both endpoints.
    pub(crate) fn link(&mut self, from: NodeId, to: NodeId) {
        let to_name = self.nodes[to.0].name.clone();
        let from_name = self.nodes[from.0].name.clone();

        let source = &mut self.nodes[from.0];
        if !source.successors.contains(&to) {
            source.successors.push(to);
            source.successor_names.push(to_name);
        }
        let target = &mut self.nodes[to.0];
        if !target.predecessors.contains(&from) {
            target.predecessors.push(from);
            target.predecessor_names.push(from_name);
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &DagNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut DagNode {
        &mut self.nodes[id.0]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &DagNode> {
        self.nodes.iter()
    }

    pub fn id_of_name(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    pub fn id_of_job(&self, job_id: &str) -> Option<NodeId> {
        self.by_job_id.get(job_id).copied()
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<&DagNode> {
        self.id_of_name(name).map(|id| self.node(id))
    }

    pub fn lookup_by_id(&self, job_id: &str) -> Option<&DagNode> {
        self.id_of_job(job_id).map(|id| self.node(id))
    }

    /// Bind a backend job id to the node named `name`.
    ///
    /// Repeating the same binding is a no-op. Unknown names yield
    /// [`FlowwatchError::StepNotFound`].
    pub fn register_id(&mut self, name: &str, job_id: &str) -> Result<NodeId> {
        let node_id = self
            .id_of_name(name)
            .ok_or_else(|| FlowwatchError::StepNotFound(name.to_string()))?;

        match self.by_job_id.get(job_id) {
            Some(&existing) if existing == node_id => {
                debug!(step = %name, job_id, "job id already registered");
            }
            Some(&existing) => {
                warn!(
                    step = %name,
                    job_id,
                    previous_step = %self.nodes[existing.0].name,
                    "job id re-bound to a different step"
                );
                self.by_job_id.insert(job_id.to_string(), node_id);
            }
            None => {
                self.by_job_id.insert(job_id.to_string(), node_id);
            }
        }
        Ok(node_id)
    }

    /// Snapshot of every node keyed by step name, as sent in the DAG
    /// definition event.
    pub fn nodes_by_name(&self) -> BTreeMap<String, DagNode> {
        self.by_name
            .iter()
            .map(|(name, id)| (name.clone(), self.nodes[id.0].clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(names: &[&str]) -> NodeRegistry {
        let mut reg = NodeRegistry::new();
        for name in names {
            reg.insert(DagNode::new(*name, Vec::new())).unwrap();
        }
        reg
    }

    #[test]
    fn register_id_bridges_both_indices() {
        let mut reg = registry_with(&["A", "B"]);
        let id = reg.register_id("B", "job_7").unwrap();

        assert_eq!(reg.id_of_name("B"), Some(id));
        assert_eq!(reg.lookup_by_id("job_7").map(|n| n.name.as_str()), Some("B"));
        assert!(reg.lookup_by_id("job_8").is_none());
    }

    #[test]
    fn register_id_is_idempotent() {
        let mut reg = registry_with(&["A"]);
        let first = reg.register_id("A", "job_1").unwrap();
        let second = reg.register_id("A", "job_1").unwrap();
        assert_eq!(first, second);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn register_id_rejects_unknown_name() {
        let mut reg = registry_with(&["A"]);
        let err = reg.register_id("Z", "job_1").unwrap_err();
        assert!(matches!(err, FlowwatchError::StepNotFound(name) if name == "Z"));
        assert!(reg.lookup_by_id("job_1").is_none());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut reg = registry_with(&["A"]);
        assert!(reg.insert(DagNode::new("A", Vec::new())).is_err());
    }

    #[test]
    fn link_records_names_and_ids() {
        let mut reg = registry_with(&["A", "B"]);
        let a = reg.id_of_name("A").unwrap();
        let b = reg.id_of_name("B").unwrap();
        reg.link(a, b);
        reg.link(a, b);

        assert_eq!(reg.node(a).successor_names, vec!["B".to_string()]);
        assert_eq!(reg.node(b).predecessors(), &[a]);
        assert!(reg.node(a).is_root());
        assert!(!reg.node(b).is_root());
    }
}
