// src/dag/node.rs

use serde::Serialize;

use crate::job::Job;

/// Position of a node in the registry's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One step of the flow as reported to the event sink.
///
/// Edges are stored twice: as arena ids for traversal and as names for
/// serialization.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DagNode {
    pub name: String,
    pub job: Job,
    pub features: Vec<String>,
    /// Length of the longest path from any root to this node.
    pub dag_level: usize,
    pub successor_names: Vec<String>,
    pub predecessor_names: Vec<String>,
    #[serde(skip)]
    pub(crate) successors: Vec<NodeId>,
    #[serde(skip)]
    pub(crate) predecessors: Vec<NodeId>,
}

impl DagNode {
    pub fn new(name: impl Into<String>, features: Vec<String>) -> Self {
        let name = name.into();
        Self {
            job: Job::new(name.clone()),
            name,
            features,
            dag_level: 0,
            successor_names: Vec::new(),
            predecessor_names: Vec::new(),
            successors: Vec::new(),
            predecessors: Vec::new(),
        }
    }

    pub fn successors(&self) -> &[NodeId] {
        &self.successors
    }

    pub fn predecessors(&self) -> &[NodeId] {
        &self.predecessors
    }

    pub fn is_root(&self) -> bool {
        self.predecessors.is_empty()
    }
}
