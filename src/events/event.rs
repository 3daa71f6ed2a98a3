// src/events/event.rs

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::dag::DagNode;

/// Process-wide event sequence; ids are unique and increasing.
static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    JobStarted,
    JobProgress,
    JobFinished,
    JobFailed,
    WorkflowProgress,
}

impl EventKind {
    /// Job finished or failed.
    pub fn is_terminal(self) -> bool {
        matches!(self, EventKind::JobFinished | EventKind::JobFailed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowProgress {
    /// Percent of steps started, `0..=100`.
    pub workflow_progress: u8,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    Node(Box<DagNode>),
    Workflow(WorkflowProgress),
}

/// One lifecycle event as handed to the sink.
///
/// Serializes as `{"id":1,"timestamp":..,"type":"JOB_STARTED","payload":{..}}`.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: u64,
    /// Epoch millis at creation.
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub payload: EventPayload,
}

impl Event {
    fn new(kind: EventKind, payload: EventPayload) -> Self {
        Self {
            id: NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed),
            timestamp: chrono::Utc::now().timestamp_millis(),
            kind,
            payload,
        }
    }

    fn for_node(kind: EventKind, node: &DagNode) -> Self {
        Self::new(kind, EventPayload::Node(Box::new(node.clone())))
    }

    pub fn job_started(node: &DagNode) -> Self {
        Self::for_node(EventKind::JobStarted, node)
    }

    pub fn job_progress(node: &DagNode) -> Self {
        Self::for_node(EventKind::JobProgress, node)
    }

    pub fn job_finished(node: &DagNode) -> Self {
        Self::for_node(EventKind::JobFinished, node)
    }

    pub fn job_failed(node: &DagNode) -> Self {
        Self::for_node(EventKind::JobFailed, node)
    }

    pub fn workflow_progress(percent: u8) -> Self {
        Self::new(
            EventKind::WorkflowProgress,
            EventPayload::Workflow(WorkflowProgress {
                workflow_progress: percent,
            }),
        )
    }

    /// The node carried by a job event.
    pub fn node(&self) -> Option<&DagNode> {
        match &self.payload {
            EventPayload::Node(node) => Some(node.as_ref()),
            EventPayload::Workflow(_) => None,
        }
    }

    pub fn workflow_percent(&self) -> Option<u8> {
        match &self.payload {
            EventPayload::Workflow(p) => Some(p.workflow_progress),
            EventPayload::Node(_) => None,
        }
    }
}
