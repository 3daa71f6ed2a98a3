use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use flowwatch::dag::DagNode;
use flowwatch::errors::{FlowwatchError, Result};
use flowwatch::events::{Event, EventKind, EventSink};

/// A sink that keeps everything it is handed, in arrival order.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(String, Event)>>,
    dag_definitions: Mutex<Vec<(String, BTreeMap<String, DagNode>)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn flow_ids(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn dag_definitions(&self) -> Vec<(String, BTreeMap<String, DagNode>)> {
        self.dag_definitions.lock().unwrap().clone()
    }

    /// Step names of every event of `kind`, in arrival order.
    pub fn steps_with(&self, kind: EventKind) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, e)| e.kind == kind)
            .filter_map(|(_, e)| e.node().map(|n| n.name.clone()))
            .collect()
    }

    /// Job-finished and job-failed events for `step`.
    pub fn terminal_events_for(&self, step: &str) -> Vec<EventKind> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, e)| e.kind.is_terminal())
            .filter(|(_, e)| e.node().is_some_and(|n| n.name == step))
            .map(|(_, e)| e.kind)
            .collect()
    }

    /// Every workflow-progress percentage, in arrival order.
    pub fn workflow_percents(&self) -> Vec<u8> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, e)| e.workflow_percent())
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn push_event(&self, flow_id: &str, event: &Event) -> Result<()> {
        self.events
            .lock()
            .unwrap()
            .push((flow_id.to_string(), event.clone()));
        Ok(())
    }

    fn send_dag_definition(&self, flow_id: &str, nodes: &BTreeMap<String, DagNode>) -> Result<()> {
        self.dag_definitions
            .lock()
            .unwrap()
            .push((flow_id.to_string(), nodes.clone()));
        Ok(())
    }
}

/// A sink whose every call fails with an I/O error; counts attempts.
#[derive(Default)]
pub struct FailingSink {
    attempts: AtomicUsize,
}

impl FailingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn fail(&self) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(FlowwatchError::IoError(std::io::Error::other(
            "sink unavailable",
        )))
    }
}

impl EventSink for FailingSink {
    fn push_event(&self, _flow_id: &str, _event: &Event) -> Result<()> {
        self.fail()
    }

    fn send_dag_definition(&self, _flow_id: &str, _nodes: &BTreeMap<String, DagNode>) -> Result<()> {
        self.fail()
    }
}

/// A sink that takes `delay` per call and remembers the highest number of
/// calls it ever saw in flight at once.
#[derive(Default)]
pub struct SlowSink {
    delay: std::time::Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

impl SlowSink {
    pub fn new(delay: std::time::Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

impl EventSink for SlowSink {
    fn push_event(&self, _flow_id: &str, _event: &Event) -> Result<()> {
        self.enter()
    }

    fn send_dag_definition(&self, _flow_id: &str, _nodes: &BTreeMap<String, DagNode>) -> Result<()> {
        self.enter()
    }
}
