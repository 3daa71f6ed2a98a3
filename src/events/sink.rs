// src/events/sink.rs

//! Event sink abstraction plus the two sinks the binary can be configured
//! with.
//!
//! Tests provide their own recording sinks via `flowwatch-test-utils`.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use serde::Serialize;
use tracing::info;

use crate::dag::DagNode;
use crate::errors::{FlowwatchError, Result};
use crate::events::Event;

/// Destination of lifecycle events, keyed by flow id.
///
/// Both calls may fail with an I/O error; callers log and drop.
///
/// The tracker calls into the sink while holding its state lock. That keeps
/// calls for a flow serialized and in event order, but it also means a slow
/// sink holds up the backend's callback thread and every poller until it
/// returns. Implementations should return quickly and hand anything slow
/// (network sends, unbuffered files) off to their own thread or channel.
/// They must not call back into the tracker.
pub trait EventSink: Send + Sync {
    fn push_event(&self, flow_id: &str, event: &Event) -> Result<()>;

    fn send_dag_definition(&self, flow_id: &str, nodes: &BTreeMap<String, DagNode>) -> Result<()>;
}

/// Writes each event as a structured `tracing` record.
#[derive(Debug, Clone, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn push_event(&self, flow_id: &str, event: &Event) -> Result<()> {
        match (event.node(), event.workflow_percent()) {
            (Some(node), _) => info!(
                flow_id,
                event_id = event.id,
                kind = ?event.kind,
                step = %node.name,
                job_id = node.job.id.as_deref().unwrap_or("-"),
                state = ?node.job.state,
                percent = node.job.percent_complete,
                "job event"
            ),
            (None, Some(percent)) => info!(
                flow_id,
                event_id = event.id,
                percent,
                "workflow progress"
            ),
            (None, None) => {}
        }
        Ok(())
    }

    fn send_dag_definition(&self, flow_id: &str, nodes: &BTreeMap<String, DagNode>) -> Result<()> {
        for node in nodes.values() {
            info!(
                flow_id,
                step = %node.name,
                level = node.dag_level,
                successors = ?node.successor_names,
                "dag node"
            );
        }
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
enum JsonLine<'a> {
    Event {
        flow_id: &'a str,
        event: &'a Event,
    },
    DagDefinition {
        flow_id: &'a str,
        nodes: &'a BTreeMap<String, DagNode>,
    },
}

/// Writes one JSON object per line to any writer.
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    fn write_line(&self, line: &JsonLine<'_>) -> Result<()> {
        let mut bytes = serde_json::to_vec(line)?;
        bytes.push(b'\n');
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| FlowwatchError::IoError(io::Error::other("sink writer poisoned")))?;
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }
}

impl JsonLinesSink<BufWriter<File>> {
    /// Create (or truncate) `path` and write events to it.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl JsonLinesSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    fn push_event(&self, flow_id: &str, event: &Event) -> Result<()> {
        self.write_line(&JsonLine::Event { flow_id, event })
    }

    fn send_dag_definition(&self, flow_id: &str, nodes: &BTreeMap<String, DagNode>) -> Result<()> {
        self.write_line(&JsonLine::DagDefinition { flow_id, nodes })
    }
}
