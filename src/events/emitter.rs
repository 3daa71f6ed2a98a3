// src/events/emitter.rs

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{error, trace};

use crate::dag::DagNode;
use crate::events::{Event, EventSink};

/// Best-effort, at-most-once delivery of events to an [`EventSink`].
///
/// A failing sink is logged and the event dropped; nothing is buffered or
/// retried and the caller is never blocked beyond the sink call itself.
#[derive(Clone)]
pub struct EventEmitter {
    sink: Arc<dyn EventSink>,
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter").finish_non_exhaustive()
    }
}

impl EventEmitter {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Returns whether the sink accepted the event.
    pub fn emit(&self, flow_id: &str, event: Event) -> bool {
        trace!(flow_id, event_id = event.id, kind = ?event.kind, "emitting event");
        match self.sink.push_event(flow_id, &event) {
            Ok(()) => true,
            Err(err) => {
                error!(
                    flow_id,
                    event_id = event.id,
                    kind = ?event.kind,
                    error = %err,
                    "couldn't send event to sink; dropping"
                );
                false
            }
        }
    }

    pub fn emit_all(&self, flow_id: &str, events: Vec<Event>) {
        for event in events {
            self.emit(flow_id, event);
        }
    }

    pub fn emit_dag_definition(&self, flow_id: &str, nodes: &BTreeMap<String, DagNode>) -> bool {
        match self.sink.send_dag_definition(flow_id, nodes) {
            Ok(()) => true,
            Err(err) => {
                error!(flow_id, error = %err, "couldn't send dag definition to sink; dropping");
                false
            }
        }
    }
}
