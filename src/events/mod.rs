// src/events/mod.rs

//! Lifecycle events and their delivery.
//!
//! - [`event`] defines the event kinds and payloads.
//! - [`sink`] defines the external sink interface and built-in sinks.
//! - [`emitter`] forwards events to a sink, logging and dropping failures.

pub mod emitter;
pub mod event;
pub mod sink;

pub use emitter::EventEmitter;
pub use event::{Event, EventKind, EventPayload, WorkflowProgress};
pub use sink::{EventSink, JsonLinesSink, LogSink};
