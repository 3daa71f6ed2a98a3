// src/engine/mod.rs

//! Tracking engine for flowwatch.
//!
//! This module ties together:
//! - the [`tracker`] that receives flow and step callbacks from a backend
//! - one [`poller`] task per running step, sampling it until it ends
//! - the flow-wide [`workflow`] counters behind the aggregate progress
//!
//! The backend drives the tracker synchronously from its own threads; pollers
//! run on the tokio runtime handed to [`FlowTracker::new`].

pub mod poller;
pub mod tracker;
pub mod workflow;

pub use poller::{PollerExit, run_poller};
pub use tracker::{FlowTracker, TrackerOptions};
pub use workflow::Workflow;
