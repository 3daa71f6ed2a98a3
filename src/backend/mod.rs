// src/backend/mod.rs

//! Interface of the execution backend that `flowwatch` observes.
//!
//! The backend plans a flow into a graph of steps, submits each step as a
//! map-reduce job and reports lifecycle changes through the listener traits
//! below. `flowwatch` never drives the backend; it only reads from it.
//!
//! - [`Flow`] hands out the planned [`StepGraph`] at start time.
//! - [`FlowStep`] is one planned step; its [`StepStats`] handle exposes the
//!   job id, status, task reports and configuration once the job runs.
//! - [`FlowListener`] / [`FlowStepListener`] are the callbacks the backend
//!   invokes on its own thread.
//! - [`sim`] is an in-process backend used by the binary and by tests.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use petgraph::graph::DiGraph;
use serde::Serialize;

use crate::errors::Result;
use crate::types::JobId;

pub mod sim;

/// Planned step graph: vertices are steps, edges point from a producer step
/// to the step consuming its output.
pub type StepGraph = DiGraph<StepDescriptor, ()>;

/// Plan-time description of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDescriptor {
    /// Unique step name from the backend's naming scheme.
    pub name: String,
    /// Names of the operations fused into this step (e.g. `GroupBy`).
    pub features: Vec<String>,
}

impl StepDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            features: Vec::new(),
        }
    }

    pub fn with_features(mut self, features: Vec<String>) -> Self {
        self.features = features;
        self
    }
}

/// Lifecycle phase of a single map or reduce task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPhase {
    Pending,
    Running,
    Complete,
    Failed,
    Killed,
}

/// Backend report for one map or reduce task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
    pub phase: TaskPhase,
    /// Fraction in `[0.0, 1.0]`.
    pub progress: f32,
    /// Epoch millis.
    pub start_time: Option<i64>,
    pub finish_time: Option<i64>,
}

impl TaskReport {
    pub fn pending() -> Self {
        Self {
            phase: TaskPhase::Pending,
            progress: 0.0,
            start_time: None,
            finish_time: None,
        }
    }
}

/// Job-level status read from a running job handle.
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatus {
    pub job_id: JobId,
    pub job_name: String,
    pub tracking_url: Option<String>,
    pub is_complete: bool,
    pub is_successful: bool,
    pub map_progress: f32,
    pub reduce_progress: f32,
    /// Epoch millis.
    pub start_time: Option<i64>,
}

/// Per-step statistics handle supplied with every step callback.
///
/// Accessors returning `Result` talk to the backend and may fail; callers
/// treat such failures as non-fatal and keep the previous state.
pub trait StepStats: Send + Sync + Debug {
    /// Job id assigned by the backend, `None` until the job is submitted.
    fn job_id(&self) -> Option<JobId>;

    /// Current job status, `Ok(None)` if no running job handle exists.
    fn job_status(&self) -> Result<Option<JobStatus>>;

    fn map_task_reports(&self) -> Result<Vec<TaskReport>>;

    fn reduce_task_reports(&self) -> Result<Vec<TaskReport>>;

    /// Snapshot of the job configuration key/value pairs.
    fn configuration(&self) -> Result<BTreeMap<String, String>>;

    fn is_finished(&self) -> bool;
    fn is_stopped(&self) -> bool;
    fn is_failed(&self) -> bool;
    fn is_successful(&self) -> bool;

    /// Any of the terminal predicates holds.
    fn is_terminal(&self) -> bool {
        self.is_finished() || self.is_stopped() || self.is_failed() || self.is_successful()
    }
}

/// One planned step of a flow.
pub trait FlowStep: Send + Sync + Debug {
    fn name(&self) -> &str;
    fn stats(&self) -> Arc<dyn StepStats>;
}

/// Shared handle to a step, as passed to step callbacks.
pub type StepHandle = Arc<dyn FlowStep>;

/// One execution instance of a planned flow.
pub trait Flow: Send + Sync {
    fn id(&self) -> &str;

    /// The planned step graph; `None` if the backend cannot provide it.
    fn step_graph(&self) -> Option<&StepGraph>;
}

/// Flow-level callbacks.
pub trait FlowListener: Send + Sync {
    fn on_starting(&self, flow: &dyn Flow);
    fn on_stopping(&self, flow: &dyn Flow);
    fn on_completed(&self, flow: &dyn Flow);
    /// Returns `true` if the throwable was handled and must not be rethrown.
    fn on_throwable(&self, flow: &dyn Flow, error: &anyhow::Error) -> bool;
}

/// Step-level callbacks.
pub trait FlowStepListener: Send + Sync {
    fn on_step_starting(&self, step: &StepHandle);
    fn on_step_stopping(&self, step: &StepHandle);
    fn on_step_progressing(&self, step: &StepHandle);
    fn on_step_completed(&self, step: &StepHandle);
    /// Returns `true` if the throwable was handled and must not be rethrown.
    fn on_step_throwable(&self, step: &StepHandle, error: &anyhow::Error) -> bool;
}
