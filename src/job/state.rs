// src/job/state.rs

//! Per-node execution state machine.
//!
//! `Pending -> Running -> {Completed | Failed}`; terminal states are sticky.
//! Every transition method reports whether it changed anything so callers
//! can emit exactly one event per real transition.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::backend::StepStats;
use crate::job::mapreduce::MapReduceJobState;
use crate::types::{JobId, StepOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl From<StepOutcome> for JobState {
    fn from(outcome: StepOutcome) -> Self {
        match outcome {
            StepOutcome::Succeeded => JobState::Completed,
            StepOutcome::Failed => JobState::Failed,
        }
    }
}

/// Execution record of one DAG node.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Backend job id; unset until the step starts.
    pub id: Option<JobId>,
    pub name: String,
    pub state: JobState,
    pub percent_complete: u8,
    pub map_reduce_job_state: Option<MapReduceJobState>,
    pub configuration: BTreeMap<String, String>,
    #[serde(skip)]
    stats: Option<Arc<dyn StepStats>>,
}

impl Job {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            state: JobState::Pending,
            percent_complete: 0,
            map_reduce_job_state: None,
            configuration: BTreeMap::new(),
            stats: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn stats(&self) -> Option<&Arc<dyn StepStats>> {
        self.stats.as_ref()
    }

    /// Attach (or re-attach) the backend stats handle.
    pub fn set_stats(&mut self, stats: Arc<dyn StepStats>) {
        self.stats = Some(stats);
    }

    /// `Pending -> Running`. Returns `false` if the job already started.
    pub fn start(&mut self, id: JobId, stats: Arc<dyn StepStats>) -> bool {
        if self.state != JobState::Pending {
            debug!(job = %self.name, state = ?self.state, "start ignored; job already started");
            return false;
        }
        self.id = Some(id);
        self.stats = Some(stats);
        self.state = JobState::Running;
        true
    }

    /// Replace the progress snapshot.
    ///
    /// Returns the outcome if the snapshot moved the job into a terminal
    /// state. Terminal jobs are frozen and ignore further snapshots.
    pub fn refresh(&mut self, snapshot: MapReduceJobState) -> Option<StepOutcome> {
        if self.is_terminal() {
            return None;
        }
        let outcome = snapshot.is_complete.then(|| {
            if snapshot.is_successful {
                StepOutcome::Succeeded
            } else {
                StepOutcome::Failed
            }
        });
        self.percent_complete = snapshot.percent_complete();
        self.map_reduce_job_state = Some(snapshot);
        if self.state == JobState::Pending {
            self.state = JobState::Running;
        }
        if let Some(outcome) = outcome {
            self.state = outcome.into();
        }
        outcome
    }

    /// Move into a terminal state. Returns `false` if already terminal.
    pub fn finish(&mut self, outcome: StepOutcome) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.state = outcome.into();
        if outcome == StepOutcome::Succeeded {
            self.percent_complete = 100;
        }
        true
    }

    pub fn set_configuration(&mut self, configuration: BTreeMap<String, String>) {
        self.configuration = configuration;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::JobStatus;
    use crate::backend::sim::SimStats;

    fn snapshot(complete: bool, successful: bool) -> MapReduceJobState {
        MapReduceJobState::new(
            JobStatus {
                job_id: "job_1".to_string(),
                job_name: "A".to_string(),
                tracking_url: None,
                is_complete: complete,
                is_successful: successful,
                map_progress: 1.0,
                reduce_progress: 1.0,
                start_time: None,
            },
            &[],
            &[],
        )
    }

    fn started_job() -> Job {
        let mut job = Job::new("A");
        assert!(job.start("job_1".to_string(), Arc::new(SimStats::new("A", 1, 0))));
        job
    }

    #[test]
    fn start_is_applied_once() {
        let mut job = started_job();
        assert_eq!(job.state, JobState::Running);
        assert_eq!(job.id.as_deref(), Some("job_1"));
        assert!(job.stats().is_some());
        assert!(!job.start("job_2".to_string(), Arc::new(SimStats::new("A", 1, 0))));
        assert_eq!(job.id.as_deref(), Some("job_1"));
    }

    #[test]
    fn complete_snapshot_finishes_job() {
        let mut job = started_job();
        assert_eq!(job.refresh(snapshot(false, false)), None);
        assert_eq!(job.state, JobState::Running);

        assert_eq!(job.refresh(snapshot(true, true)), Some(StepOutcome::Succeeded));
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.percent_complete, 100);
    }

    #[test]
    fn terminal_state_is_sticky() {
        let mut job = started_job();
        assert!(job.finish(StepOutcome::Failed));
        assert!(!job.finish(StepOutcome::Succeeded));
        assert_eq!(job.refresh(snapshot(true, true)), None);
        assert_eq!(job.state, JobState::Failed);
        assert!(job.map_reduce_job_state.is_none());
    }

    #[test]
    fn unsuccessful_complete_snapshot_fails_job() {
        let mut job = started_job();
        assert_eq!(job.refresh(snapshot(true, false)), Some(StepOutcome::Failed));
        assert_eq!(job.state, JobState::Failed);
    }
}
