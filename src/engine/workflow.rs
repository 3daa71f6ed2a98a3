// src/engine/workflow.rs

use serde::Serialize;

use crate::job::Job;

/// Flow-wide bookkeeping: step counters driving the aggregate progress and
/// the ordered list of jobs that reached a terminal state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub flow_id: String,
    /// Set to the flow id when the first job completes.
    pub version: Option<String>,
    pub jobs: Vec<Job>,
    pub total_steps: usize,
    pub started_steps: usize,
}

impl Workflow {
    pub fn new(flow_id: impl Into<String>, total_steps: usize) -> Self {
        Self {
            flow_id: flow_id.into(),
            version: None,
            jobs: Vec::new(),
            total_steps,
            started_steps: 0,
        }
    }

    /// Count one more started step. Never exceeds `total_steps`.
    pub fn record_started(&mut self) -> bool {
        if self.started_steps >= self.total_steps {
            return false;
        }
        self.started_steps += 1;
        true
    }

    /// `floor(100 * started / total)`; 0 for an empty flow.
    pub fn progress_percent(&self) -> u8 {
        if self.total_steps == 0 {
            return 0;
        }
        ((self.started_steps * 100) / self.total_steps).min(100) as u8
    }

    pub fn record_finished_job(&mut self, job: Job) {
        if self.version.is_none() {
            self.version = Some(self.flow_id.clone());
        }
        self.jobs.push(job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_floors() {
        let mut wf = Workflow::new("f", 3);
        assert_eq!(wf.progress_percent(), 0);
        wf.record_started();
        assert_eq!(wf.progress_percent(), 33);
        wf.record_started();
        assert_eq!(wf.progress_percent(), 66);
        wf.record_started();
        assert_eq!(wf.progress_percent(), 100);
    }

    #[test]
    fn started_is_capped_at_total() {
        let mut wf = Workflow::new("f", 1);
        assert!(wf.record_started());
        assert!(!wf.record_started());
        assert_eq!(wf.started_steps, 1);
        assert_eq!(wf.progress_percent(), 100);
    }

    #[test]
    fn empty_flow_reports_zero() {
        assert_eq!(Workflow::new("f", 0).progress_percent(), 0);
    }

    #[test]
    fn version_is_set_by_first_finished_job() {
        let mut wf = Workflow::new("f", 2);
        assert!(wf.version.is_none());
        wf.record_finished_job(Job::new("A"));
        wf.record_finished_job(Job::new("B"));
        assert_eq!(wf.version.as_deref(), Some("f"));
        assert_eq!(wf.jobs.len(), 2);
    }
}
