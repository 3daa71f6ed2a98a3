// src/job/mapreduce.rs

//! Immutable snapshot of a map-reduce job's task-level progress.

use serde::Serialize;

use crate::backend::{JobStatus, StepStats, TaskPhase, TaskReport};
use crate::errors::Result;
use crate::types::JobId;

/// Per-phase task counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCounts {
    pub total: usize,
    pub finished: usize,
    pub running: usize,
    pub failed: usize,
    pub killed: usize,
}

impl TaskCounts {
    pub fn from_reports(reports: &[TaskReport]) -> Self {
        let mut counts = TaskCounts {
            total: reports.len(),
            ..TaskCounts::default()
        };
        for report in reports {
            match report.phase {
                TaskPhase::Complete => counts.finished += 1,
                TaskPhase::Running => counts.running += 1,
                TaskPhase::Failed => counts.failed += 1,
                TaskPhase::Killed => counts.killed += 1,
                TaskPhase::Pending => {}
            }
        }
        counts
    }
}

/// Progress of one job at one point in time.
///
/// Replaced wholesale on every refresh; never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapReduceJobState {
    pub job_id: JobId,
    pub job_name: String,
    pub tracking_url: Option<String>,
    pub is_complete: bool,
    pub is_successful: bool,
    pub map_progress: f32,
    pub reduce_progress: f32,
    pub mappers: TaskCounts,
    pub reducers: TaskCounts,
    pub job_start_time: Option<i64>,
    /// Latest start or finish time seen across all task reports.
    pub job_last_update_time: Option<i64>,
}

impl MapReduceJobState {
    pub fn new(status: JobStatus, map_reports: &[TaskReport], reduce_reports: &[TaskReport]) -> Self {
        let job_last_update_time = map_reports
            .iter()
            .chain(reduce_reports.iter())
            .flat_map(|r| [r.start_time, r.finish_time])
            .flatten()
            .max();

        Self {
            job_id: status.job_id,
            job_name: status.job_name,
            tracking_url: status.tracking_url,
            is_complete: status.is_complete,
            is_successful: status.is_successful,
            map_progress: status.map_progress,
            reduce_progress: status.reduce_progress,
            mappers: TaskCounts::from_reports(map_reports),
            reducers: TaskCounts::from_reports(reduce_reports),
            job_start_time: status.start_time,
            job_last_update_time,
        }
    }

    /// Sample a fresh snapshot from a stats handle.
    ///
    /// `Ok(None)` means the backend has no running job handle yet.
    pub fn sample(stats: &dyn StepStats) -> Result<Option<Self>> {
        let Some(status) = stats.job_status()? else {
            return Ok(None);
        };
        let map_reports = stats.map_task_reports()?;
        let reduce_reports = stats.reduce_task_reports()?;
        Ok(Some(Self::new(status, &map_reports, &reduce_reports)))
    }

    pub fn total_tasks(&self) -> usize {
        self.mappers.total + self.reducers.total
    }

    pub fn completed_tasks(&self) -> usize {
        self.mappers.finished + self.reducers.finished
    }

    /// Integer percent of finished tasks. A complete job is always 100.
    pub fn percent_complete(&self) -> u8 {
        if self.is_complete && self.is_successful {
            return 100;
        }
        let total = self.total_tasks();
        if total == 0 {
            return 0;
        }
        ((self.completed_tasks() * 100) / total).min(100) as u8
    }
}
