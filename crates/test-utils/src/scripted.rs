//! Hand-scripted backend fakes for driving the tracker callback by callback.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use flowwatch::backend::{
    Flow, FlowStep, JobStatus, StepGraph, StepHandle, StepStats, TaskPhase, TaskReport,
};
use flowwatch::errors::{FlowwatchError, Result};
use flowwatch::types::JobId;

#[derive(Debug, Clone)]
struct Script {
    name: String,
    job_id: Option<JobId>,
    maps: Vec<TaskReport>,
    reduces: Vec<TaskReport>,
    complete: bool,
    successful: bool,
    stopped: bool,
    accessors_fail: bool,
}

/// Stats handle whose every answer is set explicitly by the test.
#[derive(Debug)]
pub struct ScriptedStats {
    script: Mutex<Script>,
}

fn report(phase: TaskPhase) -> TaskReport {
    let done = matches!(phase, TaskPhase::Complete);
    TaskReport {
        phase,
        progress: if done { 1.0 } else { 0.0 },
        start_time: None,
        finish_time: None,
    }
}

impl ScriptedStats {
    /// A submitted job with `maps` pending map tasks and no reducers.
    pub fn running(name: &str, job_id: &str, maps: usize) -> Self {
        Self {
            script: Mutex::new(Script {
                name: name.to_string(),
                job_id: Some(job_id.to_string()),
                maps: vec![report(TaskPhase::Pending); maps],
                reduces: Vec::new(),
                complete: false,
                successful: false,
                stopped: false,
                accessors_fail: false,
            }),
        }
    }

    /// A planned step the backend has not submitted yet.
    pub fn unsubmitted(name: &str) -> Self {
        let stats = Self::running(name, "", 1);
        stats.script.lock().unwrap().job_id = None;
        stats
    }

    /// Mark the first `done` map tasks complete.
    pub fn complete_maps(&self, done: usize) {
        let mut script = self.script.lock().unwrap();
        for (i, r) in script.maps.iter_mut().enumerate() {
            *r = report(if i < done {
                TaskPhase::Complete
            } else {
                TaskPhase::Running
            });
        }
    }

    /// Every task complete, job complete and successful.
    pub fn succeed(&self) {
        self.complete_maps(usize::MAX);
        let mut script = self.script.lock().unwrap();
        script.complete = true;
        script.successful = true;
    }

    /// Job complete and unsuccessful.
    pub fn fail(&self) {
        let mut script = self.script.lock().unwrap();
        script.complete = true;
        script.successful = false;
    }

    /// Stopped without ever reporting completion.
    pub fn stop(&self) {
        self.script.lock().unwrap().stopped = true;
    }

    pub fn set_accessor_failure(&self, fail: bool) {
        self.script.lock().unwrap().accessors_fail = fail;
    }

    fn checked(&self) -> Result<Script> {
        let script = self.script.lock().unwrap().clone();
        if script.accessors_fail {
            return Err(FlowwatchError::BackendError(format!(
                "scripted accessor failure for '{}'",
                script.name
            )));
        }
        Ok(script)
    }
}

fn progress(reports: &[TaskReport]) -> f32 {
    if reports.is_empty() {
        return 1.0;
    }
    reports.iter().map(|r| r.progress).sum::<f32>() / reports.len() as f32
}

impl StepStats for ScriptedStats {
    fn job_id(&self) -> Option<JobId> {
        self.script.lock().unwrap().job_id.clone()
    }

    fn job_status(&self) -> Result<Option<JobStatus>> {
        let script = self.checked()?;
        let Some(job_id) = script.job_id.clone() else {
            return Ok(None);
        };
        Ok(Some(JobStatus {
            job_id,
            job_name: script.name.clone(),
            tracking_url: None,
            is_complete: script.complete,
            is_successful: script.successful,
            map_progress: progress(&script.maps),
            reduce_progress: progress(&script.reduces),
            start_time: Some(0),
        }))
    }

    fn map_task_reports(&self) -> Result<Vec<TaskReport>> {
        Ok(self.checked()?.maps)
    }

    fn reduce_task_reports(&self) -> Result<Vec<TaskReport>> {
        Ok(self.checked()?.reduces)
    }

    fn configuration(&self) -> Result<BTreeMap<String, String>> {
        let script = self.checked()?;
        let mut conf = BTreeMap::new();
        conf.insert("mapred.job.name".to_string(), script.name);
        Ok(conf)
    }

    fn is_finished(&self) -> bool {
        self.script.lock().unwrap().complete
    }

    fn is_stopped(&self) -> bool {
        self.script.lock().unwrap().stopped
    }

    fn is_failed(&self) -> bool {
        let script = self.script.lock().unwrap();
        script.complete && !script.successful
    }

    fn is_successful(&self) -> bool {
        let script = self.script.lock().unwrap();
        script.complete && script.successful
    }
}

/// A step with a fixed name and a scripted stats handle.
#[derive(Debug)]
pub struct ScriptedStep {
    name: String,
    stats: Arc<ScriptedStats>,
}

impl ScriptedStep {
    pub fn new(name: &str, stats: ScriptedStats) -> Self {
        Self {
            name: name.to_string(),
            stats: Arc::new(stats),
        }
    }

    /// A step handle plus direct access to its script.
    pub fn handle(name: &str, stats: ScriptedStats) -> (StepHandle, Arc<ScriptedStats>) {
        let step = Arc::new(Self::new(name, stats));
        let stats = step.stats.clone();
        let handle: StepHandle = step;
        (handle, stats)
    }
}

impl FlowStep for ScriptedStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn stats(&self) -> Arc<dyn StepStats> {
        self.stats.clone()
    }
}

/// A flow that only exposes an id and an optional step graph.
pub struct ScriptedFlow {
    id: String,
    graph: Option<StepGraph>,
}

impl ScriptedFlow {
    pub fn new(id: &str, graph: StepGraph) -> Self {
        Self {
            id: id.to_string(),
            graph: Some(graph),
        }
    }

    pub fn without_graph(id: &str) -> Self {
        Self {
            id: id.to_string(),
            graph: None,
        }
    }
}

impl Flow for ScriptedFlow {
    fn id(&self) -> &str {
        &self.id
    }

    fn step_graph(&self) -> Option<&StepGraph> {
        self.graph.as_ref()
    }
}
