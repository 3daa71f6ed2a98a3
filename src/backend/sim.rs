// src/backend/sim.rs

//! In-process simulated execution backend.
//!
//! Runs a flow described by a [`ConfigFile`] on the calling thread: steps are
//! executed one after another in topological order, each step's map tasks and
//! then reduce tasks complete one per `tick_ms`, and the listener callbacks are
//! invoked exactly where a real backend would invoke them. A step configured
//! with `fail = true` fails halfway through its tasks; its dependents are
//! skipped.
//!
//! [`SimStats`] is also usable on its own as a hand-driven stats handle.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use anyhow::anyhow;
use petgraph::algo::toposort;
use petgraph::graph::NodeIndex;
use tracing::{debug, info};

use crate::backend::{
    Flow, FlowListener, FlowStep, FlowStepListener, JobStatus, StepDescriptor, StepGraph,
    StepHandle, StepStats, TaskPhase, TaskReport,
};
use crate::config::ConfigFile;
use crate::errors::{FlowwatchError, Result};
use crate::types::JobId;

/// Backend-side phase of a simulated job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimPhase {
    Planned,
    Running,
    Succeeded,
    Failed,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Map,
    Reduce,
}

#[derive(Debug, Clone)]
struct SimState {
    job_id: Option<JobId>,
    phase: SimPhase,
    map: Vec<TaskReport>,
    reduce: Vec<TaskReport>,
    start_time: Option<i64>,
    configuration: BTreeMap<String, String>,
    accessors_fail: bool,
}

/// Hand-drivable stats handle for one simulated job.
#[derive(Debug)]
pub struct SimStats {
    name: String,
    state: Mutex<SimState>,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn progress_of(reports: &[TaskReport]) -> f32 {
    if reports.is_empty() {
        return 1.0;
    }
    let sum: f32 = reports.iter().map(|r| r.progress).sum();
    sum / reports.len() as f32
}

impl SimStats {
    pub fn new(name: impl Into<String>, map_tasks: usize, reduce_tasks: usize) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(SimState {
                job_id: None,
                phase: SimPhase::Planned,
                map: vec![TaskReport::pending(); map_tasks],
                reduce: vec![TaskReport::pending(); reduce_tasks],
                start_time: None,
                configuration: BTreeMap::new(),
                accessors_fail: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Assign a job id and move the job to `Running`.
    pub fn submit(&self, job_id: impl Into<JobId>) {
        let job_id = job_id.into();
        let mut state = self.lock();
        let map_tasks = state.map.len().to_string();
        let reduce_tasks = state.reduce.len().to_string();
        let conf = &mut state.configuration;
        conf.insert("mapred.job.id".to_string(), job_id.clone());
        conf.insert("mapred.job.name".to_string(), self.name.clone());
        conf.insert("mapred.map.tasks".to_string(), map_tasks);
        conf.insert("mapred.reduce.tasks".to_string(), reduce_tasks);
        state.job_id = Some(job_id);
        state.phase = SimPhase::Running;
        state.start_time = Some(now_millis());
    }

    pub fn start_task(&self, kind: TaskKind, index: usize) {
        self.update_task(kind, index, TaskPhase::Running, 0.5);
    }

    pub fn complete_task(&self, kind: TaskKind, index: usize) {
        self.update_task(kind, index, TaskPhase::Complete, 1.0);
    }

    pub fn fail_task(&self, kind: TaskKind, index: usize) {
        self.update_task(kind, index, TaskPhase::Failed, 0.0);
    }

    fn update_task(&self, kind: TaskKind, index: usize, phase: TaskPhase, progress: f32) {
        let mut state = self.lock();
        let reports = match kind {
            TaskKind::Map => &mut state.map,
            TaskKind::Reduce => &mut state.reduce,
        };
        if let Some(report) = reports.get_mut(index) {
            let now = now_millis();
            report.phase = phase;
            report.progress = progress;
            report.start_time.get_or_insert(now);
            if matches!(phase, TaskPhase::Complete | TaskPhase::Failed | TaskPhase::Killed) {
                report.finish_time = Some(now);
            }
        }
    }

    /// Complete every task and mark the job successful.
    pub fn complete_all(&self) {
        {
            let mut guard = self.lock();
            let state = &mut *guard;
            let now = now_millis();
            for report in state.map.iter_mut().chain(state.reduce.iter_mut()) {
                report.phase = TaskPhase::Complete;
                report.progress = 1.0;
                report.start_time.get_or_insert(now);
                report.finish_time = Some(now);
            }
        }
        self.finish(SimPhase::Succeeded);
    }

    pub fn finish(&self, phase: SimPhase) {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.phase = phase;
        if phase == SimPhase::Stopped {
            for report in state.map.iter_mut().chain(state.reduce.iter_mut()) {
                if matches!(report.phase, TaskPhase::Pending | TaskPhase::Running) {
                    report.phase = TaskPhase::Killed;
                }
            }
        }
    }

    /// Make every fallible accessor return a backend error.
    pub fn set_accessor_failure(&self, fail: bool) {
        self.lock().accessors_fail = fail;
    }

    pub fn phase(&self) -> SimPhase {
        self.lock().phase
    }

    fn check_accessors(&self, state: &SimState) -> Result<()> {
        if state.accessors_fail {
            return Err(FlowwatchError::BackendError(format!(
                "task reports unavailable for step '{}'",
                self.name
            )));
        }
        Ok(())
    }
}

impl StepStats for SimStats {
    fn job_id(&self) -> Option<JobId> {
        self.lock().job_id.clone()
    }

    fn job_status(&self) -> Result<Option<JobStatus>> {
        let state = self.lock();
        self.check_accessors(&state)?;
        let Some(job_id) = state.job_id.clone() else {
            return Ok(None);
        };
        Ok(Some(JobStatus {
            tracking_url: Some(format!("http://jobtracker.local/jobdetails?jobid={job_id}")),
            job_id,
            job_name: self.name.clone(),
            is_complete: matches!(
                state.phase,
                SimPhase::Succeeded | SimPhase::Failed | SimPhase::Stopped
            ),
            is_successful: state.phase == SimPhase::Succeeded,
            map_progress: progress_of(&state.map),
            reduce_progress: progress_of(&state.reduce),
            start_time: state.start_time,
        }))
    }

    fn map_task_reports(&self) -> Result<Vec<TaskReport>> {
        let state = self.lock();
        self.check_accessors(&state)?;
        Ok(state.map.clone())
    }

    fn reduce_task_reports(&self) -> Result<Vec<TaskReport>> {
        let state = self.lock();
        self.check_accessors(&state)?;
        Ok(state.reduce.clone())
    }

    fn configuration(&self) -> Result<BTreeMap<String, String>> {
        let state = self.lock();
        self.check_accessors(&state)?;
        Ok(state.configuration.clone())
    }

    fn is_finished(&self) -> bool {
        matches!(
            self.phase(),
            SimPhase::Succeeded | SimPhase::Failed | SimPhase::Stopped
        )
    }

    fn is_stopped(&self) -> bool {
        self.phase() == SimPhase::Stopped
    }

    fn is_failed(&self) -> bool {
        self.phase() == SimPhase::Failed
    }

    fn is_successful(&self) -> bool {
        self.phase() == SimPhase::Succeeded
    }
}

/// A simulated step: a name plus its [`SimStats`].
#[derive(Debug)]
pub struct SimStep {
    name: String,
    stats: Arc<SimStats>,
}

impl SimStep {
    pub fn new(name: impl Into<String>, map_tasks: usize, reduce_tasks: usize) -> Self {
        let name = name.into();
        let stats = Arc::new(SimStats::new(name.clone(), map_tasks, reduce_tasks));
        Self { name, stats }
    }

    pub fn sim_stats(&self) -> &Arc<SimStats> {
        &self.stats
    }
}

impl FlowStep for SimStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn stats(&self) -> Arc<dyn StepStats> {
        self.stats.clone()
    }
}

#[derive(Debug)]
struct StepPlan {
    step: Arc<SimStep>,
    after: Vec<String>,
    map_tasks: usize,
    reduce_tasks: usize,
    tick: Duration,
    fail: bool,
}

/// Which steps ended how after [`SimFlow::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimRunSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    pub skipped: Vec<String>,
}

/// A simulated flow instance built from configuration.
#[derive(Debug)]
pub struct SimFlow {
    id: String,
    graph: Option<StepGraph>,
    plans: Vec<StepPlan>,
}

impl SimFlow {
    /// Plan the configured steps into a step graph and a topological
    /// execution order.
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        let mut graph = StepGraph::new();
        let mut indices: HashMap<&str, NodeIndex> = HashMap::new();

        for (name, step) in cfg.step.iter() {
            let descriptor =
                StepDescriptor::new(name.clone()).with_features(step.features.clone());
            indices.insert(name.as_str(), graph.add_node(descriptor));
        }

        for (name, step) in cfg.step.iter() {
            for dep in step.after.iter() {
                match (indices.get(dep.as_str()), indices.get(name.as_str())) {
                    (Some(&from), Some(&to)) => {
                        graph.add_edge(from, to, ());
                    }
                    _ => return Err(FlowwatchError::StepNotFound(dep.clone())),
                }
            }
        }

        let order = toposort(&graph, None).map_err(|cycle| {
            FlowwatchError::DagCycle(format!(
                "cycle detected in step graph involving step '{}'",
                graph[cycle.node_id()].name
            ))
        })?;

        let mut plans = Vec::with_capacity(order.len());
        for idx in order {
            let name = &graph[idx].name;
            let step_cfg = cfg
                .step
                .get(name)
                .ok_or_else(|| FlowwatchError::StepNotFound(name.clone()))?;
            plans.push(StepPlan {
                step: Arc::new(SimStep::new(
                    name.clone(),
                    step_cfg.map_tasks,
                    step_cfg.reduce_tasks,
                )),
                after: step_cfg.after.clone(),
                map_tasks: step_cfg.map_tasks,
                reduce_tasks: step_cfg.reduce_tasks,
                tick: Duration::from_millis(step_cfg.tick_ms),
                fail: step_cfg.fail,
            });
        }

        Ok(Self {
            id: cfg.flow.id.clone(),
            graph: Some(graph),
            plans,
        })
    }

    /// Drop the step graph, as a backend that cannot expose its plan would.
    pub fn without_graph(mut self) -> Self {
        self.graph = None;
        self
    }

    pub fn step(&self, name: &str) -> Option<&Arc<SimStep>> {
        self.plans
            .iter()
            .map(|p| &p.step)
            .find(|s| s.name == name)
    }

    /// Execute the flow on the current thread, invoking `listener` the way
    /// the real backend does. Blocks until every step ran or was skipped.
    pub fn run<L>(&self, listener: &L) -> SimRunSummary
    where
        L: FlowListener + FlowStepListener,
    {
        info!(flow_id = %self.id, steps = self.plans.len(), "simulated flow starting");
        listener.on_starting(self);

        let mut summary = SimRunSummary::default();
        let mut succeeded: HashSet<&str> = HashSet::new();

        for (seq, plan) in self.plans.iter().enumerate() {
            let name = plan.step.name.as_str();
            if plan.after.iter().any(|dep| !succeeded.contains(dep.as_str())) {
                debug!(step = %name, "upstream step did not succeed; skipping");
                summary.skipped.push(name.to_string());
                continue;
            }

            let handle: StepHandle = plan.step.clone();
            let stats = plan.step.sim_stats();
            stats.submit(format!("job_{}_{:04}", self.id, seq + 1));
            listener.on_step_starting(&handle);

            match self.run_tasks(plan, &handle, listener) {
                Ok(()) => {
                    stats.finish(SimPhase::Succeeded);
                    listener.on_step_completed(&handle);
                    succeeded.insert(name);
                    summary.succeeded.push(name.to_string());
                }
                Err(err) => {
                    stats.finish(SimPhase::Failed);
                    let handled = listener.on_step_throwable(&handle, &err);
                    listener.on_step_stopping(&handle);
                    if !handled {
                        listener.on_throwable(self, &err);
                    }
                    summary.failed.push(name.to_string());
                }
            }
        }

        listener.on_completed(self);
        info!(
            flow_id = %self.id,
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            skipped = summary.skipped.len(),
            "simulated flow completed"
        );
        summary
    }

    fn run_tasks<L>(&self, plan: &StepPlan, handle: &StepHandle, listener: &L) -> anyhow::Result<()>
    where
        L: FlowStepListener,
    {
        let stats = plan.step.sim_stats();
        let tasks = (0..plan.map_tasks)
            .map(|i| (TaskKind::Map, i))
            .chain((0..plan.reduce_tasks).map(|i| (TaskKind::Reduce, i)));
        let fail_at = plan
            .fail
            .then(|| (plan.map_tasks + plan.reduce_tasks) / 2);

        for (pos, (kind, index)) in tasks.enumerate() {
            stats.start_task(kind, index);
            thread::sleep(plan.tick);

            if fail_at == Some(pos) {
                stats.fail_task(kind, index);
                return Err(anyhow!(
                    "step '{}' failed: {:?} task #{} exited with an error",
                    plan.step.name,
                    kind,
                    index
                ));
            }

            stats.complete_task(kind, index);
            listener.on_step_progressing(handle);
        }
        Ok(())
    }
}

impl Flow for SimFlow {
    fn id(&self) -> &str {
        &self.id
    }

    fn step_graph(&self) -> Option<&StepGraph> {
        self.graph.as_ref()
    }
}
