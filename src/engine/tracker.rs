// src/engine/tracker.rs

//! Flow tracker: the listener the execution backend calls into.
//!
//! All state of the tracked flow sits behind a single mutex: the node
//! registry, the workflow counters and the completed set. Every callback and
//! every poller sample takes the lock once to apply its observation and emit
//! the resulting events, so "check completed, then mark" is one atomic step
//! and events of one flow leave in the order their observations were applied.
//! Backend accessors are called before taking the lock.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::backend::{Flow, FlowListener, FlowStepListener, StepHandle, StepStats};
use crate::config::TrackerSection;
use crate::dag::{DagNode, NodeId, NodeRegistry, convert_step_graph};
use crate::engine::poller::{PollerExit, run_poller};
use crate::engine::workflow::Workflow;
use crate::events::{Event, EventEmitter, EventSink};
use crate::job::MapReduceJobState;
use crate::types::{JobId, StepOutcome};

/// Tracker knobs.
#[derive(Debug, Clone, Copy)]
pub struct TrackerOptions {
    pub poll_interval: Duration,
    pub cancel_pollers_on_completion: bool,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            cancel_pollers_on_completion: true,
        }
    }
}

impl From<&TrackerSection> for TrackerOptions {
    fn from(section: &TrackerSection) -> Self {
        Self {
            poll_interval: section.poll_interval(),
            cancel_pollers_on_completion: section.cancel_pollers_on_completion,
        }
    }
}

/// State of the flow currently being tracked.
struct FlowState {
    flow_id: String,
    registry: NodeRegistry,
    workflow: Workflow,
    /// Job ids whose completing progress event has been emitted.
    completed: HashSet<JobId>,
    cancel: CancellationToken,
}

struct Shared {
    state: Mutex<Option<FlowState>>,
    /// Poller handles keyed by job id.
    pollers: Mutex<HashMap<JobId, JoinHandle<PollerExit>>>,
    emitter: EventEmitter,
    options: TrackerOptions,
    runtime: Handle,
}

/// Observes one flow at a time and reports its lifecycle to an
/// [`EventSink`]. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct FlowTracker {
    shared: Arc<Shared>,
}

impl fmt::Debug for FlowTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowTracker")
            .field("options", &self.shared.options)
            .finish_non_exhaustive()
    }
}

/// Sampled backend state, read outside the lock.
struct Sample {
    snapshot: MapReduceJobState,
    configuration: BTreeMap<String, String>,
}

fn configuration_of(stats: &dyn StepStats, step: &str) -> Option<BTreeMap<String, String>> {
    match stats.configuration() {
        Ok(configuration) => Some(configuration),
        Err(err) => {
            error!(step, error = %err, "error getting job configuration");
            None
        }
    }
}

fn sample_step(stats: &dyn StepStats, step: &str, job_id: &str) -> Option<Sample> {
    let snapshot = match MapReduceJobState::sample(stats) {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => {
            warn!(step, job_id, "couldn't find job status");
            return None;
        }
        Err(err) => {
            error!(step, job_id, error = %err, "error getting job info");
            return None;
        }
    };
    configuration_of(stats, step).map(|configuration| Sample {
        snapshot,
        configuration,
    })
}

impl FlowState {
    /// Record a terminal transition that just happened on `node_id` and
    /// build its event. Callers must only invoke this when the job's state
    /// machine reported the transition.
    fn conclude(&mut self, node_id: NodeId, outcome: StepOutcome) -> Event {
        let node = self.registry.node(node_id);
        self.workflow.record_finished_job(node.job.clone());
        match outcome {
            StepOutcome::Succeeded => Event::job_finished(node),
            StepOutcome::Failed => Event::job_failed(node),
        }
    }

    /// Apply a terminal callback. Returns the terminal event, or `None` if
    /// the job was already terminal.
    fn finish(
        &mut self,
        node_id: NodeId,
        outcome: StepOutcome,
        configuration: Option<BTreeMap<String, String>>,
        stats: Arc<dyn StepStats>,
    ) -> Option<Event> {
        let job = &mut self.registry.node_mut(node_id).job;
        job.set_stats(stats);
        if !job.finish(outcome) {
            debug!(
                job = %job.name,
                state = ?job.state,
                "job already terminal; duplicate terminal observation dropped"
            );
            return None;
        }
        if let Some(configuration) = configuration {
            job.set_configuration(configuration);
        }
        Some(self.conclude(node_id, outcome))
    }
}

impl FlowTracker {
    pub fn new(sink: Arc<dyn EventSink>, options: TrackerOptions, runtime: Handle) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(None),
                pollers: Mutex::new(HashMap::new()),
                emitter: EventEmitter::new(sink),
                options,
                runtime,
            }),
        }
    }

    pub fn options(&self) -> TrackerOptions {
        self.shared.options
    }

    fn lock_state(&self) -> MutexGuard<'_, Option<FlowState>> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_pollers(&self) -> MutexGuard<'_, HashMap<JobId, JoinHandle<PollerExit>>> {
        self.shared.pollers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, flow_id: &str, events: Vec<Event>) {
        self.shared.emitter.emit_all(flow_id, events);
    }

    /// Whether a flow is currently tracked.
    pub fn is_tracking(&self) -> bool {
        self.lock_state().is_some()
    }

    pub fn flow_id(&self) -> Option<String> {
        self.lock_state().as_ref().map(|f| f.flow_id.clone())
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<DagNode> {
        self.lock_state()
            .as_ref()
            .and_then(|f| f.registry.lookup_by_name(name).cloned())
    }

    pub fn lookup_by_id(&self, job_id: &str) -> Option<DagNode> {
        self.lock_state()
            .as_ref()
            .and_then(|f| f.registry.lookup_by_id(job_id).cloned())
    }

    pub fn node_count(&self) -> usize {
        self.lock_state().as_ref().map_or(0, |f| f.registry.len())
    }

    pub fn workflow(&self) -> Option<Workflow> {
        self.lock_state().as_ref().map(|f| f.workflow.clone())
    }

    pub fn completed_job_ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self
            .lock_state()
            .as_ref()
            .map(|f| f.completed.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Number of pollers still running.
    pub fn active_pollers(&self) -> usize {
        self.lock_pollers()
            .values()
            .filter(|h| !h.is_finished())
            .count()
    }

    /// Wait for every spawned poller to exit.
    pub async fn join_pollers(&self) {
        let handles: Vec<(JobId, JoinHandle<PollerExit>)> =
            self.lock_pollers().drain().collect();
        for (job_id, handle) in handles {
            match handle.await {
                Ok(exit) => debug!(job_id = %job_id, ?exit, "poller joined"),
                Err(err) => error!(job_id = %job_id, error = %err, "poller task failed"),
            }
        }
    }

    /// Cancel all pollers of the current flow and wait for them.
    pub async fn shutdown(&self) {
        self.cancel_pollers();
        self.join_pollers().await;
    }

    fn cancel_pollers(&self) {
        if let Some(flow) = self.lock_state().as_ref() {
            flow.cancel.cancel();
        }
    }

    fn spawn_poller(&self, step: &StepHandle, job_id: JobId, cancel: CancellationToken) {
        let mut pollers = self.lock_pollers();
        // Finished pollers are dropped here; their exit was already logged.
        pollers.retain(|_, handle| !handle.is_finished());
        if pollers.contains_key(&job_id) {
            debug!(step = %step.name(), job_id = %job_id, "poller already running; not spawning another");
            return;
        }

        let handle = self.shared.runtime.spawn(run_poller(
            self.clone(),
            step.clone(),
            self.shared.options.poll_interval,
            cancel,
        ));
        pollers.insert(job_id, handle);
    }

    /// Refresh a running step from a fresh backend sample.
    ///
    /// Shared by the step-progressing callback and the pollers. Emits a
    /// workflow-progress event followed by a job-progress event, plus the
    /// terminal event if the sample completed the job. Nothing is emitted
    /// for unknown job ids or for jobs already in the completed set.
    pub fn refresh_step(&self, step: &StepHandle) {
        let name = step.name();
        let stats = step.stats();
        let Some(job_id) = stats.job_id() else {
            warn!(step = %name, "progress reported for step without a job id");
            return;
        };

        {
            let guard = self.lock_state();
            let Some(flow) = guard.as_ref() else {
                trace!(step = %name, "not tracking a flow; ignoring progress");
                return;
            };
            if flow.registry.id_of_job(&job_id).is_none() {
                warn!(step = %name, job_id = %job_id, "unrecognized job id reported for progress");
                return;
            }
            if flow.completed.contains(&job_id) {
                trace!(step = %name, job_id = %job_id, "job already completed; progress swallowed");
                return;
            }
        }

        let Some(sample) = sample_step(stats.as_ref(), name, &job_id) else {
            return;
        };

        let mut guard = self.lock_state();
        let Some(flow) = guard.as_mut() else {
            return;
        };
        let Some(node_id) = flow.registry.id_of_job(&job_id) else {
            return;
        };
        if flow.completed.contains(&job_id) {
            trace!(step = %name, job_id = %job_id, "job completed concurrently; progress swallowed");
            return;
        }

        let job = &mut flow.registry.node_mut(node_id).job;
        if job.is_terminal() {
            // Finished through a callback before any completing sample.
            flow.completed.insert(job_id.clone());
            trace!(step = %name, job_id = %job_id, state = ?job.state, "job terminal; progress swallowed");
            return;
        }

        job.set_configuration(sample.configuration);
        let outcome = job.refresh(sample.snapshot);
        let complete = job
            .map_reduce_job_state
            .as_ref()
            .is_some_and(|s| s.is_complete);

        let mut events = vec![
            Event::workflow_progress(flow.workflow.progress_percent()),
            Event::job_progress(flow.registry.node(node_id)),
        ];

        if complete && flow.completed.insert(job_id.clone()) {
            debug!(step = %name, job_id = %job_id, "job reported completion");
        }
        if let Some(outcome) = outcome {
            events.push(flow.conclude(node_id, outcome));
        }

        let flow_id = flow.flow_id.clone();
        self.emit(&flow_id, events);
    }
}

impl FlowListener for FlowTracker {
    fn on_starting(&self, flow: &dyn Flow) {
        let flow_id = flow.id().to_string();

        let mut guard = self.lock_state();
        if let Some(previous) = guard.take() {
            debug!(flow_id = %previous.flow_id, "replacing previously tracked flow");
            previous.cancel.cancel();
        }

        let Some(graph) = flow.step_graph() else {
            error!(flow_id = %flow_id, "step graph unavailable; flow will not be tracked");
            return;
        };
        let registry = match convert_step_graph(graph) {
            Ok(registry) => registry,
            Err(err) => {
                error!(flow_id = %flow_id, error = %err, "couldn't convert step graph; flow will not be tracked");
                return;
            }
        };

        let total = registry.len();
        let nodes = registry.nodes_by_name();
        *guard = Some(FlowState {
            flow_id: flow_id.clone(),
            registry,
            workflow: Workflow::new(flow_id.clone(), total),
            completed: HashSet::new(),
            cancel: CancellationToken::new(),
        });

        info!(flow_id = %flow_id, steps = total, "tracking flow");
        self.shared.emitter.emit_dag_definition(&flow_id, &nodes);
    }

    fn on_stopping(&self, flow: &dyn Flow) {
        info!(flow_id = %flow.id(), "flow stopping");
        if self.shared.options.cancel_pollers_on_completion {
            self.cancel_pollers();
        }
    }

    fn on_completed(&self, flow: &dyn Flow) {
        if let Some(wf) = self.workflow() {
            info!(
                flow_id = %flow.id(),
                started = wf.started_steps,
                total = wf.total_steps,
                finished_jobs = wf.jobs.len(),
                "flow completed"
            );
        }
        if self.shared.options.cancel_pollers_on_completion {
            self.cancel_pollers();
        }
    }

    fn on_throwable(&self, flow: &dyn Flow, error: &anyhow::Error) -> bool {
        error!(flow_id = %flow.id(), error = %error, "flow reported a throwable");
        false
    }
}

impl FlowStepListener for FlowTracker {
    fn on_step_starting(&self, step: &StepHandle) {
        let name = step.name();
        let stats = step.stats();
        let Some(job_id) = stats.job_id() else {
            warn!(step = %name, "starting step has no assigned job id; ignoring");
            return;
        };
        let sample = sample_step(stats.as_ref(), name, &job_id);

        let cancel = {
            let mut guard = self.lock_state();
            let Some(flow) = guard.as_mut() else {
                trace!(step = %name, "not tracking a flow; ignoring step start");
                return;
            };
            let node_id = match flow.registry.register_id(name, &job_id) {
                Ok(node_id) => node_id,
                Err(err) => {
                    warn!(
                        step = %name,
                        job_id = %job_id,
                        error = %err,
                        "unrecognized step name in starting callback"
                    );
                    return;
                }
            };

            let job = &mut flow.registry.node_mut(node_id).job;
            if !job.start(job_id.clone(), stats.clone()) {
                return;
            }
            flow.workflow.record_started();

            let mut outcome = None;
            if let Some(sample) = sample {
                job.set_configuration(sample.configuration);
                outcome = job.refresh(sample.snapshot);
            }

            let mut events = vec![Event::job_started(flow.registry.node(node_id))];
            if let Some(outcome) = outcome {
                events.push(flow.conclude(node_id, outcome));
            }
            let flow_id = flow.flow_id.clone();
            self.emit(&flow_id, events);

            debug!(step = %name, job_id = %job_id, "step running");
            (outcome.is_none()).then(|| flow.cancel.child_token())
        };

        if let Some(cancel) = cancel {
            self.spawn_poller(step, job_id, cancel);
        }
    }

    fn on_step_stopping(&self, step: &StepHandle) {
        // The failure itself arrives through `on_step_throwable`.
        debug!(step = %step.name(), "step stopping");
    }

    fn on_step_progressing(&self, step: &StepHandle) {
        self.refresh_step(step);
    }

    fn on_step_completed(&self, step: &StepHandle) {
        let stats = step.stats();
        let Some(job_id) = stats.job_id() else {
            warn!(step = %step.name(), "completed step has no job id; ignoring");
            return;
        };
        let configuration = configuration_of(stats.as_ref(), step.name());

        let mut guard = self.lock_state();
        let Some(flow) = guard.as_mut() else {
            return;
        };
        let Some(node_id) = flow.registry.id_of_job(&job_id) else {
            warn!(step = %step.name(), job_id = %job_id, "unrecognized job id reported for succeeded job");
            return;
        };
        if let Some(event) = flow.finish(node_id, StepOutcome::Succeeded, configuration, stats) {
            let flow_id = flow.flow_id.clone();
            self.emit(&flow_id, vec![event]);
        }
    }

    fn on_step_throwable(&self, step: &StepHandle, error: &anyhow::Error) -> bool {
        let name = step.name();
        let stats = step.stats();
        let configuration = configuration_of(stats.as_ref(), name);

        let mut guard = self.lock_state();
        let Some(flow) = guard.as_mut() else {
            return false;
        };
        let Some(node_id) = flow.registry.id_of_name(name) else {
            warn!(step = %name, "unrecognized step name reported for failed job");
            return false;
        };
        warn!(step = %name, error = %error, "step failed");
        if let Some(event) = flow.finish(node_id, StepOutcome::Failed, configuration, stats) {
            let flow_id = flow.flow_id.clone();
            self.emit(&flow_id, vec![event]);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::sim::SimStep;
    use crate::backend::{StepDescriptor, StepGraph};
    use crate::events::LogSink;

    struct TwoStepFlow {
        graph: StepGraph,
    }

    impl TwoStepFlow {
        fn new() -> Self {
            let mut graph = StepGraph::new();
            let a = graph.add_node(StepDescriptor::new("A"));
            let b = graph.add_node(StepDescriptor::new("B"));
            graph.add_edge(a, b, ());
            Self { graph }
        }
    }

    impl Flow for TwoStepFlow {
        fn id(&self) -> &str {
            "two_steps"
        }

        fn step_graph(&self) -> Option<&StepGraph> {
            Some(&self.graph)
        }
    }

    fn running_step(name: &str, job_id: &str) -> (Arc<SimStep>, StepHandle) {
        let step = Arc::new(SimStep::new(name, 1, 0));
        step.sim_stats().submit(job_id);
        let handle: StepHandle = step.clone();
        (step, handle)
    }

    async fn wait_for_idle_pollers(tracker: &FlowTracker) {
        for _ in 0..2_500 {
            if tracker.active_pollers() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("pollers still running");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn finished_pollers_are_pruned_when_the_next_one_spawns() {
        let options = TrackerOptions {
            poll_interval: Duration::from_millis(2),
            cancel_pollers_on_completion: true,
        };
        let tracker = FlowTracker::new(Arc::new(LogSink), options, Handle::current());
        let flow = TwoStepFlow::new();
        tracker.on_starting(&flow);

        let (a, a_handle) = running_step("A", "job_a");
        tracker.on_step_starting(&a_handle);
        assert_eq!(tracker.lock_pollers().len(), 1);

        a.sim_stats().complete_all();
        wait_for_idle_pollers(&tracker).await;
        // Still held until something prunes it.
        assert_eq!(tracker.lock_pollers().len(), 1);

        let (_b, b_handle) = running_step("B", "job_b");
        tracker.on_step_starting(&b_handle);
        {
            let pollers = tracker.lock_pollers();
            assert_eq!(pollers.len(), 1);
            assert!(pollers.contains_key("job_b"));
        }

        tracker.shutdown().await;
        assert!(tracker.lock_pollers().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn a_running_poller_is_not_duplicated() {
        let options = TrackerOptions {
            poll_interval: Duration::from_secs(60),
            cancel_pollers_on_completion: true,
        };
        let tracker = FlowTracker::new(Arc::new(LogSink), options, Handle::current());
        let flow = TwoStepFlow::new();
        tracker.on_starting(&flow);

        let (_a, a_handle) = running_step("A", "job_a");
        tracker.on_step_starting(&a_handle);
        let cancel = CancellationToken::new();
        tracker.spawn_poller(&a_handle, "job_a".to_string(), cancel);
        assert_eq!(tracker.lock_pollers().len(), 1);
        assert_eq!(tracker.active_pollers(), 1);

        tracker.shutdown().await;
    }
}
