mod common;
use crate::common::builders::StepGraphBuilder;
use crate::common::{
    RecordingSink, ScriptedFlow, ScriptedStats, ScriptedStep, init_tracing, tracker_with,
    wait_until, with_timeout,
};

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use flowwatch::backend::{FlowListener, FlowStepListener};
use flowwatch::engine::{PollerExit, run_poller};
use flowwatch::events::EventKind;
use tokio_util::sync::CancellationToken;

type TestResult = Result<(), Box<dyn Error>>;

fn single_step(id: &str) -> ScriptedFlow {
    ScriptedFlow::new(id, StepGraphBuilder::new().step("A").build())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn poller_exits_on_terminal_status() -> TestResult {
    init_tracing();
    let sink = Arc::new(RecordingSink::new());
    let tracker = tracker_with(sink.clone(), 1, true);
    tracker.on_starting(&single_step("p"));

    let (a, stats) = ScriptedStep::handle("A", ScriptedStats::running("A", "job_a", 1));
    stats.stop();

    let exit = with_timeout(run_poller(
        tracker.clone(),
        a,
        Duration::from_millis(1),
        CancellationToken::new(),
    ))
    .await;
    assert_eq!(exit, PollerExit::Terminal);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn poller_exits_on_cancellation() -> TestResult {
    init_tracing();
    let sink = Arc::new(RecordingSink::new());
    let tracker = tracker_with(sink.clone(), 1, true);
    tracker.on_starting(&single_step("p"));

    let (a, _stats) = ScriptedStep::handle("A", ScriptedStats::running("A", "job_a", 1));
    let token = CancellationToken::new();
    let poller = tokio::spawn(run_poller(
        tracker.clone(),
        a,
        Duration::from_millis(1),
        token.clone(),
    ));

    tokio::time::sleep(Duration::from_millis(10)).await;
    token.cancel();
    assert_eq!(with_timeout(poller).await?, PollerExit::Cancelled);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pollers_refresh_running_steps_between_callbacks() -> TestResult {
    init_tracing();
    let sink = Arc::new(RecordingSink::new());
    let tracker = tracker_with(sink.clone(), 1, true);
    tracker.on_starting(&single_step("p"));

    let (a, stats) = ScriptedStep::handle("A", ScriptedStats::running("A", "job_a", 2));
    tracker.on_step_starting(&a);
    assert_eq!(tracker.active_pollers(), 1);

    stats.complete_maps(1);
    wait_until(|| tracker.lookup_by_name("A").is_some_and(|n| n.job.percent_complete == 50)).await;

    stats.succeed();
    wait_until(|| tracker.active_pollers() == 0).await;
    tracker.join_pollers().await;

    assert_eq!(sink.terminal_events_for("A"), vec![EventKind::JobFinished]);
    assert!(!sink.steps_with(EventKind::JobProgress).is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn flow_completion_cancels_abandoned_pollers() -> TestResult {
    init_tracing();
    let sink = Arc::new(RecordingSink::new());
    let tracker = tracker_with(sink.clone(), 1, true);
    let flow = single_step("abandoned");
    tracker.on_starting(&flow);

    // Never reaches a terminal status.
    let (a, _stats) = ScriptedStep::handle("A", ScriptedStats::running("A", "job_a", 1));
    tracker.on_step_starting(&a);
    assert_eq!(tracker.active_pollers(), 1);

    tracker.on_completed(&flow);
    with_timeout(tracker.join_pollers()).await;
    assert_eq!(tracker.active_pollers(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pollers_outlive_completion_when_cancellation_is_disabled() -> TestResult {
    init_tracing();
    let sink = Arc::new(RecordingSink::new());
    let tracker = tracker_with(sink.clone(), 1, false);
    let flow = single_step("lingering");
    tracker.on_starting(&flow);

    let (a, _stats) = ScriptedStep::handle("A", ScriptedStats::running("A", "job_a", 1));
    tracker.on_step_starting(&a);
    tracker.on_completed(&flow);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(tracker.active_pollers(), 1);

    with_timeout(tracker.shutdown()).await;
    assert_eq!(tracker.active_pollers(), 0);
    Ok(())
}
