mod common;
use crate::common::builders::StepGraphBuilder;
use crate::common::{
    RecordingSink, ScriptedFlow, ScriptedStats, ScriptedStep, init_tracing, tracker_with,
    wait_until,
};

use std::error::Error;
use std::sync::Arc;

use anyhow::anyhow;
use flowwatch::backend::{FlowListener, FlowStepListener};
use flowwatch::events::EventKind;
use flowwatch::job::JobState;

type TestResult = Result<(), Box<dyn Error>>;

fn two_step_flow(id: &str) -> ScriptedFlow {
    ScriptedFlow::new(id, StepGraphBuilder::new().chain(&["A", "B"]).build())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn poller_success_then_failure_callback_yields_one_terminal_event() -> TestResult {
    init_tracing();
    let sink = Arc::new(RecordingSink::new());
    let tracker = tracker_with(sink.clone(), 2, true);
    tracker.on_starting(&two_step_flow("race"));

    let (b, b_stats) = ScriptedStep::handle("B", ScriptedStats::running("B", "job_b", 2));
    tracker.on_step_starting(&b);
    b_stats.succeed();

    wait_until(|| tracker.completed_job_ids() == vec!["job_b".to_string()]).await;

    let handled = tracker.on_step_throwable(&b, &anyhow!("late failure report"));
    assert!(!handled);

    assert_eq!(sink.terminal_events_for("B"), vec![EventKind::JobFinished]);
    let node = tracker.lookup_by_name("B").expect("B is known");
    assert_eq!(node.job.state, JobState::Completed);
    assert_eq!(node.job.percent_complete, 100);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failure_callback_before_poller_sample_yields_one_failed_event() -> TestResult {
    init_tracing();
    let sink = Arc::new(RecordingSink::new());
    let tracker = tracker_with(sink.clone(), 2, true);
    tracker.on_starting(&two_step_flow("race"));

    let (b, b_stats) = ScriptedStep::handle("B", ScriptedStats::running("B", "job_b", 2));
    tracker.on_step_starting(&b);
    b_stats.fail();
    assert!(!tracker.on_step_throwable(&b, &anyhow!("task attempt failed")));

    wait_until(|| tracker.active_pollers() == 0).await;
    tracker.join_pollers().await;

    assert_eq!(sink.terminal_events_for("B"), vec![EventKind::JobFailed]);
    assert_eq!(
        tracker.lookup_by_name("B").map(|n| n.job.state),
        Some(JobState::Failed)
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_poller_and_completion_callback_never_double_report() -> TestResult {
    init_tracing();
    for round in 0..25 {
        let sink = Arc::new(RecordingSink::new());
        let tracker = tracker_with(sink.clone(), 1, true);
        tracker.on_starting(&ScriptedFlow::new(
            "stress",
            StepGraphBuilder::new().step("S").build(),
        ));

        let (step, stats) = ScriptedStep::handle("S", ScriptedStats::running("S", "job_s", 1));
        tracker.on_step_starting(&step);
        stats.succeed();

        let callback = {
            let tracker = tracker.clone();
            let step = step.clone();
            tokio::task::spawn_blocking(move || tracker.on_step_completed(&step))
        };
        callback.await?;
        wait_until(|| tracker.active_pollers() == 0).await;
        tracker.join_pollers().await;

        assert_eq!(
            sink.terminal_events_for("S"),
            vec![EventKind::JobFinished],
            "round {round}"
        );
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn repeated_terminal_callbacks_are_idempotent() -> TestResult {
    init_tracing();
    let sink = Arc::new(RecordingSink::new());
    let tracker = tracker_with(sink.clone(), 50, true);
    tracker.on_starting(&two_step_flow("dup"));

    let (a, a_stats) = ScriptedStep::handle("A", ScriptedStats::running("A", "job_a", 1));
    tracker.on_step_starting(&a);
    a_stats.succeed();
    tracker.on_step_completed(&a);
    tracker.on_step_completed(&a);
    tracker.on_step_throwable(&a, &anyhow!("spurious"));

    assert_eq!(sink.terminal_events_for("A"), vec![EventKind::JobFinished]);
    assert_eq!(tracker.workflow().map(|wf| wf.jobs.len()), Some(1));
    tracker.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn repeated_starting_callback_counts_once() -> TestResult {
    init_tracing();
    let sink = Arc::new(RecordingSink::new());
    let tracker = tracker_with(sink.clone(), 50, true);
    tracker.on_starting(&two_step_flow("restart"));

    let (a, _a_stats) = ScriptedStep::handle("A", ScriptedStats::running("A", "job_a", 3));
    tracker.on_step_starting(&a);
    tracker.on_step_starting(&a);

    assert_eq!(sink.steps_with(EventKind::JobStarted), vec!["A"]);
    assert_eq!(tracker.workflow().map(|wf| wf.started_steps), Some(1));
    tracker.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn step_already_complete_at_start_finishes_without_a_poller() -> TestResult {
    init_tracing();
    let sink = Arc::new(RecordingSink::new());
    let tracker = tracker_with(sink.clone(), 2, true);
    tracker.on_starting(&two_step_flow("instant"));

    let stats = ScriptedStats::running("A", "job_a", 1);
    stats.succeed();
    let (a, _) = ScriptedStep::handle("A", stats);
    tracker.on_step_starting(&a);

    let kinds: Vec<EventKind> = sink.events().iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EventKind::JobStarted, EventKind::JobFinished]);
    assert_eq!(tracker.active_pollers(), 0);

    tracker.on_step_completed(&a);
    assert_eq!(sink.terminal_events_for("A"), vec![EventKind::JobFinished]);
    Ok(())
}
