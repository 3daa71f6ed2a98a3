#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use flowwatch::backend::sim::{SimFlow, SimRunSummary};
use flowwatch::config::ConfigFile;
use flowwatch::engine::{FlowTracker, TrackerOptions};
use flowwatch::events::EventSink;
use tokio::runtime::Handle;

pub use flowwatch_test_utils::builders;
pub use flowwatch_test_utils::recording_sink::{FailingSink, RecordingSink, SlowSink};
pub use flowwatch_test_utils::scripted::{ScriptedFlow, ScriptedStats, ScriptedStep};
pub use flowwatch_test_utils::{init_tracing, wait_until, with_timeout};

use builders::{ConfigFileBuilder, StepConfigBuilder};

/// A tracker on the current runtime polling every `poll_ms`.
pub fn tracker_with(sink: Arc<dyn EventSink>, poll_ms: u64, cancel_on_completion: bool) -> FlowTracker {
    FlowTracker::new(
        sink,
        TrackerOptions {
            poll_interval: Duration::from_millis(poll_ms),
            cancel_pollers_on_completion: cancel_on_completion,
        },
        Handle::current(),
    )
}

/// `A -> B -> C` with two map tasks and one reducer each.
pub fn linear_config() -> ConfigFile {
    ConfigFileBuilder::new()
        .with_flow_id("linear")
        .with_poll_interval_ms(5)
        .with_step("A", StepConfigBuilder::new().tasks(2, 1).build())
        .with_step("B", StepConfigBuilder::new().after("A").tasks(2, 1).build())
        .with_step("C", StepConfigBuilder::new().after("B").tasks(2, 1).build())
        .build()
}

/// Run a simulated flow on a blocking thread, then stop every poller.
pub async fn run_sim(flow: SimFlow, tracker: &FlowTracker) -> SimRunSummary {
    let summary = {
        let tracker = tracker.clone();
        tokio::task::spawn_blocking(move || flow.run(&tracker))
            .await
            .expect("simulated flow panicked")
    };
    tracker.shutdown().await;
    summary
}

/// Whether `values` never decreases.
pub fn is_non_decreasing(values: &[u8]) -> bool {
    values.windows(2).all(|w| w[0] <= w[1])
}
