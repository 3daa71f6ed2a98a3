// src/engine/poller.rs

//! Background sampling of one running step.
//!
//! Each poller refreshes its step through the same path as a
//! step-progressing callback, then stops as soon as the backend reports any
//! terminal condition (finished, stopped, failed or successful) or its
//! cancellation token fires. It never retries and is never restarted.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::StepHandle;
use crate::engine::tracker::FlowTracker;

/// Why a poller loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerExit {
    Terminal,
    Cancelled,
}

pub async fn run_poller(
    tracker: FlowTracker,
    step: StepHandle,
    interval: Duration,
    cancel: CancellationToken,
) -> PollerExit {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let stats = step.stats();

    debug!(step = %step.name(), ?interval, "poller started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(step = %step.name(), "poller cancelled");
                return PollerExit::Cancelled;
            }
            _ = ticker.tick() => {}
        }

        tracker.refresh_step(&step);

        if stats.is_terminal() {
            debug!(step = %step.name(), "step reached a terminal status; poller exiting");
            return PollerExit::Terminal;
        }
    }
}
