// src/lib.rs

pub mod backend;
pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod events;
pub mod job;
pub mod logging;
pub mod types;

use std::sync::Arc;

use anyhow::Result;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::backend::Flow;
use crate::backend::sim::SimFlow;
use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::{ConfigFile, SinkSection};
use crate::dag::convert_step_graph;
use crate::engine::{FlowTracker, TrackerOptions};
use crate::events::{EventSink, JsonLinesSink, LogSink};
use crate::types::SinkKind;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the simulated backend built from `[step.*]`
/// - the event sink from `[sink]`
/// - a tracker observing the flow until it completes
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)?;
    let flow = SimFlow::from_config(&cfg)?;

    if args.dry_run {
        print_dry_run(&cfg, &flow)?;
        return Ok(());
    }

    let sink = build_sink(&cfg.sink)?;
    let tracker = FlowTracker::new(sink, TrackerOptions::from(&cfg.tracker), Handle::current());

    // The backend drives its listener synchronously, so keep it off the
    // runtime's worker threads; pollers run on the runtime.
    let summary = {
        let tracker = tracker.clone();
        tokio::task::spawn_blocking(move || flow.run(&tracker)).await?
    };

    tracker.shutdown().await;

    if let Some(wf) = tracker.workflow() {
        info!(
            flow_id = %wf.flow_id,
            started = wf.started_steps,
            total = wf.total_steps,
            "tracking finished"
        );
    }
    if !summary.failed.is_empty() {
        warn!(failed = ?summary.failed, skipped = ?summary.skipped, "flow had failing steps");
    }
    Ok(())
}

/// Build the configured event sink.
pub fn build_sink(section: &SinkSection) -> Result<Arc<dyn EventSink>> {
    let sink: Arc<dyn EventSink> = match (section.kind, section.path.as_deref()) {
        (SinkKind::Log, _) => Arc::new(LogSink),
        (SinkKind::Jsonl, None | Some("-")) => Arc::new(JsonLinesSink::stdout()),
        (SinkKind::Jsonl, Some(path)) => Arc::new(JsonLinesSink::create(path)?),
    };
    Ok(sink)
}

/// Dry-run output: print tracker settings and the converted DAG.
fn print_dry_run(cfg: &ConfigFile, flow: &SimFlow) -> Result<()> {
    println!("flowwatch dry-run");
    println!("  flow.id = {}", cfg.flow.id);
    println!("  tracker.poll_interval_ms = {}", cfg.tracker.poll_interval_ms);
    println!(
        "  tracker.cancel_pollers_on_completion = {}",
        cfg.tracker.cancel_pollers_on_completion
    );
    println!("  sink.kind = {:?}", cfg.sink.kind);
    println!();

    let Some(graph) = flow.step_graph() else {
        println!("step graph unavailable");
        return Ok(());
    };
    let registry = convert_step_graph(graph)?;

    println!("steps ({}):", registry.len());
    for node in registry.nodes() {
        let Some(step) = cfg.step.get(&node.name) else {
            continue;
        };
        println!("  - {} (level {})", node.name, node.dag_level);
        println!("      tasks: {} map, {} reduce", step.map_tasks, step.reduce_tasks);
        if !node.predecessor_names.is_empty() {
            println!("      after: {:?}", node.predecessor_names);
        }
        if !node.successor_names.is_empty() {
            println!("      before: {:?}", node.successor_names);
        }
        if !node.features.is_empty() {
            println!("      features: {:?}", node.features);
        }
        if step.fail {
            println!("      fail: true");
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
