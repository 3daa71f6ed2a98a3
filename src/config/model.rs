// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::types::SinkKind;

/// Configuration as deserialized from TOML, before validation.
///
/// ```toml
/// [tracker]
/// poll_interval_ms = 100
///
/// [sink]
/// kind = "jsonl"
/// path = "events.jsonl"
///
/// [flow]
/// id = "wordcount"
///
/// [step.tokenize]
/// map_tasks = 4
///
/// [step.count]
/// after = ["tokenize"]
/// reduce_tasks = 2
/// ```
///
/// All sections except `[step.<name>]` are optional.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub tracker: TrackerSection,

    #[serde(default)]
    pub sink: SinkSection,

    #[serde(default)]
    pub flow: FlowSection,

    /// Steps of the simulated flow, keyed by step name.
    #[serde(default)]
    pub step: BTreeMap<String, StepConfig>,
}

/// Validated configuration. Only constructible through
/// `ConfigFile::try_from(RawConfigFile)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub tracker: TrackerSection,
    pub sink: SinkSection,
    pub flow: FlowSection,
    pub step: BTreeMap<String, StepConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        tracker: TrackerSection,
        sink: SinkSection,
        flow: FlowSection,
        step: BTreeMap<String, StepConfig>,
    ) -> Self {
        Self {
            tracker,
            sink,
            flow,
            step,
        }
    }
}

/// `[tracker]` section: knobs of the step poller.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerSection {
    /// Fixed delay between two status samples of a running step.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Cancel still-running pollers once the flow stops or completes.
    #[serde(default = "default_true")]
    pub cancel_pollers_on_completion: bool,
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

impl Default for TrackerSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            cancel_pollers_on_completion: true,
        }
    }
}

impl TrackerSection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// `[sink]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SinkSection {
    #[serde(default)]
    pub kind: SinkKind,

    /// Output file for `jsonl`; stdout when absent or `"-"`.
    #[serde(default)]
    pub path: Option<String>,
}

/// `[flow]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct FlowSection {
    #[serde(default = "default_flow_id")]
    pub id: String,
}

fn default_flow_id() -> String {
    "flow".to_string()
}

impl Default for FlowSection {
    fn default() -> Self {
        Self {
            id: default_flow_id(),
        }
    }
}

/// `[step.<name>]` section describing one simulated map-reduce step.
#[derive(Debug, Clone, Deserialize)]
pub struct StepConfig {
    /// Steps whose output this step consumes.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default = "default_map_tasks")]
    pub map_tasks: usize,

    #[serde(default)]
    pub reduce_tasks: usize,

    /// Simulated wall time of a single task.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Make the step fail halfway through its tasks.
    #[serde(default)]
    pub fail: bool,

    /// Operation names reported as the node's features.
    #[serde(default)]
    pub features: Vec<String>,
}

fn default_map_tasks() -> usize {
    1
}

fn default_tick_ms() -> u64 {
    20
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            after: Vec::new(),
            map_tasks: default_map_tasks(),
            reduce_tasks: 0,
            tick_ms: default_tick_ms(),
            fail: false,
            features: Vec::new(),
        }
    }
}

impl StepConfig {
    pub fn total_tasks(&self) -> usize {
        self.map_tasks + self.reduce_tasks
    }
}
