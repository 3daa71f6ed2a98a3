use std::str::FromStr;
use serde::Deserialize;

/// Identifier assigned by the execution backend once a step is submitted.
pub type JobId = String;

/// Where lifecycle events end up when running the `flowwatch` binary.
///
/// - `Log`: every event is written as a structured `tracing` record.
/// - `Jsonl`: every event is serialized as one JSON object per line, either to
///   a file or to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Log,
    Jsonl,
}

impl Default for SinkKind {
    fn default() -> Self {
        SinkKind::Log
    }
}

impl FromStr for SinkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "log" => Ok(SinkKind::Log),
            "jsonl" => Ok(SinkKind::Jsonl),
            other => Err(format!(
                "invalid sink kind: {other} (expected \"log\" or \"jsonl\")"
            )),
        }
    }
}

/// Outcome of a step as seen from its terminal transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded,
    Failed,
}
