// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{FlowwatchError, Result};
use crate::types::SinkKind;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::FlowwatchError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.tracker, raw.sink, raw.flow, raw.step))
    }
}

/// Run all checks against an already-deserialized raw config.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_raw_config(cfg)
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_steps(cfg)?;
    validate_tracker(cfg)?;
    validate_sink(cfg)?;
    validate_step_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_steps(cfg: &RawConfigFile) -> Result<()> {
    if cfg.step.is_empty() {
        return Err(FlowwatchError::ConfigError(
            "config must contain at least one [step.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_tracker(cfg: &RawConfigFile) -> Result<()> {
    if cfg.tracker.poll_interval_ms == 0 {
        return Err(FlowwatchError::ConfigError(
            "[tracker].poll_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.flow.id.trim().is_empty() {
        return Err(FlowwatchError::ConfigError(
            "[flow].id must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_sink(cfg: &RawConfigFile) -> Result<()> {
    if cfg.sink.kind == SinkKind::Log && cfg.sink.path.is_some() {
        return Err(FlowwatchError::ConfigError(
            "[sink].path is only valid with kind = \"jsonl\"".to_string(),
        ));
    }
    Ok(())
}

fn validate_step_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, step) in cfg.step.iter() {
        for dep in step.after.iter() {
            if !cfg.step.contains_key(dep) {
                return Err(FlowwatchError::ConfigError(format!(
                    "step '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
            if dep == name {
                return Err(FlowwatchError::ConfigError(format!(
                    "step '{}' cannot depend on itself in `after`",
                    name
                )));
            }
        }
        if step.total_tasks() == 0 {
            return Err(FlowwatchError::ConfigError(format!(
                "step '{}' must have at least one map or reduce task",
                name
            )));
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dep -> step, i.e. `after = ["A"]` on B adds A -> B.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.step.keys() {
        graph.add_node(name.as_str());
    }

    for (name, step) in cfg.step.iter() {
        for dep in step.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(FlowwatchError::DagCycle(format!(
                "cycle detected in step graph involving step '{}'",
                node
            )))
        }
    }
}
