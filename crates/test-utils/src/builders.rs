#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};

use flowwatch::backend::{StepDescriptor, StepGraph};
use flowwatch::config::{
    ConfigFile, FlowSection, RawConfigFile, SinkSection, StepConfig, TrackerSection,
};
use flowwatch::types::SinkKind;
use petgraph::graph::NodeIndex;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                tracker: TrackerSection::default(),
                sink: SinkSection::default(),
                flow: FlowSection::default(),
                step: BTreeMap::new(),
            },
        }
    }

    pub fn with_step(mut self, name: &str, step: StepConfig) -> Self {
        self.config.step.insert(name.to_string(), step);
        self
    }

    pub fn with_flow_id(mut self, id: &str) -> Self {
        self.config.flow.id = id.to_string();
        self
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.tracker.poll_interval_ms = ms;
        self
    }

    pub fn with_cancel_pollers_on_completion(mut self, val: bool) -> Self {
        self.config.tracker.cancel_pollers_on_completion = val;
        self
    }

    pub fn with_jsonl_sink(mut self, path: Option<&str>) -> Self {
        self.config.sink.kind = SinkKind::Jsonl;
        self.config.sink.path = path.map(str::to_string);
        self
    }

    /// The raw config, for exercising validation failures.
    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `StepConfig`.
pub struct StepConfigBuilder {
    step: StepConfig,
}

impl StepConfigBuilder {
    pub fn new() -> Self {
        Self {
            step: StepConfig {
                tick_ms: 2,
                ..StepConfig::default()
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.step.after.push(dep.to_string());
        self
    }

    pub fn tasks(mut self, map_tasks: usize, reduce_tasks: usize) -> Self {
        self.step.map_tasks = map_tasks;
        self.step.reduce_tasks = reduce_tasks;
        self
    }

    pub fn tick_ms(mut self, ms: u64) -> Self {
        self.step.tick_ms = ms;
        self
    }

    pub fn failing(mut self) -> Self {
        self.step.fail = true;
        self
    }

    pub fn feature(mut self, op: &str) -> Self {
        self.step.features.push(op.to_string());
        self
    }

    pub fn build(self) -> StepConfig {
        self.step
    }
}

impl Default for StepConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for a backend `StepGraph`, bypassing config validation so tests
/// can hand the converter arbitrary shapes.
pub struct StepGraphBuilder {
    graph: StepGraph,
    index: HashMap<String, NodeIndex>,
}

impl StepGraphBuilder {
    pub fn new() -> Self {
        Self {
            graph: StepGraph::new(),
            index: HashMap::new(),
        }
    }

    /// Add a step; adding the same name twice is a no-op.
    pub fn step(mut self, name: &str) -> Self {
        self.node(name);
        self
    }

    /// Add `from -> to`, creating either step if needed.
    pub fn edge(mut self, from: &str, to: &str) -> Self {
        let a = self.node(from);
        let b = self.node(to);
        self.graph.add_edge(a, b, ());
        self
    }

    /// `names[0] -> names[1] -> ...`
    pub fn chain(mut self, names: &[&str]) -> Self {
        for name in names {
            self.node(name);
        }
        for pair in names.windows(2) {
            self = self.edge(pair[0], pair[1]);
        }
        self
    }

    pub fn build(self) -> StepGraph {
        self.graph
    }

    fn node(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(StepDescriptor::new(name));
        self.index.insert(name.to_string(), idx);
        idx
    }
}

impl Default for StepGraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}
