// src/dag/mod.rs

//! DAG model of a tracked flow.
//!
//! - [`converter`] turns the backend's step graph into nodes.
//! - [`registry`] owns the nodes and indexes them by step name and job id.
//! - [`node`] defines the node record itself.

pub mod converter;
pub mod node;
pub mod registry;

pub use converter::convert_step_graph;
pub use node::{DagNode, NodeId};
pub use registry::NodeRegistry;
