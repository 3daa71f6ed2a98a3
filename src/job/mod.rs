// src/job/mod.rs

//! Job records and their progress snapshots.
//!
//! - [`state`] holds the per-node `Job` record and its state machine.
//! - [`mapreduce`] holds the immutable `MapReduceJobState` snapshot.

pub mod mapreduce;
pub mod state;

pub use mapreduce::{MapReduceJobState, TaskCounts};
pub use state::{Job, JobState};
