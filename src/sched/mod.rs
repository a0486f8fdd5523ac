// src/sched/mod.rs

//! Parallel execution of a resolved graph.
//!
//! [`state`] tracks the per-run execution state machine for every node;
//! [`scheduler`] owns the supervisory loop that promotes ready nodes, asks
//! the staleness oracle, and dispatches handlers up to the parallelism
//! bound.

pub mod scheduler;
pub mod state;

pub use scheduler::{Scheduler, Summary, WorkerEvent};
pub use state::ExecState;
