//! The Scheduler / Executor: topological evaluation,
//! concurrent fan-out, partial runs, pause/resume, and status reporting.

pub mod executor;
pub mod graph;

pub use executor::{ConcurrencyLimits, RunStatusReport, Scheduler, TaskStatusView};
pub use graph::CompiledGraph;
