//! Query pipeline
//!
//! Decompose → classify → execute (fan-out) → aggregate, driven by
//! [`PipelineCoordinator`]. Each HTTP request gets its own [`PipelineRun`];
//! the route table and executor are shared read-only across runs.

mod aggregator;
mod coordinator;
mod error;
mod run;
mod termination;
mod types;

pub use aggregator::{summarize_payload, Aggregator, SENTINEL};
pub use coordinator::{PipelineCoordinator, PipelineLimits};
pub use error::PipelineError;
pub use run::{PipelineRun, RunState, TraceMessage, TraceRole};
pub use termination::{is_terminal, TerminationDetector};
pub use types::{ExecutionResult, Query, SubQuery};
