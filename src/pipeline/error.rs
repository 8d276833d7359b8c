//! Run-level errors
//!
//! Any of these moves a run to `Failed`. Per-sub-query failures are not here:
//! they live on [`ExecutionResult`](super::ExecutionResult) and never abort a run.

use super::RunState;
use crate::analysis::AdapterError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error("Decomposition produced {count} sub-queries (limit {limit})")]
    TooManySubQueries { count: usize, limit: usize },

    #[error("Decomposition is unclassified and no classifier is configured")]
    MissingClassifier,

    #[error("Pipeline did not finish within {0} steps")]
    StepBudgetExceeded(usize),

    #[error("Pipeline did not finish within {0:?}")]
    Deadline(Duration),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition { from: RunState, to: RunState },

    #[error("Internal invariant violated: {0}")]
    Invariant(String),
}
