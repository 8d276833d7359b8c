//! Per-request run state
//!
//! A [`PipelineRun`] is owned by exactly one coordinator invocation. Each stage
//! mutates it and then hands it to the next through [`PipelineRun::advance`],
//! which rejects transitions the state machine does not allow.

use super::{ExecutionResult, PipelineError, Query, SubQuery};
use crate::analysis::Decomposition;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Decomposing,
    Classifying,
    Executing,
    Aggregating,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    fn can_advance_to(&self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (Decomposing, Classifying)
            | (Classifying, Executing)
            | (Executing, Aggregating)
            | (Aggregating, Done) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Who produced a trace message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceRole {
    User,
    Decomposer,
    Classifier,
    Executor,
    Aggregator,
}

impl fmt::Display for TraceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TraceRole::User => "user",
            TraceRole::Decomposer => "decomposer",
            TraceRole::Classifier => "classifier",
            TraceRole::Executor => "executor",
            TraceRole::Aggregator => "aggregator",
        };
        f.write_str(name)
    }
}

/// One entry of the run trace returned to HTTP callers
///
/// Serializes as `{ "name", "role", "content" }`: `name` is the producing
/// stage, `role` is `user` for the caller's input and `assistant` otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceMessage {
    pub role: TraceRole,
    pub content: String,
}

impl Serialize for TraceMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wire<'a> {
            name: TraceRole,
            role: &'static str,
            content: &'a str,
        }

        Wire {
            name: self.role,
            role: match self.role {
                TraceRole::User => "user",
                _ => "assistant",
            },
            content: &self.content,
        }
        .serialize(serializer)
    }
}

impl TraceMessage {
    pub fn new(role: TraceRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub query: Query,
    pub state: RunState,
    pub steps: usize,
    pub sub_queries: Vec<SubQuery>,
    pub results: Vec<ExecutionResult>,
    pub final_answer: Option<String>,
    pub trace: Vec<TraceMessage>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub(crate) decomposition: Option<Decomposition>,
}

impl PipelineRun {
    pub fn new(query: Query) -> Self {
        Self {
            id: Uuid::new_v4(),
            query,
            state: RunState::Decomposing,
            steps: 0,
            sub_queries: Vec::new(),
            results: Vec::new(),
            final_answer: None,
            trace: Vec::new(),
            error: None,
            started_at: Utc::now(),
            finished_at: None,
            decomposition: None,
        }
    }

    /// Move to the next state, enforcing the state machine and the
    /// no-dropped-sub-query invariant
    pub fn advance(&mut self, next: RunState) -> Result<(), PipelineError> {
        if !self.state.can_advance_to(next) {
            return Err(PipelineError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        match next {
            RunState::Aggregating if self.results.len() != self.sub_queries.len() => {
                return Err(PipelineError::Invariant(format!(
                    "{} results for {} sub-queries",
                    self.results.len(),
                    self.sub_queries.len()
                )));
            }
            RunState::Done if self.final_answer.is_none() => {
                return Err(PipelineError::Invariant(
                    "run finished without a final answer".to_string(),
                ));
            }
            _ => {}
        }

        tracing::info!(run_id = %self.id, "Run {:?} -> {:?}", self.state, next);
        self.state = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Record a run-level failure. No-op on an already finished run.
    pub fn fail(&mut self, error: PipelineError) {
        if self.state.is_terminal() {
            return;
        }
        tracing::error!(run_id = %self.id, state = ?self.state, "Run failed: {}", error);
        self.error = Some(error.to_string());
        self.state = RunState::Failed;
        self.finished_at = Some(Utc::now());
    }

    pub fn push_trace(&mut self, role: TraceRole, content: impl Into<String>) {
        self.trace.push(TraceMessage::new(role, content));
    }

    pub fn is_done(&self) -> bool {
        self.state == RunState::Done
    }
}
