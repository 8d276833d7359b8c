//! Completion detection

use super::aggregator::SENTINEL;
use super::{TraceMessage, TraceRole};

/// True iff the message comes from the aggregator and its trimmed content
/// contains the sentinel (anywhere, not only as a prefix)
pub fn is_terminal(message: &TraceMessage) -> bool {
    message.role == TraceRole::Aggregator && message.content.trim().contains(SENTINEL)
}

/// Decides when a run should stop stepping
#[derive(Debug, Clone, Copy)]
pub struct TerminationDetector {
    max_steps: usize,
}

impl TerminationDetector {
    pub fn new(max_steps: usize) -> Self {
        Self { max_steps }
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn is_terminal(&self, message: &TraceMessage) -> bool {
        is_terminal(message)
    }

    pub fn budget_exhausted(&self, steps: usize) -> bool {
        steps >= self.max_steps
    }

    /// Stop once the last message is terminal or the step budget is spent
    pub fn should_stop(&self, trace: &[TraceMessage], steps: usize) -> bool {
        trace.last().is_some_and(is_terminal) || self.budget_exhausted(steps)
    }
}
