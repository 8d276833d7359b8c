//! Per-sub-query failure taxonomy
//!
//! These errors are recorded on an [`ExecutionResult`](crate::pipeline::ExecutionResult)
//! rather than raised, so one failing category call never aborts its siblings.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionError {
    /// The classifier emitted a label with no configured route
    #[error("Invalid category: {category}")]
    InvalidCategory { category: String },

    /// Connection refused, timeout or TLS failure
    ///
    /// The only variant that is retried.
    #[error("Request failed: {detail}")]
    Transport { detail: String, timeout: bool },

    /// The category endpoint answered with a non-2xx status
    #[error("Upstream returned HTTP {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    /// The category endpoint answered 2xx with a body that is not JSON
    #[error("Upstream returned a non-JSON body: {detail}")]
    UpstreamFormat { detail: String },

    /// The classified task was missing its category or query marker
    #[error("Malformed classified task: {detail}")]
    MalformedTask { detail: String },
}

impl ExecutionError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecutionError::Transport { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecutionError::Transport { timeout: true, .. })
    }

    /// Classify a reqwest failure that happened before a response was received
    pub fn from_transport(e: &reqwest::Error) -> Self {
        let detail = if e.is_timeout() {
            format!("Request timeout: {}", e)
        } else if e.is_connect() {
            format!("Connection failed: {}", e)
        } else {
            e.to_string()
        };
        ExecutionError::Transport {
            detail,
            timeout: e.is_timeout(),
        }
    }
}
