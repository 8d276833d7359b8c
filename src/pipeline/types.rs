//! Data carried through a pipeline run

use crate::executor::ExecutionError;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// The original user input. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query(String);

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One atomic unit of the user query with the category label it was assigned
///
/// `category` is the classifier's label as emitted (normally `OFD`, `TKG` or
/// `CAUSAL`). It stays a string so an unroutable label can still be reported
/// per sub-query instead of failing the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubQuery {
    pub text: String,
    pub category: String,
}

impl SubQuery {
    pub fn new(text: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            category: category.into(),
        }
    }
}

/// Outcome of dispatching one sub-query
///
/// Holds either the upstream JSON payload or the error that replaced it, never
/// both. Serializes as `{ "sub_query", "payload", "error" }` with exactly one of
/// the last two non-null.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub sub_query: SubQuery,
    pub outcome: Result<serde_json::Value, ExecutionError>,
}

impl ExecutionResult {
    pub fn success(sub_query: SubQuery, payload: serde_json::Value) -> Self {
        Self {
            sub_query,
            outcome: Ok(payload),
        }
    }

    pub fn failure(sub_query: SubQuery, error: ExecutionError) -> Self {
        Self {
            sub_query,
            outcome: Err(error),
        }
    }

    pub fn payload(&self) -> Option<&serde_json::Value> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&ExecutionError> {
        self.outcome.as_ref().err()
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

impl Serialize for ExecutionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wire<'a> {
            sub_query: &'a SubQuery,
            payload: Option<&'a serde_json::Value>,
            error: Option<WireError<'a>>,
        }

        #[derive(Serialize)]
        struct WireError<'a> {
            #[serde(flatten)]
            detail: &'a ExecutionError,
            message: String,
        }

        Wire {
            sub_query: &self.sub_query,
            payload: self.payload(),
            error: self.error().map(|detail| WireError {
                detail,
                message: detail.to_string(),
            }),
        }
        .serialize(serializer)
    }
}
