//! Final answer synthesis
//!
//! Deterministic: successful payloads are summarized in sub-query order and
//! every failure is reported inline with its category and reason.

use super::ExecutionResult;
use crate::routing::strip_quotes;
use serde_json::Value;

/// Marks a final answer. Shared with the termination detector.
pub const SENTINEL: &str = "The final answer is:";

/// Payload fields checked, in order, for a direct answer
const ANSWER_FIELDS: [&str; 5] = ["answer", "result", "response", "output", "text"];

#[derive(Debug, Default, Clone, Copy)]
pub struct Aggregator;

impl Aggregator {
    pub fn new() -> Self {
        Self
    }

    pub fn aggregate(&self, results: &[ExecutionResult]) -> String {
        let mut answer = String::from(SENTINEL);

        if !results.iter().any(ExecutionResult::is_success) {
            answer.push_str(" No sub-query returned an answer.");
        }

        for result in results {
            let sub_query = &result.sub_query;
            let label = category_label(&sub_query.category);
            let line = match &result.outcome {
                Ok(payload) => format!(
                    "\n- [{}] {}: {}",
                    label,
                    sub_query.text.trim(),
                    summarize_payload(payload)
                ),
                Err(error) => format!(
                    "\n- [{}] {}: failed ({})",
                    label,
                    sub_query.text.trim(),
                    error
                ),
            };
            answer.push_str(&line);
        }

        answer
    }
}

fn category_label(category: &str) -> String {
    let label = strip_quotes(category);
    if label.is_empty() {
        "UNCLASSIFIED".to_string()
    } else {
        label.to_ascii_uppercase()
    }
}

/// Reduce an upstream payload to a readable answer
pub fn summarize_payload(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.trim().to_string(),
        Value::Object(map) => ANSWER_FIELDS
            .iter()
            .find_map(|field| map.get(*field))
            .map(|value| match value {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| payload.to_string()),
        other => other.to_string(),
    }
}
