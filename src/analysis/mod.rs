//! Query analysis - decomposition and classification
//!
//! The pipeline treats the language-understanding step as an opaque, possibly
//! slow, possibly failing dependency behind two traits. A single implementation
//! may provide both (see [`LlmAnalyzer`]), or they may be separate services.

mod llm_analyzer;
mod parse;
mod prompts;

pub use llm_analyzer::LlmAnalyzer;
pub use parse::{parse_classified, parse_classified_line, parse_queries};

use crate::pipeline::{Query, SubQuery};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Failure of the decomposition or classification step
///
/// Always fatal for the run: there is no meaningful partial decomposition.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Language model request failed: {0}")]
    Request(String),

    #[error("Analysis timed out after {0:?}")]
    Timeout(Duration),

    #[error("Could not parse analysis output: {0}")]
    Unparseable(String),

    #[error("Decomposition produced no sub-queries")]
    Empty,

    #[error("Classifier returned {got} items for {expected} sub-queries")]
    Mismatch { expected: usize, got: usize },
}

/// Output of the decomposition step
#[derive(Debug, Clone, PartialEq)]
pub enum Decomposition {
    /// Decomposer also classified (combined analysis)
    Classified(Vec<SubQuery>),
    /// Plain sub-query texts still waiting for a classifier
    Unclassified(Vec<String>),
}

impl Decomposition {
    pub fn len(&self) -> usize {
        match self {
            Decomposition::Classified(items) => items.len(),
            Decomposition::Unclassified(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn texts(&self) -> Vec<&str> {
        match self {
            Decomposition::Classified(items) => items.iter().map(|s| s.text.as_str()).collect(),
            Decomposition::Unclassified(items) => items.iter().map(String::as_str).collect(),
        }
    }
}

/// Splits one user query into ordered sub-queries
#[async_trait]
pub trait Decomposer: Send + Sync {
    fn name(&self) -> &str;

    async fn decompose(&self, query: &Query) -> Result<Decomposition, AdapterError>;
}

/// Assigns a category label to each sub-query text, preserving order
#[async_trait]
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    async fn classify(&self, texts: &[String]) -> Result<Vec<SubQuery>, AdapterError>;
}
