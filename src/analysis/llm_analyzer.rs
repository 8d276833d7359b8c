//! Language-model backed decomposer and classifier

use super::{parse, prompts, AdapterError, Classifier, Decomposer, Decomposition};
use crate::llm::{LlmError, LlmProvider, Message};
use crate::pipeline::{Query, SubQuery};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

const TRANSIENT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Decomposes and classifies through an [`LlmProvider`]
///
/// With `combined` set, one model call both decomposes and classifies and the
/// pipeline skips its separate classification call.
pub struct LlmAnalyzer {
    provider: Arc<dyn LlmProvider>,
    combined: bool,
}

impl LlmAnalyzer {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            combined: true,
        }
    }

    pub fn with_combined(mut self, combined: bool) -> Self {
        self.combined = combined;
        self
    }

    async fn ask(&self, system: &str, user: String) -> Result<String, AdapterError> {
        let messages = [Message::system(prompts::with_guide(system)), Message::user(user)];
        let response = match self.provider.chat(&messages).await {
            Err(e) if e.downcast_ref::<LlmError>().is_some_and(LlmError::is_transient) => {
                tracing::warn!(provider = self.provider.name(), "{}; retrying once", e);
                tokio::time::sleep(TRANSIENT_RETRY_DELAY).await;
                self.provider.chat(&messages).await
            }
            other => other,
        }
        .map_err(|e| AdapterError::Request(format!("{:#}", e)))?;
        tracing::debug!(provider = self.provider.name(), "Analysis output: {}", response.text());
        Ok(response.text)
    }
}

#[async_trait]
impl Decomposer for LlmAnalyzer {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn decompose(&self, query: &Query) -> Result<Decomposition, AdapterError> {
        let prompt = prompts::decompose_prompt(query.as_str());

        if self.combined {
            let output = self.ask(prompts::COMBINED_SYSTEM, prompt).await?;
            return parse::parse_classified(&output).map(Decomposition::Classified);
        }

        let output = self.ask(prompts::DECOMPOSE_SYSTEM, prompt).await?;
        let mut texts = parse::parse_queries(&output)?;
        let original = query.as_str().trim();
        if !texts
            .first()
            .is_some_and(|first| first.trim().eq_ignore_ascii_case(original))
        {
            texts.insert(0, original.to_string());
        }
        Ok(Decomposition::Unclassified(texts))
    }
}

#[async_trait]
impl Classifier for LlmAnalyzer {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn classify(&self, texts: &[String]) -> Result<Vec<SubQuery>, AdapterError> {
        let output = self
            .ask(prompts::CLASSIFY_SYSTEM, prompts::classify_prompt(texts))
            .await?;
        let classified = parse::parse_classified(&output)?;
        if classified.len() != texts.len() {
            return Err(AdapterError::Mismatch {
                expected: texts.len(),
                got: classified.len(),
            });
        }

        // Keep the caller's text; only the label comes from the model
        Ok(texts
            .iter()
            .zip(classified)
            .map(|(text, item)| SubQuery::new(text.clone(), item.category))
            .collect())
    }
}
