//! LLM provider implementations
//!
//! The language model is only used for the content of decomposition and
//! classification; every control-flow decision stays in the pipeline.

mod error;
mod openai_compat;
mod types;

pub use error::LlmError;
pub use openai_compat::{OpenAiCompatConfig, OpenAiCompatProvider};
pub use types::*;

use crate::config::LlmConfig;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Trait for LLM providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &str;

    /// Send a chat completion request (non-streaming)
    async fn chat(&self, messages: &[Message]) -> Result<LlmResponse>;
}

/// Create an LLM provider from configuration
///
/// Every supported provider speaks the OpenAI chat completions format; the
/// name only selects defaults and whether an API key is mandatory.
pub fn create_provider(config: &LlmConfig) -> Result<Box<dyn LlmProvider>> {
    let name = config.provider.to_lowercase();
    let requires_key = match name.as_str() {
        "groq" | "openai" | "openrouter" => true,
        "local" | "ollama" | "vllm" => false,
        _ => anyhow::bail!(
            "Unknown LLM provider: {}. Supported: groq, openai, openrouter, local, ollama, vllm",
            config.provider
        ),
    };

    let api_key = std::env::var(&config.api_key_env)
        .ok()
        .filter(|k| !k.trim().is_empty());
    if requires_key && api_key.is_none() {
        anyhow::bail!(
            "{} requires an API key: set the {} environment variable",
            name,
            config.api_key_env
        );
    }

    let mut compat = OpenAiCompatConfig::new(name, config.base_url.clone())
        .with_model(config.model.clone())
        .with_max_tokens(config.max_tokens)
        .with_temperature(config.temperature)
        .with_timeout(Duration::from_secs(config.timeout_secs));
    if let Some(key) = api_key {
        compat = compat.with_api_key(key);
    }

    tracing::info!("Using LLM provider {} ({})", compat.name, compat.model);
    Ok(Box::new(OpenAiCompatProvider::new(compat)?))
}
