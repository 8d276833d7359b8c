//! Task executor - sends one classified sub-query to its category endpoint
//!
//! The executor only reads the shared [`RouteTable`] and talks to the network;
//! it keeps no per-run state, so a single instance is invoked concurrently for
//! every sub-query of every run.

mod error;

pub use error::ExecutionError;

use crate::config::ExecutorConfig;
use crate::pipeline::{ExecutionResult, SubQuery};
use crate::routing::{strip_quotes, RouteTable};
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Body posted to category endpoints
#[derive(Debug, Serialize)]
struct CategoryRequest<'a> {
    query: &'a str,
}

/// Transport settings for category calls
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    pub timeout: Duration,
    pub accept_invalid_certs: bool,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl From<&ExecutorConfig> for ExecutorOptions {
    fn from(config: &ExecutorConfig) -> Self {
        Self {
            timeout: config.timeout(),
            accept_invalid_certs: config.accept_invalid_certs,
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff(),
        }
    }
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self::from(&ExecutorConfig::default())
    }
}

pub struct TaskExecutor {
    routes: Arc<RouteTable>,
    client: reqwest::Client,
    max_retries: u32,
    retry_backoff: Duration,
}

impl TaskExecutor {
    pub fn new(routes: Arc<RouteTable>, config: &ExecutorConfig) -> Result<Self> {
        Self::with_options(routes, ExecutorOptions::from(config))
    }

    pub fn with_options(routes: Arc<RouteTable>, options: ExecutorOptions) -> Result<Self> {
        if options.accept_invalid_certs {
            tracing::warn!("TLS certificate verification is disabled for category endpoints");
        }

        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .build()
            .context("Failed to build HTTP client for category endpoints")?;

        Ok(Self {
            routes,
            client,
            max_retries: options.max_retries,
            retry_backoff: options.retry_backoff,
        })
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Execute one sub-query. Never fails outward; every failure mode is
    /// captured in the returned result.
    pub async fn execute(&self, sub_query: SubQuery) -> ExecutionResult {
        match self.dispatch(&sub_query).await {
            Ok(payload) => ExecutionResult::success(sub_query, payload),
            Err(error) => {
                tracing::warn!(
                    category = %sub_query.category,
                    error = %error,
                    "Sub-query failed"
                );
                ExecutionResult::failure(sub_query, error)
            }
        }
    }

    async fn dispatch(&self, sub_query: &SubQuery) -> Result<serde_json::Value, ExecutionError> {
        let label = strip_quotes(&sub_query.category);
        if label.is_empty() {
            return Err(ExecutionError::MalformedTask {
                detail: format!("missing category for '{}'", sub_query.text.trim()),
            });
        }
        let text = strip_quotes(&sub_query.text);
        if text.is_empty() {
            return Err(ExecutionError::MalformedTask {
                detail: format!("missing query for category {}", label),
            });
        }

        let route = self
            .routes
            .resolve_label(label)
            .map_err(|_| ExecutionError::InvalidCategory {
                category: label.to_string(),
            })?;

        let mut attempt = 0;
        let mut backoff = self.retry_backoff;
        loop {
            tracing::debug!(
                category = %route.category,
                endpoint = %route.endpoint,
                attempt,
                "Dispatching sub-query"
            );
            match self.post_once(&route.endpoint, text).await {
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        endpoint = %route.endpoint,
                        "{}; retrying in {:?} (attempt {}/{})",
                        e,
                        backoff,
                        attempt,
                        self.max_retries
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                other => return other,
            }
        }
    }

    async fn post_once(&self, endpoint: &Url, text: &str) -> Result<serde_json::Value, ExecutionError> {
        let response = self
            .client
            .post(endpoint.clone())
            .header("Content-Type", "application/json")
            .json(&CategoryRequest { query: text })
            .send()
            .await
            .map_err(|e| ExecutionError::from_transport(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ExecutionError::from_transport(&e))?;

        if !status.is_success() {
            return Err(ExecutionError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| ExecutionError::UpstreamFormat {
            detail: e.to_string(),
        })
    }
}
