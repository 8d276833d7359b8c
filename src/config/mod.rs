//! Configuration management for qorch

use crate::routing::Category;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable prefix for per-category route overrides
/// (`QORCH_ROUTE_OFD`, `QORCH_ROUTE_TKG`, `QORCH_ROUTE_CAUSAL`)
pub const ROUTE_ENV_PREFIX: &str = "QORCH_ROUTE_";

/// Steps a successful run takes: decompose, classify, execute, aggregate
pub const MIN_PIPELINE_STEPS: usize = 4;

/// Errors raised while loading or validating configuration.
///
/// All of these are fatal at startup: the service refuses to accept traffic
/// with a partial or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A category has no configured endpoint
    #[error("No route configured for category {0} (set [model_routes].{0})")]
    MissingRoute(Category),

    /// A configured endpoint is not an absolute http(s) URL
    #[error("Invalid endpoint for category {category}: {endpoint:?} ({reason})")]
    InvalidEndpoint {
        category: Category,
        endpoint: String,
        reason: String,
    },

    /// The configuration file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`Config`]
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A setting is out of its usable range
    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub model_routes: RoutesConfig,
    pub executor: ExecutorConfig,
    pub pipeline: PipelineConfig,
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8008,
        }
    }
}

/// Category endpoints, keyed by the upper-case category label
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct RoutesConfig {
    #[serde(rename = "OFD", skip_serializing_if = "Option::is_none")]
    pub ofd: Option<String>,
    #[serde(rename = "TKG", skip_serializing_if = "Option::is_none")]
    pub tkg: Option<String>,
    #[serde(rename = "CAUSAL", skip_serializing_if = "Option::is_none")]
    pub causal: Option<String>,
}

impl RoutesConfig {
    /// Configured endpoint for a category, ignoring blank values
    pub fn get(&self, category: Category) -> Option<&str> {
        let value = match category {
            Category::Ofd => self.ofd.as_deref(),
            Category::Tkg => self.tkg.as_deref(),
            Category::Causal => self.causal.as_deref(),
        };
        value.filter(|v| !v.trim().is_empty())
    }

    pub fn set(&mut self, category: Category, endpoint: impl Into<String>) {
        let slot = match category {
            Category::Ofd => &mut self.ofd,
            Category::Tkg => &mut self.tkg,
            Category::Causal => &mut self.causal,
        };
        *slot = Some(endpoint.into());
    }

    /// Apply `QORCH_ROUTE_<CATEGORY>` overrides from an iterator of env pairs
    pub fn apply_overrides<I, K, V>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (key, value) in vars {
            let Some(label) = key.as_ref().strip_prefix(ROUTE_ENV_PREFIX) else {
                continue;
            };
            match label.parse::<Category>() {
                Ok(category) => {
                    tracing::debug!("Route for {} overridden from environment", category);
                    self.set(category, value);
                }
                Err(_) => {
                    tracing::warn!("Ignoring route override for unknown category '{}'", label)
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Per-request timeout for category endpoints
    pub timeout_secs: u64,
    /// Skip TLS certificate verification (self-signed staging endpoints only)
    pub accept_invalid_certs: bool,
    /// Extra attempts after a transport failure
    pub max_retries: u32,
    /// Initial backoff between retries, doubled per attempt
    pub retry_backoff_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            accept_invalid_certs: false,
            max_retries: 1,
            retry_backoff_ms: 250,
        }
    }
}

impl ExecutorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Concurrent category calls per run
    pub max_concurrency: usize,
    /// Upper bound on sub-queries accepted from one decomposition
    pub max_sub_queries: usize,
    /// Step budget for one run
    pub max_steps: usize,
    pub run_timeout_secs: u64,
    pub analysis_timeout_secs: u64,
    /// Decompose and classify with a single language-model call
    pub combined_analysis: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            max_sub_queries: 32,
            max_steps: 8,
            run_timeout_secs: 120,
            analysis_timeout_secs: 60,
            combined_analysis: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    /// Chat completions endpoint (OpenAI-compatible)
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "groq".to_string(),
            base_url: "https://api.groq.com/openai/v1/chat/completions".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            temperature: 0.2,
            max_tokens: 2048,
            api_key_env: "GROQ_API_KEY".to_string(),
            timeout_secs: 60,
        }
    }
}

impl Config {
    /// Load configuration from the default location, or defaults if absent.
    /// Route overrides from the environment are applied in both cases.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::read_file(&path)?,
            _ => Config::default(),
        };
        config.model_routes.apply_overrides(std::env::vars());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(path)?;
        config.model_routes.apply_overrides(std::env::vars());
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make every run fail
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.max_steps < MIN_PIPELINE_STEPS {
            return Err(ConfigError::Invalid {
                field: "pipeline.max_steps",
                reason: format!(
                    "{} is below the {} steps a run needs",
                    self.pipeline.max_steps, MIN_PIPELINE_STEPS
                ),
            });
        }
        if self.pipeline.max_sub_queries == 0 {
            return Err(ConfigError::Invalid {
                field: "pipeline.max_sub_queries",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// `--config` if given, otherwise the default location
    pub fn load_or_default_path(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load_from(p),
            None => Self::load(),
        }
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Get the default configuration file path
    pub fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "qorch")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
