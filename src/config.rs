use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for the validator
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// OpenAI-compatible API endpoint
    pub api_endpoint: String,
    /// Environment variable name containing the API key
    pub env_var_api_key: String,
    /// Model used for generation, scoring and suggestions
    pub model: String,
    /// Optional system prompt sent with the generation request
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Temperature for response generation (0.0 to 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Maximum tokens for response generation
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Rate limit for API requests per second
    #[serde(default = "default_rate_limit")]
    pub rate_limit_rps: f64,
    /// Transport timeout for a single API request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Maximum number of prompt suggestions kept per run
    #[serde(default = "default_suggestion_count")]
    pub suggestion_count: usize,
    /// Location of the local account store
    #[serde(default = "default_account_store_path")]
    pub account_store_path: PathBuf,
    /// Optional local path to store run reports as JSON
    #[serde(default)]
    pub storage_path: Option<String>,
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_rate_limit() -> f64 {
    10.0
}

fn default_request_timeout() -> u64 {
    60
}

fn default_suggestion_count() -> usize {
    3
}

fn default_account_store_path() -> PathBuf {
    PathBuf::from(".response-validator/accounts.json")
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.display()))
    }

    fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        if config.suggestion_count == 0 {
            anyhow::bail!("suggestion_count must be at least 1");
        }
        Ok(config)
    }
}
