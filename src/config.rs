//! Credentials and endpoints for a benchmark run, loaded from a TOML file
//! with environment-variable fallbacks for the secrets.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::AgentError;

/// Top-level config file contents. Every section has usable defaults so a
/// missing file still yields a config (secrets then must come from the
/// environment).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub model: ModelSettings,
    pub warehouse: WarehouseSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_seconds: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4.1-mini".to_string(),
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WarehouseSettings {
    /// Base URL of the warehouse SQL REST API; SQL tooling is disabled when
    /// unset
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub role: Option<String>,
    pub warehouse: Option<String>,
    pub statement_timeout_secs: u64,
}

impl Default for WarehouseSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            role: None,
            warehouse: None,
            statement_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers_per_tool: usize,
    pub queue_limit: usize,
    pub tool_timeout_secs: u64,
    pub max_output_chars: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8642,
            workers_per_tool: 4,
            queue_limit: 64,
            tool_timeout_secs: 300,
            max_output_chars: 8_000,
        }
    }
}

const MODEL_KEY_ENV: &str = "QUERYBENCH_MODEL_KEY";
const WAREHOUSE_TOKEN_ENV: &str = "QUERYBENCH_WAREHOUSE_TOKEN";

/// Load the config file, falling back to defaults when it does not exist.
pub fn load_config(path: Option<&Path>) -> Result<BenchConfig, AgentError> {
    let mut config = match path {
        Some(path) => read_config(path)?,
        None => BenchConfig::default(),
    };

    if config.model.api_key.is_none() {
        config.model.api_key = std::env::var(MODEL_KEY_ENV).ok();
    }
    if config.warehouse.token.is_none() {
        config.warehouse.token = std::env::var(WAREHOUSE_TOKEN_ENV).ok();
    }
    Ok(config)
}

fn read_config(path: &Path) -> Result<BenchConfig, AgentError> {
    match fs::read_to_string(path) {
        Ok(contents) => toml::from_str(&contents)
            .map_err(|e| AgentError::InvalidRequest(format!("config {}: {e}", path.display()))),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BenchConfig::default()),
        Err(err) => Err(AgentError::Io(err)),
    }
}
