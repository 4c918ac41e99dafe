//! Application configuration.
//!
//! Layered with the `config` crate: built-in defaults, the user config file,
//! the working-directory config file, then `NEXTVULN__*` environment
//! variables. Credentials are never stored in configuration; [`LlmSettings`]
//! only names the environment variables they are read from.

pub mod credentials;
pub mod facade;
pub mod merge;
pub mod paths;
pub mod sources;

use crate::logging::LoggingConfig;
use crate::provider::CompletionOptions;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use credentials::LlmCredentials;
pub use facade::ConfigLoader;

/// Environment prefix for configuration overrides (`NEXTVULN__LLM__...`).
pub const ENV_PREFIX: &str = "NEXTVULN";

/// Configuration file name looked up in the working directory.
pub const WORKSPACE_CONFIG_FILE: &str = "nextvuln.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub llm: LlmSettings,

    #[serde(default)]
    pub mcp: McpSettings,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.llm.validate()?;
        self.mcp.validate()
    }
}

fn default_model_env() -> String {
    "OPENROUTER_MODEL_NAME".to_string()
}

fn default_base_url_env() -> String {
    "OPENROUTER_BASE_URL".to_string()
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}

fn default_llm_timeout_secs() -> u64 {
    120
}

/// Model access settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Variable holding the model name.
    #[serde(default = "default_model_env")]
    pub model_env: String,

    /// Variable holding the OpenAI-compatible base URL.
    #[serde(default = "default_base_url_env")]
    pub base_url_env: String,

    /// Variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default)]
    pub default_options: CompletionOptions,

    #[serde(default = "default_llm_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model_env: default_model_env(),
            base_url_env: default_base_url_env(),
            api_key_env: default_api_key_env(),
            default_options: CompletionOptions::default(),
            request_timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl LlmSettings {
    pub fn validate(&self) -> Result<(), String> {
        for (field, value) in [
            ("model_env", &self.model_env),
            ("base_url_env", &self.base_url_env),
            ("api_key_env", &self.api_key_env),
        ] {
            if value.trim().is_empty() {
                return Err(format!("llm.{} cannot be empty", field));
            }
        }
        if self.request_timeout_secs == 0 {
            return Err("llm.request_timeout_secs must be positive".to_string());
        }
        self.default_options
            .validate()
            .map_err(|e| format!("llm.default_options: {}", e))
    }
}

fn default_mcp_request_timeout_secs() -> u64 {
    30
}

fn default_shutdown_grace_ms() -> u64 {
    2000
}

/// Timeouts applied to every MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpSettings {
    #[serde(default = "default_mcp_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// How long a server may take to exit after its stdin closes.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for McpSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_mcp_request_timeout_secs(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl McpSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.request_timeout_secs == 0 {
            return Err("mcp.request_timeout_secs must be positive".to_string());
        }
        Ok(())
    }
}
