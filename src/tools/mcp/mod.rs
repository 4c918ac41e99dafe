//! Model Context Protocol servers reached over stdio.

pub mod client;
pub mod protocol;
pub mod provider;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub use client::{ClientTimeouts, McpClient};
pub use provider::{McpTool, McpToolProvider};

/// How to launch an MCP server process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpServerParams {
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Extra variables for the server, applied over the inherited ones.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Pass the whole parent environment instead of a minimal safe set.
    #[serde(default)]
    pub inherit_env: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

impl McpServerParams {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            inherit_env: false,
            working_dir: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn inheriting_env(mut self) -> Self {
        self.inherit_env = true;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.command.trim().is_empty() {
            return Err("command cannot be empty".to_string());
        }
        if let Some(key) = self.env.keys().find(|k| k.is_empty() || k.contains('=')) {
            return Err(format!("invalid environment variable name '{}'", key));
        }
        Ok(())
    }
}
