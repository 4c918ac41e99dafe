//! Tools and tool providers.
//!
//! A [`ToolProvider`] is a named, scoped source of tools: it is started before
//! the first task runs, serves tool calls for the whole run, and is stopped
//! when the run ends. Agents reference providers by name and receive every
//! tool the provider advertises.

pub mod code_interpreter;
pub mod mcp;

use crate::config::McpSettings;
use crate::error::ApiError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use code_interpreter::{CodeInterpreterConfig, CodeInterpreterProvider, CodeInterpreterTool};
pub use mcp::{McpServerParams, McpToolProvider};

/// Name, description and JSON input schema of a tool, as shown to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// What a tool call produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub text: String,
    /// The tool ran but reported failure; the text explains why.
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

/// A callable capability handed to an agent.
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> &ToolDefinition;

    /// Invoke the tool. `Err` means the tool could not be reached at all.
    async fn call(&self, arguments: serde_json::Value) -> Result<ToolOutput, ApiError>;
}

/// Start/stop lifecycle around a set of tools.
///
/// `stop` must be idempotent. A provider whose `start` fails releases
/// whatever it acquired before returning the error.
#[async_trait]
pub trait ToolProvider: Send {
    fn name(&self) -> &str;

    async fn start(&mut self) -> Result<Vec<Arc<dyn Tool>>, ApiError>;

    async fn stop(&mut self) -> Result<(), ApiError>;

    /// Kill anything still running without waiting for it. Called when a run
    /// is dropped before it could stop its providers.
    fn abort(&mut self) {}
}

/// Tools available to one agent, unique by name.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tool: Arc<dyn Tool>) -> Result<(), ApiError> {
        let name = &tool.definition().name;
        if self.get(name).is_some() {
            return Err(ApiError::ConfigError(format!(
                "Tool '{}' is provided more than once",
                name
            )));
        }
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.definition().name == name)
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition().clone()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools
            .iter()
            .map(|t| t.definition().name.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

/// Provider kinds a crew file can declare.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolProviderKind {
    /// MCP server reached over stdio.
    Mcp(McpServerParams),
    /// Local interpreter running model-written code.
    CodeInterpreter(CodeInterpreterConfig),
}

/// Declaration of a named tool provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolProviderSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: ToolProviderKind,
}

impl ToolProviderSpec {
    pub fn kind_slug(&self) -> &'static str {
        match self.kind {
            ToolProviderKind::Mcp(_) => "mcp",
            ToolProviderKind::CodeInterpreter(_) => "code_interpreter",
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Tool provider name cannot be empty".to_string());
        }
        match &self.kind {
            ToolProviderKind::Mcp(params) => params.validate(),
            ToolProviderKind::CodeInterpreter(config) => config.validate(),
        }
        .map_err(|e| format!("Tool provider '{}': {}", self.name, e))
    }

    /// Build the (not yet started) provider.
    pub fn into_provider(self, settings: &McpSettings) -> Box<dyn ToolProvider> {
        match self.kind {
            ToolProviderKind::Mcp(params) => {
                Box::new(McpToolProvider::new(self.name, params, settings.clone()))
            }
            ToolProviderKind::CodeInterpreter(config) => {
                Box::new(CodeInterpreterProvider::new(self.name, config))
            }
        }
    }
}
