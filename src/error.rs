//! Error types shared across the crate.

use crate::agent::template::TemplateError;
use thiserror::Error;

/// Errors surfaced by crew construction and execution.
///
/// Every failure is fatal to the run that produced it; nothing in the crate
/// retries.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Missing credential: environment variable {0} is not set")]
    MissingCredential(String),

    #[error("Invalid template in {context}: {source}")]
    Template {
        context: String,
        #[source]
        source: TemplateError,
    },

    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("Provider request failed: {0}")]
    ProviderRequestFailed(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Tool provider '{name}' failed to start: {reason}")]
    ToolProviderStart { name: String, reason: String },

    #[error("Tool provider '{name}': {reason}")]
    ToolProviderError { name: String, reason: String },

    #[error("Task '{task}' failed: {reason}")]
    TaskFailed { task: String, reason: String },

    #[error("Run interrupted")]
    Interrupted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

impl ApiError {
    /// Wrap a template failure with the location it came from.
    pub fn template(context: impl Into<String>, source: TemplateError) -> Self {
        ApiError::Template {
            context: context.into(),
            source,
        }
    }

    pub fn tool_provider(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ApiError::ToolProviderError {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
