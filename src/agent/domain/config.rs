//! Agent declaration as written in crew files.

use crate::agent::prompt::{resolve_prompt_path, PromptCache};
use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Text given inline or loaded from a prompt file.
///
/// ```toml
/// role = "Ethical Hacker"
/// backstory = { file = "prompts/hacker.md" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextSource {
    Inline(String),
    File { file: String },
}

impl TextSource {
    /// Inline text, or the file contents resolved against `base_dir`.
    pub fn load(&self, base_dir: &Path, cache: &PromptCache) -> Result<String, ApiError> {
        match self {
            TextSource::Inline(text) => Ok(text.clone()),
            TextSource::File { file } => {
                let path = resolve_prompt_path(file, base_dir)?;
                cache.load_prompt(&path)
            }
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            TextSource::Inline(text) => text.trim().is_empty(),
            TextSource::File { file } => file.trim().is_empty(),
        }
    }
}

impl From<&str> for TextSource {
    fn from(text: &str) -> Self {
        TextSource::Inline(text.to_string())
    }
}

fn default_max_iterations() -> usize {
    crate::agent::DEFAULT_MAX_ITERATIONS
}

/// One `[[agents]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    pub role: TextSource,
    pub goal: TextSource,
    pub backstory: TextSource,

    /// Names of tool providers whose tools this agent may call.
    #[serde(default)]
    pub tools: Vec<String>,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}
