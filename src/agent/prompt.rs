//! Prompt composition and prompt-file loading.

use crate::error::ApiError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Resolve prompt file path with support for absolute, tilde, and relative paths
///
/// Path resolution priority:
/// 1. Absolute path
/// 2. Tilde expansion (if starts with `~/`)
/// 3. Relative to current directory (if starts with `./`)
/// 4. Relative to base_dir (the crew file's directory)
pub fn resolve_prompt_path(path: &str, base_dir: &Path) -> Result<PathBuf, ApiError> {
    if Path::new(path).is_absolute() {
        return Ok(PathBuf::from(path));
    }
    if let Some(rest) = path.strip_prefix("~/") {
        let home =
            std::env::var("HOME").map_err(|_| ApiError::ConfigError("HOME not set".to_string()))?;
        return Ok(PathBuf::from(home).join(rest));
    }
    if let Some(rest) = path.strip_prefix("./") {
        let current_dir = std::env::current_dir()?;
        return Ok(current_dir.join(rest));
    }
    Ok(base_dir.join(path))
}

/// Prompt file cache keyed by path, invalidated when the file's mtime changes.
#[derive(Default)]
pub struct PromptCache {
    entries: Mutex<HashMap<PathBuf, (String, SystemTime)>>,
}

impl PromptCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load prompt file content, rejecting empty files.
    pub fn load_prompt(&self, path: &Path) -> Result<String, ApiError> {
        let unreadable = |e: std::io::Error| {
            ApiError::ConfigError(format!(
                "Failed to read prompt file {}: {}",
                path.display(),
                e
            ))
        };
        let mtime = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(unreadable)?;

        if let Some((content, cached_mtime)) = self.entries.lock().get(path) {
            if *cached_mtime == mtime {
                return Ok(content.clone());
            }
        }

        let content = std::fs::read_to_string(path).map_err(unreadable)?;
        if content.trim().is_empty() {
            return Err(ApiError::ConfigError(format!(
                "Prompt file {} is empty",
                path.display()
            )));
        }
        let content = content.trim_end().to_string();
        self.entries
            .lock()
            .insert(path.to_path_buf(), (content.clone(), mtime));
        Ok(content)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

const TOOL_GUIDANCE: &str = "You can call the tools provided to you. Call a tool whenever it \
helps you complete the task, and read its result before deciding what to do next. When you \
have the final answer, reply with it directly instead of calling another tool.";

/// System prompt establishing the agent's persona.
pub fn build_system_prompt(role: &str, goal: &str, backstory: &str, has_tools: bool) -> String {
    let mut prompt = format!(
        "You are {}. {}\nYour personal goal is: {}",
        role, backstory, goal
    );
    if has_tools {
        prompt.push_str("\n\n");
        prompt.push_str(TOOL_GUIDANCE);
    }
    prompt
}

/// User prompt carrying the task and the output of earlier tasks.
pub fn build_user_prompt(description: &str, expected_output: &str, context: &str) -> String {
    let mut prompt = format!(
        "Current Task: {}\n\nThis is the expected criteria for your final answer: {}\n\
         You MUST return the actual complete content as the final answer, not a summary.",
        description, expected_output
    );
    if !context.trim().is_empty() {
        prompt.push_str("\n\nThis is the context you're working with:\n");
        prompt.push_str(context);
    }
    prompt.push_str("\n\nBegin! This is VERY important to you, give your best final answer.");
    prompt
}

/// Sent once the tool iteration budget is spent.
pub const FINAL_ANSWER_NUDGE: &str = "You have used the maximum number of tool calls for this \
task. Do not call any more tools. Give your best final answer now.";
