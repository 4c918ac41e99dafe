//! Crew files.
//!
//! A crew file is TOML:
//!
//! ```toml
//! name = "triage"
//!
//! [inputs]
//! platform = "Defect Dojo"
//!
//! [[tool_providers]]
//! name = "defectdojo"
//! type = "mcp"
//! command = "uvx"
//! args = ["../defectdojo-mcp"]
//!
//! [[agents]]
//! name = "analyst"
//! role = "Vulnerability Analyst"
//! goal = "Retrieve findings from {platform}"
//! backstory = { file = "prompts/analyst.md" }
//! tools = ["defectdojo"]
//!
//! [[tasks]]
//! name = "triage"
//! agent = "analyst"
//! description = "Triage open findings"
//! expected_output = "A prioritised list"
//! ```

use crate::agent::template::placeholders;
use crate::agent::{validate_agent_config, Agent, AgentConfig, PromptCache, TextSource};
use crate::config::McpSettings;
use crate::crew::presets;
use crate::crew::{Crew, Task};
use crate::error::ApiError;
use crate::provider::ModelProviderClient;
use crate::tools::ToolProviderSpec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One `[[tasks]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub name: String,
    pub agent: String,
    pub description: TextSource,
    pub expected_output: TextSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrewConfig {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Defaults for placeholders; inputs given at run time take precedence.
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,

    #[serde(default)]
    pub tool_providers: Vec<ToolProviderSpec>,

    #[serde(default)]
    pub agents: Vec<AgentConfig>,

    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

impl CrewConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ApiError> {
        toml::from_str(source)
            .map_err(|e| ApiError::ConfigError(format!("Invalid crew file: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self, ApiError> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            ApiError::ConfigError(format!("Failed to read crew file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&source).map_err(|e| match e {
            ApiError::ConfigError(msg) => {
                ApiError::ConfigError(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Structural problems, in declaration order. Empty when the file is sound.
    pub fn structural_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push("Crew name cannot be empty".to_string());
        }
        if self.tasks.is_empty() {
            errors.push("At least one task is required".to_string());
        }

        let mut provider_names = HashSet::new();
        for spec in &self.tool_providers {
            if let Err(e) = spec.validate() {
                errors.push(e);
            }
            if !provider_names.insert(spec.name.as_str()) {
                errors.push(format!("Duplicate tool provider name '{}'", spec.name));
            }
        }

        let mut agent_names = HashSet::new();
        for agent in &self.agents {
            if let Err(e) = validate_agent_config(agent, &provider_names) {
                errors.push(e);
            }
            if !agent_names.insert(agent.name.as_str()) {
                errors.push(format!("Duplicate agent name '{}'", agent.name));
            }
        }

        let mut task_names = HashSet::new();
        for task in &self.tasks {
            if task.name.trim().is_empty() {
                errors.push("Task name cannot be empty".to_string());
            }
            if !task_names.insert(task.name.as_str()) {
                errors.push(format!("Duplicate task name '{}'", task.name));
            }
            if !agent_names.contains(task.agent.as_str()) {
                errors.push(format!(
                    "Task '{}' is assigned to unknown agent '{}'",
                    task.name, task.agent
                ));
            }
            for (field, source) in [
                ("description", &task.description),
                ("expected_output", &task.expected_output),
            ] {
                if source.is_blank() {
                    errors.push(format!("Task '{}': {} cannot be empty", task.name, field));
                }
            }
        }
        errors
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        let errors = self.structural_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::ConfigError(format!(
                "Crew '{}' is invalid: {}",
                self.name,
                errors.join("; ")
            )))
        }
    }

    /// Build a runnable crew. Prompt files resolve against `base_dir`.
    pub fn build(
        &self,
        llm: Arc<dyn ModelProviderClient>,
        settings: &McpSettings,
        base_dir: &Path,
    ) -> Result<Crew, ApiError> {
        self.validate()?;
        let cache = PromptCache::new();
        let mut builder = Crew::builder(self.name.clone()).default_inputs(
            self.inputs
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );

        for spec in &self.tool_providers {
            builder = builder.tool_provider(spec.clone().into_provider(settings));
        }
        for agent in &self.agents {
            builder = builder.agent(
                Agent::new(
                    agent.name.clone(),
                    agent.role.load(base_dir, &cache)?,
                    agent.goal.load(base_dir, &cache)?,
                    agent.backstory.load(base_dir, &cache)?,
                    Arc::clone(&llm),
                )
                .with_tools(agent.tools.iter().cloned())
                .with_max_iterations(agent.max_iterations),
            );
        }
        for task in &self.tasks {
            builder = builder.task(Task::new(
                task.name.clone(),
                task.description.load(base_dir, &cache)?,
                task.expected_output.load(base_dir, &cache)?,
                task.agent.clone(),
            ));
        }
        builder.build()
    }
}

/// Where a crew definition came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrewSource {
    Preset(String),
    File(PathBuf),
}

/// Resolve a command-line crew argument: an existing file path wins over a
/// preset of the same name.
///
/// Returns the config and the directory prompt files resolve against.
pub fn resolve_crew(arg: &str) -> Result<(CrewConfig, PathBuf, CrewSource), ApiError> {
    let path = Path::new(arg);
    if path.is_file() {
        let config = CrewConfig::load(path)?;
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        return Ok((config, base_dir, CrewSource::File(path.to_path_buf())));
    }
    match presets::load(arg) {
        Some(config) => Ok((config?, std::env::current_dir()?, CrewSource::Preset(arg.to_string()))),
        None => Err(ApiError::ConfigError(format!(
            "'{}' is neither a crew file nor a preset (presets: {})",
            arg,
            presets::names().join(", ")
        ))),
    }
}

/// Placeholders of one template field and which of them have no value.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateReport {
    pub location: String,
    pub placeholders: Vec<String>,
    pub missing: Vec<String>,
}

/// Outcome of checking a crew without running it.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub crew: String,
    pub errors: Vec<String>,
    pub templates: Vec<TemplateReport>,
    /// Effective inputs: file defaults overlaid with the supplied ones.
    pub inputs: BTreeMap<String, String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty() && self.templates.iter().all(|t| t.missing.is_empty())
    }

    /// Every missing placeholder across all templates, sorted and unique.
    pub fn missing_inputs(&self) -> Vec<String> {
        self.templates
            .iter()
            .flat_map(|t| t.missing.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Check structure, prompt files and placeholders against `inputs`.
pub fn validate_crew(
    config: &CrewConfig,
    base_dir: &Path,
    inputs: &HashMap<String, String>,
) -> ValidationReport {
    let mut effective = config.inputs.clone();
    effective.extend(inputs.iter().map(|(k, v)| (k.clone(), v.clone())));

    let mut errors = config.structural_errors();
    let mut templates = Vec::new();
    let cache = PromptCache::new();

    let mut check = |location: String, source: &TextSource| {
        let text = match source.load(base_dir, &cache) {
            Ok(text) => text,
            Err(e) => {
                errors.push(format!("{}: {}", location, e));
                return;
            }
        };
        match placeholders(&text) {
            Ok(names) => {
                let missing = names
                    .iter()
                    .filter(|n| !effective.contains_key(n.as_str()))
                    .cloned()
                    .collect();
                templates.push(TemplateReport {
                    location,
                    placeholders: names.into_iter().collect(),
                    missing,
                });
            }
            Err(e) => errors.push(format!("{}: {}", location, e)),
        }
    };

    for agent in &config.agents {
        check(format!("agent '{}' role", agent.name), &agent.role);
        check(format!("agent '{}' goal", agent.name), &agent.goal);
        check(format!("agent '{}' backstory", agent.name), &agent.backstory);
    }
    for task in &config.tasks {
        check(format!("task '{}' description", task.name), &task.description);
        check(
            format!("task '{}' expected_output", task.name),
            &task.expected_output,
        );
    }

    ValidationReport {
        crew: config.name.clone(),
        errors,
        templates,
        inputs: effective,
    }
}
