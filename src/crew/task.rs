//! Tasks and their outputs.

use crate::agent::template::{placeholders, render_template, TemplateError};
use crate::error::ApiError;
use crate::provider::TokenUsage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// A unit of work assigned to exactly one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    name: String,
    description: String,
    expected_output: String,
    agent: String,
}

impl Task {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        expected_output: impl Into<String>,
        agent: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            expected_output: expected_output.into(),
            agent: agent.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn expected_output(&self) -> &str {
        &self.expected_output
    }

    /// Name of the agent that performs this task.
    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// A copy with description and expected output rendered against `inputs`.
    pub fn interpolate(&self, inputs: &HashMap<String, String>) -> Result<Task, ApiError> {
        let render = |field: &str, template: &str| {
            render_template(template, inputs)
                .map_err(|e| ApiError::template(format!("task '{}' {}", self.name, field), e))
        };
        Ok(Task {
            description: render("description", &self.description)?,
            expected_output: render("expected_output", &self.expected_output)?,
            ..self.clone()
        })
    }

    pub fn placeholders(&self) -> Result<Vec<(&'static str, BTreeSet<String>)>, TemplateError> {
        Ok(vec![
            ("description", placeholders(&self.description)?),
            ("expected_output", placeholders(&self.expected_output)?),
        ])
    }
}

/// What one task produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutput {
    pub task: String,
    pub agent: String,
    pub description: String,
    pub expected_output: String,
    /// The agent's final answer.
    pub raw: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub usage: TokenUsage,
    pub tool_calls: usize,
}

impl TaskOutput {
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Result of a whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewOutput {
    pub crew: String,
    /// Final answer of the last task.
    pub raw: String,
    pub tasks_output: Vec<TaskOutput>,
    /// Summed over every model call of the run.
    pub usage: TokenUsage,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CrewOutput {
    pub fn from_tasks(
        crew: impl Into<String>,
        tasks_output: Vec<TaskOutput>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let mut usage = TokenUsage::default();
        for output in &tasks_output {
            usage.add(&output.usage);
        }
        Self {
            crew: crew.into(),
            raw: tasks_output
                .last()
                .map(|o| o.raw.clone())
                .unwrap_or_default(),
            tasks_output,
            usage,
            started_at,
            finished_at: Utc::now(),
        }
    }
}
