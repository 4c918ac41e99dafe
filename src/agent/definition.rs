//! The agent: a persona bound to a model and a set of tool providers.

use crate::agent::template::{placeholders, render_template, TemplateError};
use crate::agent::DEFAULT_MAX_ITERATIONS;
use crate::error::ApiError;
use crate::provider::ModelProviderClient;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// An agent definition. Role, goal and backstory may contain `{placeholders}`
/// that [`Agent::interpolate`] fills from the crew inputs.
#[derive(Clone)]
pub struct Agent {
    name: String,
    role: String,
    goal: String,
    backstory: String,
    tools: Vec<String>,
    llm: Arc<dyn ModelProviderClient>,
    max_iterations: usize,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("goal", &self.goal)
            .field("tools", &self.tools)
            .field("model", &self.llm.model())
            .field("max_iterations", &self.max_iterations)
            .finish()
    }
}

impl Agent {
    pub fn new(
        name: impl Into<String>,
        role: impl Into<String>,
        goal: impl Into<String>,
        backstory: impl Into<String>,
        llm: Arc<dyn ModelProviderClient>,
    ) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            goal: goal.into(),
            backstory: backstory.into(),
            tools: Vec::new(),
            llm,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Tool providers whose tools this agent may call.
    pub fn with_tools<I, S>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = providers.into_iter().map(Into::into).collect();
        self
    }

    /// Tool-call rounds before a final answer is forced. Clamped to at least 1.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn backstory(&self) -> &str {
        &self.backstory
    }

    pub fn tools(&self) -> &[String] {
        &self.tools
    }

    pub fn llm(&self) -> &Arc<dyn ModelProviderClient> {
        &self.llm
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    fn fields(&self) -> [(&'static str, &str); 3] {
        [
            ("role", &self.role),
            ("goal", &self.goal),
            ("backstory", &self.backstory),
        ]
    }

    /// A copy with every template field rendered against `inputs`.
    pub fn interpolate(&self, inputs: &HashMap<String, String>) -> Result<Agent, ApiError> {
        let render = |field: &str, template: &str| {
            render_template(template, inputs)
                .map_err(|e| ApiError::template(format!("agent '{}' {}", self.name, field), e))
        };
        Ok(Agent {
            role: render("role", &self.role)?,
            goal: render("goal", &self.goal)?,
            backstory: render("backstory", &self.backstory)?,
            ..self.clone()
        })
    }

    /// Placeholder names referenced by each template field.
    pub fn placeholders(&self) -> Result<Vec<(&'static str, BTreeSet<String>)>, TemplateError> {
        self.fields()
            .into_iter()
            .map(|(field, template)| Ok((field, placeholders(template)?)))
            .collect()
    }
}
