//! Crews: agents, tasks and tool providers run as one sequential pipeline.
//!
//! A run renders every template first, then starts the tool providers,
//! executes the tasks in order and finally stops the providers on every exit
//! path.

pub mod config;
pub mod lifecycle;
pub mod presets;
pub mod runner;
pub mod task;

use crate::agent::Agent;
use crate::error::ApiError;
use crate::tools::ToolProvider;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use tracing::{error, info, warn};

pub use config::{validate_crew, CrewConfig, ValidationReport};
pub use lifecycle::ToolSession;
pub use runner::PipelineRunner;
pub use task::{CrewOutput, Task, TaskOutput};

/// How tasks are scheduled. Only sequential execution exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Process {
    #[default]
    Sequential,
}

pub struct Crew {
    name: String,
    agents: Vec<Agent>,
    tasks: Vec<Task>,
    providers: Vec<Box<dyn ToolProvider>>,
    default_inputs: HashMap<String, String>,
    process: Process,
}

impl fmt::Debug for Crew {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crew")
            .field("name", &self.name)
            .field("agents", &self.agents.iter().map(Agent::name).collect::<Vec<_>>())
            .field("tasks", &self.tasks.iter().map(Task::name).collect::<Vec<_>>())
            .field("providers", &self.provider_names())
            .field("process", &self.process)
            .finish()
    }
}

impl Crew {
    pub fn builder(name: impl Into<String>) -> CrewBuilder {
        CrewBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn process(&self) -> Process {
        self.process
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Run the crew to completion.
    pub async fn kickoff(&mut self, inputs: &HashMap<String, String>) -> Result<CrewOutput, ApiError> {
        self.kickoff_until(inputs, std::future::pending::<()>()).await
    }

    /// Run the crew, aborting with [`ApiError::Interrupted`] if `shutdown`
    /// completes first, whether providers are still starting or tasks are
    /// running. Providers are stopped either way.
    ///
    /// Dropping the returned future mid-run kills the running providers
    /// without waiting for them to exit.
    pub async fn kickoff_until<F>(
        &mut self,
        inputs: &HashMap<String, String>,
        shutdown: F,
    ) -> Result<CrewOutput, ApiError>
    where
        F: Future<Output = ()>,
    {
        let started_at = Utc::now();
        let inputs = self.merged_inputs(inputs);

        let agents = self
            .agents
            .iter()
            .map(|agent| Ok((agent.name().to_string(), agent.interpolate(&inputs)?)))
            .collect::<Result<HashMap<_, _>, ApiError>>()?;
        let tasks = self
            .tasks
            .iter()
            .map(|task| task.interpolate(&inputs))
            .collect::<Result<Vec<_>, ApiError>>()?;

        info!(
            crew = %self.name,
            agents = agents.len(),
            tasks = tasks.len(),
            providers = self.providers.len(),
            "Crew run started"
        );

        tokio::pin!(shutdown);
        let mut session = ToolSession::new(&mut self.providers);
        let started = tokio::select! {
            result = session.start_all() => result,
            _ = &mut shutdown => {
                warn!(crew = %self.name, "Shutdown requested while starting tool providers");
                Err(ApiError::Interrupted)
            }
        };

        let outcome = match started {
            Ok(()) => {
                let runner = PipelineRunner::new(&self.name, &agents, &session);
                tokio::select! {
                    result = runner.run(&tasks) => result,
                    _ = &mut shutdown => {
                        warn!(crew = %self.name, "Shutdown requested, aborting run");
                        Err(ApiError::Interrupted)
                    }
                }
            }
            Err(e) => Err(e),
        };

        let stopped = session.stop_all().await;

        match (outcome, stopped) {
            (Ok(outputs), Ok(())) => {
                let output = CrewOutput::from_tasks(self.name.clone(), outputs, started_at);
                info!(
                    crew = %self.name,
                    total_tokens = output.usage.total_tokens,
                    requests = output.usage.successful_requests,
                    duration_ms = (output.finished_at - output.started_at).num_milliseconds(),
                    "Crew run finished"
                );
                Ok(output)
            }
            (Ok(_), Err(stop_err)) => {
                error!(crew = %self.name, error = %stop_err, "Run succeeded but provider cleanup failed");
                Err(stop_err)
            }
            (Err(run_err), stopped) => {
                if let Err(stop_err) = stopped {
                    warn!(crew = %self.name, error = %stop_err, "Provider cleanup also failed");
                }
                error!(crew = %self.name, error = %run_err, "Crew run failed");
                Err(run_err)
            }
        }
    }

    fn merged_inputs(&self, inputs: &HashMap<String, String>) -> HashMap<String, String> {
        let mut merged = self.default_inputs.clone();
        merged.extend(inputs.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}

/// Collects the parts of a crew and checks them on [`CrewBuilder::build`].
pub struct CrewBuilder {
    name: String,
    agents: Vec<Agent>,
    tasks: Vec<Task>,
    providers: Vec<Box<dyn ToolProvider>>,
    default_inputs: HashMap<String, String>,
}

impl CrewBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            agents: Vec::new(),
            tasks: Vec::new(),
            providers: Vec::new(),
            default_inputs: HashMap::new(),
        }
    }

    pub fn agent(mut self, agent: Agent) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn tool_provider(mut self, provider: Box<dyn ToolProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Inputs used when a run does not supply them.
    pub fn default_inputs(mut self, inputs: HashMap<String, String>) -> Self {
        self.default_inputs = inputs;
        self
    }

    pub fn build(self) -> Result<Crew, ApiError> {
        let invalid = |msg: String| ApiError::ConfigError(format!("Crew '{}': {}", self.name, msg));

        if self.name.trim().is_empty() {
            return Err(ApiError::ConfigError("Crew name cannot be empty".to_string()));
        }
        if self.tasks.is_empty() {
            return Err(invalid("at least one task is required".to_string()));
        }

        let providers = unique_names(self.providers.iter().map(|p| p.name()), "tool provider")
            .map_err(&invalid)?;
        let agents =
            unique_names(self.agents.iter().map(Agent::name), "agent").map_err(&invalid)?;
        unique_names(self.tasks.iter().map(Task::name), "task").map_err(&invalid)?;

        for agent in &self.agents {
            if let Some(missing) = agent.tools().iter().find(|t| !providers.contains(t.as_str())) {
                return Err(invalid(format!(
                    "agent '{}' references unknown tool provider '{}'",
                    agent.name(),
                    missing
                )));
            }
        }
        for task in &self.tasks {
            if !agents.contains(task.agent()) {
                return Err(invalid(format!(
                    "task '{}' is assigned to unknown agent '{}'",
                    task.name(),
                    task.agent()
                )));
            }
        }

        Ok(Crew {
            name: self.name,
            agents: self.agents,
            tasks: self.tasks,
            providers: self.providers,
            default_inputs: self.default_inputs,
            process: Process::Sequential,
        })
    }
}

fn unique_names<'a>(
    names: impl Iterator<Item = &'a str>,
    kind: &str,
) -> Result<HashSet<&'a str>, String> {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(format!("{} name cannot be empty", kind));
        }
        if !seen.insert(name) {
            return Err(format!("duplicate {} name '{}'", kind, name));
        }
    }
    Ok(seen)
}
