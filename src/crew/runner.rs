//! Sequential task execution.

use crate::agent::{Agent, AgentExecutor};
use crate::crew::lifecycle::ToolSession;
use crate::crew::task::{Task, TaskOutput};
use crate::error::ApiError;
use std::collections::HashMap;
use tracing::{error, info};

/// Placed between task outputs in the context handed to later tasks.
pub const CONTEXT_SEPARATOR: &str = "\n\n----------\n\n";

/// Runs tasks one after another, feeding each the outputs before it.
pub struct PipelineRunner<'a> {
    crew: &'a str,
    agents: &'a HashMap<String, Agent>,
    session: &'a ToolSession<'a>,
}

impl<'a> PipelineRunner<'a> {
    pub fn new(
        crew: &'a str,
        agents: &'a HashMap<String, Agent>,
        session: &'a ToolSession<'a>,
    ) -> Self {
        Self {
            crew,
            agents,
            session,
        }
    }

    /// Execute `tasks` in order. The first failure ends the run; later tasks
    /// are never started.
    pub async fn run(&self, tasks: &[Task]) -> Result<Vec<TaskOutput>, ApiError> {
        let mut outputs: Vec<TaskOutput> = Vec::with_capacity(tasks.len());
        for (index, task) in tasks.iter().enumerate() {
            let failed = |reason: String| ApiError::TaskFailed {
                task: task.name().to_string(),
                reason,
            };
            let agent = self
                .agents
                .get(task.agent())
                .ok_or_else(|| failed(format!("agent '{}' is not defined", task.agent())))?;
            let tools = self.session.tools_for(agent)?;
            let context = accumulated_context(&outputs);

            info!(
                crew = %self.crew,
                task = %task.name(),
                agent = %agent.name(),
                position = index + 1,
                total = tasks.len(),
                tools = tools.len(),
                "Task started"
            );

            let output = match AgentExecutor::new(agent, &tools)
                .execute(task, &context)
                .await
            {
                Ok(output) => output,
                Err(e) => {
                    error!(crew = %self.crew, task = %task.name(), error = %e, "Task failed");
                    return Err(match e {
                        e @ ApiError::TaskFailed { .. } => e,
                        other => failed(other.to_string()),
                    });
                }
            };

            info!(
                crew = %self.crew,
                task = %task.name(),
                duration_ms = output.duration_ms(),
                tool_calls = output.tool_calls,
                total_tokens = output.usage.total_tokens,
                "Task finished"
            );
            outputs.push(output);
        }
        Ok(outputs)
    }
}

/// Every previous answer, oldest first.
pub fn accumulated_context(outputs: &[TaskOutput]) -> String {
    outputs
        .iter()
        .map(|o| o.raw.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}
