//! The tool-call loop that turns one task into one answer.

use crate::agent::prompt::{build_system_prompt, build_user_prompt, FINAL_ANSWER_NUDGE};
use crate::agent::Agent;
use crate::crew::task::{Task, TaskOutput};
use crate::error::ApiError;
use crate::provider::{ChatMessage, CompletionRequest, CompletionResponse, TokenUsage, ToolCall};
use crate::tools::ToolSet;
use chrono::Utc;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Runs one agent on one task.
pub struct AgentExecutor<'a> {
    agent: &'a Agent,
    tools: &'a ToolSet,
}

impl<'a> AgentExecutor<'a> {
    pub fn new(agent: &'a Agent, tools: &'a ToolSet) -> Self {
        Self { agent, tools }
    }

    /// Converse with the model until it gives a final answer.
    ///
    /// Tool failures the model can react to are fed back as observations.
    /// Model transport failures and tool transport failures abort.
    pub async fn execute(&self, task: &Task, context: &str) -> Result<TaskOutput, ApiError> {
        let started_at = Utc::now();
        let agent = self.agent;
        let mut messages = vec![
            ChatMessage::system(build_system_prompt(
                agent.role(),
                agent.goal(),
                agent.backstory(),
                !self.tools.is_empty(),
            )),
            ChatMessage::user(build_user_prompt(
                task.description(),
                task.expected_output(),
                context,
            )),
        ];
        let definitions = self.tools.definitions();
        let mut usage = TokenUsage::default();
        let mut tool_calls = 0usize;

        for round in 1..=agent.max_iterations() {
            let request = CompletionRequest::new(messages.clone()).with_tools(definitions.clone());
            let response = self.complete(request, &mut usage).await?;

            if response.tool_calls.is_empty() {
                debug!(agent = %agent.name(), task = %task.name(), round, "Final answer received");
                return self.finish(task, response, usage, tool_calls, started_at);
            }

            messages.push(ChatMessage::assistant_tool_calls(
                response.content.clone(),
                response.tool_calls.clone(),
            ));
            for call in &response.tool_calls {
                let observation = self.invoke(call).await?;
                tool_calls += 1;
                messages.push(ChatMessage::tool_result(call.id.clone(), observation));
            }
        }

        warn!(
            agent = %agent.name(),
            task = %task.name(),
            max_iterations = agent.max_iterations(),
            "Tool iteration limit reached, forcing final answer"
        );
        messages.push(ChatMessage::user(FINAL_ANSWER_NUDGE));
        let response = self
            .complete(CompletionRequest::new(messages), &mut usage)
            .await?;
        self.finish(task, response, usage, tool_calls, started_at)
    }

    async fn complete(
        &self,
        request: CompletionRequest,
        usage: &mut TokenUsage,
    ) -> Result<CompletionResponse, ApiError> {
        let response = self.agent.llm().complete(request).await?;
        usage.add(&response.usage);
        Ok(response)
    }

    fn finish(
        &self,
        task: &Task,
        response: CompletionResponse,
        usage: TokenUsage,
        tool_calls: usize,
        started_at: chrono::DateTime<Utc>,
    ) -> Result<TaskOutput, ApiError> {
        let raw = response
            .content
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ApiError::TaskFailed {
                task: task.name().to_string(),
                reason: "model returned an empty final answer".to_string(),
            })?;
        Ok(TaskOutput {
            task: task.name().to_string(),
            agent: self.agent.name().to_string(),
            description: task.description().to_string(),
            expected_output: task.expected_output().to_string(),
            raw,
            started_at,
            finished_at: Utc::now(),
            usage,
            tool_calls,
        })
    }

    /// Run one requested tool call and describe the result for the model.
    async fn invoke(&self, call: &ToolCall) -> Result<String, ApiError> {
        let Some(tool) = self.tools.get(&call.name) else {
            warn!(agent = %self.agent.name(), tool = %call.name, "Model requested unknown tool");
            let available = self.tools.names().join(", ");
            return Ok(format!(
                "Error: tool '{}' does not exist. Available tools: {}",
                call.name,
                if available.is_empty() { "none" } else { available.as_str() }
            ));
        };

        let arguments = match parse_arguments(&call.arguments) {
            Ok(arguments) => arguments,
            Err(e) => {
                warn!(agent = %self.agent.name(), tool = %call.name, error = %e, "Malformed tool arguments");
                return Ok(format!(
                    "Error: arguments for tool '{}' are not a valid JSON object: {}",
                    call.name, e
                ));
            }
        };

        let started = Instant::now();
        let output = tool.call(arguments).await?;
        info!(
            agent = %self.agent.name(),
            tool = %call.name,
            is_error = output.is_error,
            output_bytes = output.text.len(),
            duration_ms = started.elapsed().as_millis(),
            "Tool call finished"
        );
        Ok(if output.is_error {
            format!("Error: {}", output.text)
        } else {
            output.text
        })
    }
}

/// Tool arguments as a JSON object; an empty string means no arguments.
fn parse_arguments(raw: &str) -> Result<Value, String> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(other) => Err(format!("expected an object, got {}", other)),
        Err(e) => Err(e.to_string()),
    }
}
