//! Fakes shared by the integration tests.

use async_trait::async_trait;
use nextvuln::error::ApiError;
use nextvuln::provider::{
    CompletionRequest, CompletionResponse, MessageRole, ModelProviderClient, TokenUsage, ToolCall,
};
use nextvuln::tools::{Tool, ToolDefinition, ToolOutput, ToolProvider};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

type Responder = dyn Fn(&CompletionRequest, usize) -> Result<CompletionResponse, ApiError> + Send + Sync;

/// Model whose replies come from a closure; every request is recorded.
pub struct ScriptedModel {
    requests: Mutex<Vec<CompletionRequest>>,
    respond: Box<Responder>,
}

impl ScriptedModel {
    pub fn new<F>(respond: F) -> Arc<Self>
    where
        F: Fn(&CompletionRequest, usize) -> Result<CompletionResponse, ApiError>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        })
    }

    /// Answers every request with "done: <task description>".
    pub fn echo() -> Arc<Self> {
        Self::new(|request, _| Ok(answer(&format!("done: {}", task_of(request)))))
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    /// Task descriptions in the order the model first saw them.
    pub fn tasks_seen(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for request in self.requests.lock().iter() {
            let task = task_of(request);
            if seen.last() != Some(&task) {
                seen.push(task);
            }
        }
        seen
    }
}

#[async_trait]
impl ModelProviderClient for ScriptedModel {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ApiError> {
        let index = {
            let mut requests = self.requests.lock();
            requests.push(request.clone());
            requests.len() - 1
        };
        (self.respond)(&request, index)
    }
}

/// Text of the user prompt.
pub fn user_prompt(request: &CompletionRequest) -> String {
    request
        .messages
        .iter()
        .find(|m| m.role == MessageRole::User)
        .and_then(|m| m.content.clone())
        .unwrap_or_default()
}

pub fn system_prompt(request: &CompletionRequest) -> String {
    request
        .messages
        .iter()
        .find(|m| m.role == MessageRole::System)
        .and_then(|m| m.content.clone())
        .unwrap_or_default()
}

/// The task description, taken from the "Current Task:" line.
pub fn task_of(request: &CompletionRequest) -> String {
    user_prompt(request)
        .lines()
        .find_map(|l| l.strip_prefix("Current Task: "))
        .unwrap_or_default()
        .to_string()
}

/// Tool results the model has been given so far.
pub fn observations(request: &CompletionRequest) -> Vec<String> {
    request
        .messages
        .iter()
        .filter(|m| m.role == MessageRole::Tool)
        .filter_map(|m| m.content.clone())
        .collect()
}

pub fn answer(text: &str) -> CompletionResponse {
    CompletionResponse {
        content: Some(text.to_string()),
        tool_calls: Vec::new(),
        usage: TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
            successful_requests: 1,
        },
    }
}

pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> CompletionResponse {
    CompletionResponse {
        content: None,
        tool_calls: vec![ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }],
        usage: TokenUsage {
            total_tokens: 1,
            successful_requests: 1,
            ..TokenUsage::default()
        },
    }
}

/// Shared record of provider lifecycle events, e.g. "start:a", "stop:a",
/// "abort:a".
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, event: String) {
        self.0.lock().push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

/// Provider counting its starts and stops, exposing one echo tool.
pub struct CountingProvider {
    name: String,
    pub starts: Arc<AtomicUsize>,
    pub stops: Arc<AtomicUsize>,
    journal: Journal,
    fail_start: bool,
    fail_stop: bool,
    start_delay: Option<Duration>,
}

impl CountingProvider {
    pub fn new(name: &str, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            starts: Arc::new(AtomicUsize::new(0)),
            stops: Arc::new(AtomicUsize::new(0)),
            journal: journal.clone(),
            fail_start: false,
            fail_stop: false,
            start_delay: None,
        }
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    /// Sleep this long inside `start`, after journaling it.
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }

    /// Start and stop counters, readable after the provider is boxed.
    pub fn counters(&self) -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        (Arc::clone(&self.starts), Arc::clone(&self.stops))
    }
}

#[async_trait]
impl ToolProvider for CountingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&mut self) -> Result<Vec<Arc<dyn Tool>>, ApiError> {
        self.journal.push(format!("start:{}", self.name));
        if let Some(delay) = self.start_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_start {
            return Err(ApiError::ToolProviderStart {
                name: self.name.clone(),
                reason: "refused".to_string(),
            });
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(vec![Arc::new(EchoTool::named(&format!("{}_echo", self.name)))])
    }

    async fn stop(&mut self) -> Result<(), ApiError> {
        self.journal.push(format!("stop:{}", self.name));
        self.stops.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop {
            return Err(ApiError::tool_provider(self.name.clone(), "stop failed"));
        }
        Ok(())
    }

    fn abort(&mut self) {
        self.journal.push(format!("abort:{}", self.name));
    }
}

/// Returns its arguments as text; `{"fail": true}` reports a tool error.
pub struct EchoTool {
    definition: ToolDefinition,
}

impl EchoTool {
    pub fn named(name: &str) -> Self {
        Self {
            definition: ToolDefinition {
                name: name.to_string(),
                description: "Echo the arguments".to_string(),
                input_schema: json!({"type": "object"}),
            },
        }
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn call(&self, arguments: serde_json::Value) -> Result<ToolOutput, ApiError> {
        if arguments.get("fail").and_then(|v| v.as_bool()) == Some(true) {
            return Ok(ToolOutput::error("echo refused"));
        }
        Ok(ToolOutput::text(format!("echo {}", arguments)))
    }
}

pub fn count(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}
