//! OpenAI-compatible chat-completions client.

use crate::error::ApiError;
use crate::provider::profile::ProviderConfig;
use crate::provider::{
    ChatMessage, CompletionOptions, CompletionRequest, CompletionResponse, MessageRole,
    ModelProviderClient, TokenUsage, ToolCall,
};
use crate::tools::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

const ERROR_BODY_EXCERPT: usize = 512;

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(flatten)]
    options: CompletionOptions,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: MessageRole,
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCallOut<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct WireToolCallOut<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionOut<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunctionOut<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireToolFunction<'a>,
}

#[derive(Debug, Serialize)]
struct WireToolFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
    #[serde(default)]
    error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCallIn>,
}

#[derive(Debug, Deserialize)]
struct WireToolCallIn {
    #[serde(default)]
    id: String,
    function: WireFunctionIn,
}

#[derive(Debug, Deserialize)]
struct WireFunctionIn {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(default)]
    message: String,
}

fn wire_message(message: &ChatMessage) -> WireMessage<'_> {
    WireMessage {
        role: message.role,
        content: message.content.as_deref(),
        tool_calls: message
            .tool_calls
            .iter()
            .map(|call| WireToolCallOut {
                id: &call.id,
                kind: "function",
                function: WireFunctionOut {
                    name: &call.name,
                    arguments: &call.arguments,
                },
            })
            .collect(),
        tool_call_id: message.tool_call_id.as_deref(),
    }
}

fn wire_tool(tool: &ToolDefinition) -> WireTool<'_> {
    WireTool {
        kind: "function",
        function: WireToolFunction {
            name: &tool.name,
            description: &tool.description,
            parameters: &tool.input_schema,
        },
    }
}

/// Request options take precedence over the provider defaults field by field.
fn merge_options(defaults: &CompletionOptions, request: &CompletionOptions) -> CompletionOptions {
    CompletionOptions {
        temperature: request.temperature.or(defaults.temperature),
        max_tokens: request.max_tokens.or(defaults.max_tokens),
        top_p: request.top_p.or(defaults.top_p),
    }
}

fn excerpt(body: &str) -> &str {
    match body.char_indices().nth(ERROR_BODY_EXCERPT) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// Decode a chat-completions response body.
fn parse_response(body: &str) -> Result<CompletionResponse, ApiError> {
    let parsed: WireResponse = serde_json::from_str(body).map_err(|e| {
        ApiError::ProviderError(format!(
            "Failed to parse completion response: {} (body: {})",
            e,
            excerpt(body)
        ))
    })?;

    if let Some(error) = parsed.error {
        return Err(ApiError::ProviderRequestFailed(error.message));
    }

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::ProviderError("Completion response has no choices".to_string()))?;

    let tool_calls = choice
        .message
        .tool_calls
        .into_iter()
        .enumerate()
        .map(|(index, call)| ToolCall {
            id: if call.id.is_empty() {
                format!("call_{}", index)
            } else {
                call.id
            },
            name: call.function.name,
            arguments: call.function.arguments,
        })
        .collect();

    let usage = parsed
        .usage
        .map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
            successful_requests: 1,
        })
        .unwrap_or(TokenUsage {
            successful_requests: 1,
            ..TokenUsage::default()
        });

    Ok(CompletionResponse {
        content: choice.message.content,
        tool_calls,
        usage,
    })
}

/// Client for any endpoint implementing `POST /chat/completions`.
pub struct OpenAiCompatibleClient {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl OpenAiCompatibleClient {
    pub fn new(config: ProviderConfig) -> Result<Self, ApiError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ApiError::ProviderError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { config, http })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'))
    }

    fn request_body<'a>(&'a self, request: &'a CompletionRequest) -> WireRequest<'a> {
        WireRequest {
            model: self.config.wire_model(),
            messages: request.messages.iter().map(wire_message).collect(),
            tools: request.tools.iter().map(wire_tool).collect(),
            options: merge_options(&self.config.default_options, &request.options),
        }
    }
}

#[async_trait]
impl ModelProviderClient for OpenAiCompatibleClient {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ApiError> {
        let body = self.request_body(&request);
        let started = Instant::now();
        let response = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::ProviderRequestFailed(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::ProviderRequestFailed(e.to_string()))?;

        debug!(
            model = %self.config.model,
            status = status.as_u16(),
            messages = request.messages.len(),
            tools = request.tools.len(),
            duration_ms = started.elapsed().as_millis(),
            "Completion request finished"
        );

        if !status.is_success() {
            return Err(ApiError::ProviderRequestFailed(format!(
                "HTTP {}: {}",
                status.as_u16(),
                excerpt(&text)
            )));
        }

        parse_response(&text)
    }
}
