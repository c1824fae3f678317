use std::fmt;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ApiKey, ConfigError, EffectiveConfig, ModelParameters};

pub const API_VERSION: &str = "2023-06-01";
pub const WEB_SEARCH_TOOL_TYPE: &str = "web_search_20250305";

/// Follow-up sent when the model stops to request a client-side tool.
const CONTINUE_PROMPT: &str = "Please provide the complete schedules based on your search results.";

/// One logical request: a prompt and a label for log lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub label: String,
    pub prompt: String,
}

impl CompletionRequest {
    pub fn new(label: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            prompt: prompt.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    RateLimited,
    Overloaded,
    Server,
    Authentication,
    InvalidRequest,
    Transport,
    InvalidResponse,
}

impl GatewayErrorKind {
    pub fn is_retriable(self) -> bool {
        matches!(
            self,
            GatewayErrorKind::RateLimited
                | GatewayErrorKind::Overloaded
                | GatewayErrorKind::Server
                | GatewayErrorKind::Transport
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GatewayErrorKind::RateLimited => "rate limited",
            GatewayErrorKind::Overloaded => "overloaded",
            GatewayErrorKind::Server => "server error",
            GatewayErrorKind::Authentication => "authentication failed",
            GatewayErrorKind::InvalidRequest => "invalid request",
            GatewayErrorKind::Transport => "transport error",
            GatewayErrorKind::InvalidResponse => "invalid response",
        }
    }
}

impl fmt::Display for GatewayErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider failure. `retriable` is advisory; nothing in the crate retries.
#[derive(Debug, Clone, Error)]
#[error("completion provider {kind}: {message}")]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub retriable: bool,
    pub message: String,
}

impl GatewayError {
    pub fn new(kind: GatewayErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            retriable: kind.is_retriable(),
            message: message.into(),
        }
    }
}

/// Turns a prompt into response text.
pub trait CompletionGateway {
    fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError>;
}

impl<G: CompletionGateway + ?Sized> CompletionGateway for &G {
    fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
        (**self).complete(request)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: &'static str,
    pub content: Value,
}

impl Message {
    pub fn user(text: &str) -> Self {
        Self {
            role: "user",
            content: Value::String(text.to_string()),
        }
    }

    pub fn assistant(content: Vec<Value>) -> Self {
        Self {
            role: "assistant",
            content: Value::Array(content),
        }
    }
}

#[derive(Debug, Serialize)]
struct ThinkingConfig {
    #[serde(rename = "type")]
    kind: &'static str,
    budget_tokens: u32,
}

#[derive(Debug, Serialize)]
struct WebSearchTool {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'static str,
    max_uses: u32,
}

#[derive(Debug, Serialize)]
pub struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<ThinkingConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WebSearchTool>,
    messages: &'a [Message],
}

pub fn build_request_body<'a>(
    params: &'a ModelParameters,
    messages: &'a [Message],
) -> MessagesRequest<'a> {
    let thinking = (params.thinking_budget_tokens > 0).then(|| ThinkingConfig {
        kind: "enabled",
        budget_tokens: params.thinking_budget_tokens,
    });
    let tools = if params.web_search_max_uses > 0 {
        vec![WebSearchTool {
            kind: WEB_SEARCH_TOOL_TYPE,
            name: "web_search",
            max_uses: params.web_search_max_uses,
        }]
    } else {
        Vec::new()
    };

    MessagesRequest {
        model: &params.model,
        max_tokens: params.max_tokens,
        temperature: params.temperature,
        thinking,
        tools,
        messages,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub content: Vec<Value>,
}

impl MessagesResponse {
    /// Concatenated text blocks, in order. Thinking and tool blocks are skipped.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn count_blocks(&self, kind: &str) -> usize {
        self.content
            .iter()
            .filter(|block| block.get("type").and_then(Value::as_str) == Some(kind))
            .count()
    }
}

pub fn parse_response(body: &str) -> Result<MessagesResponse, GatewayError> {
    serde_json::from_str(body).map_err(|err| {
        GatewayError::new(
            GatewayErrorKind::InvalidResponse,
            format!("response body is not a messages object: {err}"),
        )
    })
}

/// Map a non-success HTTP status and its body to a gateway error.
pub fn classify_status(status: u16, body: &str) -> GatewayError {
    let kind = match status {
        429 => GatewayErrorKind::RateLimited,
        529 => GatewayErrorKind::Overloaded,
        401 | 403 => GatewayErrorKind::Authentication,
        500..=599 => GatewayErrorKind::Server,
        _ => GatewayErrorKind::InvalidRequest,
    };
    GatewayError::new(kind, format!("HTTP {status}: {}", error_message(body)))
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "empty response body".to_string()
            } else {
                trimmed.chars().take(500).collect()
            }
        })
}

/// Messages API client with web search and optional extended thinking.
#[derive(Debug, Clone)]
pub struct AnthropicGateway {
    client: Client,
    api_url: String,
    api_key: ApiKey,
    params: ModelParameters,
}

impl AnthropicGateway {
    /// Fails when no API key was resolved, before any topic starts.
    pub fn new(config: &EffectiveConfig) -> Result<Self, ConfigError> {
        let api_key = config.api_key.clone().ok_or(ConfigError::MissingApiKey)?;
        let client = Client::builder()
            .timeout(config.model.request_timeout)
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            params: config.model.clone(),
        })
    }

    fn send(&self, messages: &[Message]) -> Result<MessagesResponse, GatewayError> {
        let body = build_request_body(&self.params, messages);
        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", self.api_key.expose())
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .map_err(|err| GatewayError::new(GatewayErrorKind::Transport, err.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|err| GatewayError::new(GatewayErrorKind::Transport, err.to_string()))?;

        if !status.is_success() {
            return Err(classify_status(status.as_u16(), &text));
        }
        parse_response(&text)
    }
}

impl CompletionGateway for AnthropicGateway {
    fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
        let max_iterations = self.params.max_iterations.max(1);
        let mut messages = vec![Message::user(&request.prompt)];
        let mut last = None;

        for iteration in 1..=max_iterations {
            info!(
                label = %request.label,
                model = %self.params.model,
                iteration,
                max_iterations,
                "Calling completion API"
            );
            let response = self.send(&messages)?;
            let stop_reason = response.stop_reason.clone().unwrap_or_default();
            debug!(
                label = %request.label,
                id = response.id.as_deref().unwrap_or("-"),
                stop_reason = %stop_reason,
                "Completion API responded"
            );

            match stop_reason.as_str() {
                "pause_turn" => {
                    info!(label = %request.label, "Provider paused a long turn; continuing");
                    messages.push(Message::assistant(response.content.clone()));
                }
                "tool_use" => {
                    info!(
                        label = %request.label,
                        tool_uses = response.count_blocks("tool_use"),
                        "Provider requested tool use; continuing"
                    );
                    messages.push(Message::assistant(response.content.clone()));
                    messages.push(Message::user(CONTINUE_PROMPT));
                }
                "end_turn" | "max_tokens" | "stop_sequence" => {
                    return finish(request, &response);
                }
                other => {
                    warn!(label = %request.label, stop_reason = %other, "Unexpected stop reason");
                    return finish(request, &response);
                }
            }
            last = Some(response);
        }

        warn!(
            label = %request.label,
            max_iterations,
            "Exceeded maximum iterations; using the last response"
        );
        match last {
            Some(response) => finish(request, &response),
            None => Err(GatewayError::new(
                GatewayErrorKind::InvalidResponse,
                "no response received",
            )),
        }
    }
}

fn finish(request: &CompletionRequest, response: &MessagesResponse) -> Result<String, GatewayError> {
    if response.stop_reason.as_deref() == Some("max_tokens") {
        warn!(label = %request.label, "Response was truncated at max_tokens");
    }
    let text = response.text();
    if text.trim().is_empty() {
        return Err(GatewayError::new(
            GatewayErrorKind::InvalidResponse,
            "response contained no text",
        ));
    }
    Ok(text)
}
