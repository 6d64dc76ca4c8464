//! OpenAI chat-completions transport, with per-family request shaping:
//!
//! - o-series and the `gpt-5` base family take `max_completion_tokens`
//!   and reject `temperature`;
//! - `gpt-5.1` and later point releases take `max_completion_tokens` and
//!   accept `temperature`;
//! - every other chat model takes `max_tokens` and `temperature`.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::retry::send_with_retry;
use crate::{
    ChatMessage, ChatRole, LlmError, LlmProvider, LlmRequest, LlmResponse, StopReason, TokenUsage,
    env_api_key,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: default_model.into(),
        }
    }

    pub fn from_env(default_model: impl Into<String>) -> Result<Self, LlmError> {
        Ok(Self::new(env_api_key("OPENAI_API_KEY")?, default_model))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

fn is_o_series(model: &str) -> bool {
    for prefix in ["o1", "o3", "o4"] {
        if let Some(rest) = model.strip_prefix(prefix) {
            if rest.is_empty() || rest.starts_with('-') {
                return true;
            }
        }
    }
    false
}

fn is_gpt5_base(model: &str) -> bool {
    model == "gpt-5" || model.strip_prefix("gpt-5-").is_some()
}

fn is_gpt5_point_release(model: &str) -> bool {
    model.strip_prefix("gpt-5.").is_some()
}

/// Whether the model family takes `max_completion_tokens` instead of
/// `max_tokens`.
pub(crate) fn uses_completion_tokens(model: &str) -> bool {
    is_o_series(model) || is_gpt5_base(model) || is_gpt5_point_release(model)
}

/// Whether the model family rejects the `temperature` parameter.
pub(crate) fn omits_temperature(model: &str) -> bool {
    is_o_series(model) || is_gpt5_base(model)
}

pub(crate) fn to_openai_messages(messages: &[ChatMessage]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                ChatRole::System => "system",
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
            };
            json!({ "role": role, "content": m.content })
        })
        .collect()
}

pub(crate) fn parse_finish_reason(raw: Option<&str>) -> Option<StopReason> {
    match raw? {
        "stop" => Some(StopReason::EndTurn),
        "length" => Some(StopReason::MaxTokens),
        "content_filter" | "tool_calls" => None,
        _ => None,
    }
}

/// Parse an OpenAI-compatible chat-completions body into an [`LlmResponse`].
pub(crate) fn parse_chat_completion(body: &serde_json::Value) -> Result<LlmResponse, LlmError> {
    let choice = body
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| LlmError::Malformed(format!("no choices: {body}")))?;
    let content = choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let stop_reason = parse_finish_reason(choice.get("finish_reason").and_then(|v| v.as_str()));
    let usage = body.get("usage").map(|u| TokenUsage {
        input_tokens: u.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
        output_tokens: u.get("completion_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
    });
    Ok(LlmResponse { content, usage, stop_reason })
}

/// Build the request payload with family-appropriate token/temperature keys.
pub(crate) fn shape_payload(model: &str, request: &LlmRequest) -> serde_json::Value {
    let mut payload = json!({
        "model": model,
        "messages": to_openai_messages(&request.messages),
    });
    if let Some(max_tokens) = request.max_tokens {
        let key = if uses_completion_tokens(model) { "max_completion_tokens" } else { "max_tokens" };
        payload[key] = json!(max_tokens);
    }
    if let Some(temperature) = request.temperature {
        if !omits_temperature(model) {
            payload["temperature"] = json!(temperature);
        }
    }
    if !request.stop_sequences.is_empty() {
        payload["stop"] = json!(request.stop_sequences);
    }
    payload
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let model = request.model.as_deref().unwrap_or(&self.default_model);
        let payload = shape_payload(model, request);
        let endpoint = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        debug!(model, messages = request.messages.len(), "openai request");

        let response = send_with_retry(|| {
            self.client
                .post(&endpoint)
                .bearer_auth(&self.api_key)
                .json(&payload)
                .send()
        })
        .await?;

        let body: serde_json::Value = response.json().await?;
        parse_chat_completion(&body)
    }
}
