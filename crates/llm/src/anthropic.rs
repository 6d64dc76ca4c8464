//! Anthropic Messages API transport.
//!
//! The Messages API takes the system prompt as a top-level `system` field,
//! not as a conversation message, so a leading system message is lifted out
//! and the remainder passed as the conversation array.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::retry::send_with_retry;
use crate::{
    ChatMessage, ChatRole, LlmError, LlmProvider, LlmRequest, LlmResponse, StopReason, TokenUsage,
    env_api_key,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: default_model.into(),
        }
    }

    /// Build from `ANTHROPIC_API_KEY` (reads `.env` first).
    pub fn from_env(default_model: impl Into<String>) -> Result<Self, LlmError> {
        Ok(Self::new(env_api_key("ANTHROPIC_API_KEY")?, default_model))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Split a leading system message from the conversation.
fn split_system(messages: &[ChatMessage]) -> (Option<&str>, &[ChatMessage]) {
    match messages.first() {
        Some(first) if first.role == ChatRole::System => {
            (Some(first.content.as_str()), &messages[1..])
        }
        _ => (None, messages),
    }
}

fn to_conversation(messages: &[ChatMessage]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                ChatRole::Assistant => "assistant",
                // A mid-conversation system message has no Anthropic
                // equivalent; fold it into the user stream.
                ChatRole::User | ChatRole::System => "user",
            };
            json!({ "role": role, "content": m.content })
        })
        .collect()
}

fn parse_stop_reason(raw: Option<&str>) -> Option<StopReason> {
    match raw? {
        "end_turn" => Some(StopReason::EndTurn),
        "max_tokens" => Some(StopReason::MaxTokens),
        "stop_sequence" => Some(StopReason::StopSequence),
        _ => None,
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let model = request.model.as_deref().unwrap_or(&self.default_model);
        let (system, conversation) = split_system(&request.messages);

        let mut payload = json!({
            "model": model,
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": to_conversation(conversation),
        });
        if let Some(system) = system {
            payload["system"] = json!(system);
        }
        if let Some(temperature) = request.temperature {
            payload["temperature"] = json!(temperature);
        }
        if !request.stop_sequences.is_empty() {
            payload["stop_sequences"] = json!(request.stop_sequences);
        }

        let endpoint = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        debug!(model, messages = conversation.len(), "anthropic request");

        let response = send_with_retry(|| {
            self.client
                .post(&endpoint)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
                .json(&payload)
                .send()
        })
        .await?;

        let body: serde_json::Value = response.json().await?;
        let content = body
            .get("content")
            .and_then(|c| c.as_array())
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .ok_or_else(|| LlmError::Malformed(format!("no content blocks: {body}")))?;

        let usage = body.get("usage").map(|u| TokenUsage {
            input_tokens: u.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
            output_tokens: u.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
        });
        let stop_reason = parse_stop_reason(body.get("stop_reason").and_then(|v| v.as_str()));

        Ok(LlmResponse { content, usage, stop_reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_system_is_lifted() {
        let messages = vec![
            ChatMessage::system("persona"),
            ChatMessage::user("hello"),
            ChatMessage::assistant("hi"),
        ];
        let (system, rest) = split_system(&messages);
        assert_eq!(system, Some("persona"));
        assert_eq!(rest.len(), 2);

        let conv = to_conversation(rest);
        assert_eq!(conv[0]["role"], "user");
        assert_eq!(conv[1]["role"], "assistant");
    }

    #[test]
    fn no_system_message_passes_through() {
        let messages = vec![ChatMessage::user("hello")];
        let (system, rest) = split_system(&messages);
        assert_eq!(system, None);
        assert_eq!(rest.len(), 1);
    }

    #[test]
    fn stop_reasons_map() {
        assert_eq!(parse_stop_reason(Some("end_turn")), Some(StopReason::EndTurn));
        assert_eq!(parse_stop_reason(Some("max_tokens")), Some(StopReason::MaxTokens));
        assert_eq!(parse_stop_reason(Some("stop_sequence")), Some(StopReason::StopSequence));
        assert_eq!(parse_stop_reason(Some("tool_use")), None);
        assert_eq!(parse_stop_reason(None), None);
    }
}
