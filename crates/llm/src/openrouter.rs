//! OpenRouter transport — OpenAI-compatible chat completions with the
//! OpenRouter attribution headers.

use async_trait::async_trait;
use tracing::debug;

use crate::openai::{parse_chat_completion, shape_payload};
use crate::retry::send_with_retry;
use crate::{LlmError, LlmProvider, LlmRequest, LlmResponse, env_api_key};

const BASE_URL: &str = "https://openrouter.ai/api/v1";

#[derive(Debug, Clone)]
pub struct OpenRouterProvider {
    client: reqwest::Client,
    api_key: String,
    default_model: String,
}

impl OpenRouterProvider {
    pub fn new(api_key: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            default_model: default_model.into(),
        }
    }

    pub fn from_env(default_model: impl Into<String>) -> Result<Self, LlmError> {
        Ok(Self::new(env_api_key("OPENROUTER_API_KEY")?, default_model))
    }
}

#[async_trait]
impl LlmProvider for OpenRouterProvider {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let model = request.model.as_deref().unwrap_or(&self.default_model);
        let payload = shape_payload(model, request);
        debug!(model, messages = request.messages.len(), "openrouter request");

        let response = send_with_retry(|| {
            self.client
                .post(format!("{BASE_URL}/chat/completions"))
                .bearer_auth(&self.api_key)
                .header("HTTP-Referer", "https://backchannel.local")
                .header("X-Title", "Backchannel")
                .json(&payload)
                .send()
        })
        .await?;

        let body: serde_json::Value = response.json().await?;
        parse_chat_completion(&body)
    }
}
