//! OpenAI-compatible transport for self-hosted servers (Ollama's
//! `/v1/chat/completions`, llama.cpp, vLLM, LM Studio). Same wire format
//! as OpenAI, configurable base URL, API key optional.

use async_trait::async_trait;
use tracing::debug;

use crate::openai::{parse_chat_completion, shape_payload};
use crate::retry::send_with_retry;
use crate::{LlmError, LlmProvider, LlmRequest, LlmResponse};

#[derive(Debug, Clone)]
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    default_model: String,
}

impl OpenAiCompatProvider {
    pub fn new(base_url: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: None,
            default_model: default_model.into(),
        }
    }

    /// Local Ollama server at the conventional port.
    pub fn ollama(default_model: impl Into<String>) -> Self {
        let base = std::env::var("OLLAMA_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:11434".to_string());
        Self::new(format!("{}/v1", base.trim_end_matches('/')), default_model)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let model = request.model.as_deref().unwrap_or(&self.default_model);
        let payload = shape_payload(model, request);
        let endpoint = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        debug!(model, endpoint, "openai-compat request");

        let response = send_with_retry(|| {
            let mut req = self.client.post(&endpoint).json(&payload);
            if let Some(key) = &self.api_key {
                req = req.bearer_auth(key);
            }
            req.send()
        })
        .await?;

        let body: serde_json::Value = response.json().await?;
        parse_chat_completion(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ollama_base_url_has_v1_suffix() {
        let provider = OpenAiCompatProvider::ollama("llama3.1:8b");
        assert!(provider.base_url.ends_with("/v1"));
    }
}
