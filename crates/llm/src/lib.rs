//! LLM transport: chat message types, the single-method [`LlmProvider`]
//! contract, retry-with-backoff, and concrete providers for Anthropic,
//! OpenAI, OpenRouter, and OpenAI-compatible local servers, plus a
//! multi-model router that picks a sub-provider by model id.

pub mod anthropic;
pub mod compat;
pub mod openai;
pub mod openrouter;
pub mod retry;
pub mod router;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use anthropic::AnthropicProvider;
pub use compat::OpenAiCompatProvider;
pub use openai::OpenAiProvider;
pub use openrouter::OpenRouterProvider;
pub use router::ModelRouter;

// ── Chat message types ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into(), timestamp: Utc::now() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into(), timestamp: Utc::now() }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into(), timestamp: Utc::now() }
    }
}

// ── Request / response ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stop_sequences: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
}

#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub content: String,
    pub usage: Option<TokenUsage>,
    pub stop_reason: Option<StopReason>,
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("missing API key: set {0}")]
    MissingApiKey(&'static str),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed provider response: {0}")]
    Malformed(String),
    #[error("no provider routes model {0:?}")]
    Unroutable(String),
}

impl LlmError {
    /// Whether a retry could plausibly succeed. 429 and 5xx are retried;
    /// other HTTP statuses are not.
    pub fn is_retriable(&self) -> bool {
        match self {
            LlmError::Http { status, .. } => *status == 429 || *status >= 500,
            LlmError::Transport(_) => true,
            _ => false,
        }
    }
}

// ── Provider contract ─────────────────────────────────────────────────────────

/// Single-method contract every transport implements. Implementations retry
/// idempotently on 429/5xx with exponential backoff honoring `Retry-After`;
/// only the final failure propagates.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;
}

/// Read an API key from the environment, loading `.env` first.
pub(crate) fn env_api_key(var: &'static str) -> Result<String, LlmError> {
    dotenvy::dotenv().ok();
    std::env::var(var)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or(LlmError::MissingApiKey(var))
}
