//! Multi-model router: picks a sub-provider by model-id prefix, with a
//! default fallback. A composition of providers, not a subtype — callers
//! hold it behind the same [`LlmProvider`] trait object as any single
//! transport.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::{LlmError, LlmProvider, LlmRequest, LlmResponse};

pub struct ModelRouter {
    /// Longest-prefix-wins routes, checked in registration order.
    routes: Vec<(String, Arc<dyn LlmProvider>)>,
    default: Arc<dyn LlmProvider>,
}

impl ModelRouter {
    pub fn new(default: Arc<dyn LlmProvider>) -> Self {
        Self { routes: Vec::new(), default }
    }

    /// Route every model id starting with `prefix` to `provider`.
    pub fn with_route(mut self, prefix: impl Into<String>, provider: Arc<dyn LlmProvider>) -> Self {
        self.routes.push((prefix.into(), provider));
        self
    }

    fn provider_for(&self, model: Option<&str>) -> &Arc<dyn LlmProvider> {
        let Some(model) = model else { return &self.default };
        self.routes
            .iter()
            .filter(|(prefix, _)| model.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, provider)| provider)
            .unwrap_or(&self.default)
    }
}

#[async_trait]
impl LlmProvider for ModelRouter {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let model = request.model.as_deref();
        debug!(?model, "routing LLM request");
        self.provider_for(model).complete(request).await
    }
}
