//! One agent turn: prompt in, parsed blocks out, with the bounded recall
//! loop in between.
//!
//! The turn never propagates agent misbehavior: transport failures and
//! timeouts yield an empty outcome the orchestrator downgrades to HOLDs,
//! and a recall budget overrun strips the request and commits what stands.

use std::time::Duration;

use anyhow::Result;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, instrument, warn};

use backchannel_game::{PhaseId, Power};
use backchannel_llm::ChatMessage;
use backchannel_models::record_parse_failure;
use backchannel_session::{
    MAX_RECALL_CALLS_PER_TURN, SessionManager, execute_recall, format_recall, parse_recall,
    strip_recall,
};

use crate::parser::{AgentResponse, parse_agent_response};

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub power: Power,
    pub phase: PhaseId,
    pub raw: String,
    pub response: AgentResponse,
    pub recalls_served: usize,
    pub timed_out: bool,
    pub failed: bool,
}

impl TurnOutcome {
    fn empty(power: Power, phase: PhaseId, recalls_served: usize, timed_out: bool, failed: bool) -> Self {
        Self {
            power,
            phase,
            raw: String::new(),
            response: AgentResponse::default(),
            recalls_served,
            timed_out,
            failed,
        }
    }
}

/// Run one (power, phase) turn: append the composed prompt, call the LLM,
/// serve up to [`MAX_RECALL_CALLS_PER_TURN`] recall round-trips, and parse
/// the final response.
#[instrument(skip(sessions, prompt), fields(game = %sessions.game_id()))]
pub async fn run_agent_turn(
    sessions: &SessionManager,
    power: Power,
    phase: PhaseId,
    prompt: String,
    turn_timeout: Duration,
) -> Result<TurnOutcome> {
    let deadline = Instant::now() + turn_timeout;
    sessions.add_message(power, ChatMessage::user(prompt)).await?;

    let mut recalls_served = 0;
    loop {
        let completion = match timeout_at(deadline, sessions.chat(power)).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                let model = sessions.current_model(power).unwrap_or_default();
                warn!(%power, %model, %err, "LLM call failed; yielding empty turn");
                return Ok(TurnOutcome::empty(power, phase, recalls_served, false, true));
            }
            Err(_) => {
                warn!(%power, "agent turn timed out; yielding best-so-far (empty)");
                return Ok(TurnOutcome::empty(power, phase, recalls_served, true, false));
            }
        };

        if let Some(request) = parse_recall(&completion.content) {
            if recalls_served < MAX_RECALL_CALLS_PER_TURN {
                recalls_served += 1;
                let entries = {
                    let shared = sessions.memory_of(power).await?;
                    let memory = shared.read().await;
                    execute_recall(&memory, &request)
                };
                debug!(%power, round = recalls_served, hits = entries.len(), "recall served");
                sessions
                    .add_message(power, ChatMessage::user(format_recall(&entries)))
                    .await?;
                continue;
            }
            warn!(%power, "recall budget exhausted; stripping request");
        }

        let raw = strip_recall(&completion.content);
        let response = parse_agent_response(&raw);
        if !response.dropped_lines.is_empty() {
            let model = sessions.current_model(power).unwrap_or_default();
            record_parse_failure(sessions.game_id(), power, &model);
        }
        info!(
            %power,
            orders = response.orders.len(),
            sends = response.sends.len(),
            recalls = recalls_served,
            "agent turn complete"
        );
        return Ok(TurnOutcome {
            power,
            phase,
            raw,
            response,
            recalls_served,
            timed_out: false,
            failed: false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use backchannel_config::PersonaConfig;
    use backchannel_game::{PhaseKind, Season};
    use backchannel_llm::{LlmError, LlmProvider, LlmRequest, LlmResponse};
    use backchannel_memory::diary::add_orders_entry;
    use backchannel_memory::{InMemoryStore, MemoryManager};
    use backchannel_models::{ModelDefinition, ModelRegistry, ModelTier};

    struct Scripted {
        replies: Mutex<Vec<String>>,
        calls: Mutex<usize>,
    }

    impl Scripted {
        fn new(replies: Vec<&str>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().rev().map(String::from).collect()),
                calls: Mutex::new(0),
            })
        }
        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl LlmProvider for Scripted {
        async fn complete(&self, _request: &LlmRequest) -> Result<LlmResponse, LlmError> {
            *self.calls.lock().unwrap() += 1;
            let content = self
                .replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| "RECALL: phase=S1901M type=orders".to_string());
            Ok(LlmResponse { content, usage: None, stop_reason: None })
        }
    }

    struct Failing;

    #[async_trait]
    impl LlmProvider for Failing {
        async fn complete(&self, _request: &LlmRequest) -> Result<LlmResponse, LlmError> {
            Err(LlmError::Http { status: 400, body: "bad request".into() })
        }
    }

    async fn sessions_with(provider: Arc<dyn LlmProvider>) -> SessionManager {
        let mut registry = ModelRegistry::new();
        registry.register_model(ModelDefinition {
            id: "m".into(),
            provider: "test".into(),
            cost_per_input_token: 0.0,
            cost_per_output_token: 0.0,
            max_context_tokens: 100_000,
            daily_token_limit: 0,
            tier: ModelTier::Standard,
        });
        registry.assign_model_to_power(Power::England, "m", None).unwrap();

        let manager = SessionManager::new(
            "turn-test",
            20,
            Arc::new(MemoryManager::new(Arc::new(InMemoryStore::new()))),
            Arc::new(Mutex::new(registry)),
            provider,
        );
        manager
            .create_session(Power::England, PersonaConfig::default())
            .await
            .unwrap();
        manager
    }

    fn phase() -> PhaseId {
        PhaseId::new(1901, Season::Spring, PhaseKind::Movement)
    }

    #[tokio::test]
    async fn recall_then_orders_commits_orders() {
        // Scenario S4: one recall round-trip, then an ORDERS block.
        let provider = Scripted::new(vec![
            "RECALL: phase=S1901M type=orders",
            "ORDERS:\nA PAR HOLD",
        ]);
        let sessions = sessions_with(provider.clone()).await;

        // Seed the diary so the recall has something to return.
        {
            let shared = sessions.memory_of(Power::England).await.unwrap();
            add_orders_entry(&mut *shared.write().await, phase(), "held the line");
        }

        let outcome =
            run_agent_turn(&sessions, Power::England, phase(), "go".into(), Duration::from_secs(30))
                .await
                .unwrap();

        assert_eq!(outcome.recalls_served, 1);
        assert_eq!(outcome.response.orders.len(), 1);
        assert_eq!(provider.calls(), 2);

        // The recall result was injected into the conversation.
        let history = sessions.history(Power::England).await.unwrap();
        assert!(history.iter().any(|m| m.content.starts_with("RECALL RESULT:")));
    }

    #[tokio::test]
    async fn recall_budget_is_three() {
        // A model that answers every prompt with another RECALL gets three
        // served, then its fourth response is stripped and committed.
        let provider = Scripted::new(vec![]);
        let sessions = sessions_with(provider.clone()).await;

        let outcome =
            run_agent_turn(&sessions, Power::England, phase(), "go".into(), Duration::from_secs(30))
                .await
                .unwrap();

        assert_eq!(outcome.recalls_served, MAX_RECALL_CALLS_PER_TURN);
        assert_eq!(provider.calls(), MAX_RECALL_CALLS_PER_TURN + 1);
        assert!(outcome.response.is_empty());
        assert!(!outcome.raw.contains("RECALL"));
    }

    #[tokio::test]
    async fn transport_failure_yields_empty_outcome() {
        let sessions = sessions_with(Arc::new(Failing)).await;
        let outcome =
            run_agent_turn(&sessions, Power::England, phase(), "go".into(), Duration::from_secs(5))
                .await
                .unwrap();
        assert!(outcome.failed);
        assert!(outcome.response.is_empty());
    }

    #[tokio::test]
    async fn timeout_yields_empty_outcome() {
        struct Hanging;
        #[async_trait]
        impl LlmProvider for Hanging {
            async fn complete(&self, _request: &LlmRequest) -> Result<LlmResponse, LlmError> {
                tokio::time::sleep(Duration::from_secs(600)).await;
                unreachable!()
            }
        }

        let sessions = sessions_with(Arc::new(Hanging)).await;
        let start = std::time::Instant::now();
        let outcome =
            run_agent_turn(&sessions, Power::England, phase(), "go".into(), Duration::from_millis(50))
                .await
                .unwrap();
        assert!(outcome.timed_out);
        assert!(outcome.response.is_empty());
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
