//! Session lifecycle and LLM dispatch.
//!
//! One session per power. The manager owns no memory — it borrows shared
//! records from the [`MemoryManager`] — and routes every completion through
//! the model registry so budget exhaustion silently downgrades to the
//! fallback model.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use backchannel_config::PersonaConfig;
use backchannel_game::Power;
use backchannel_llm::{ChatMessage, LlmProvider, LlmRequest, LlmResponse};
use backchannel_memory::MemoryManager;
use backchannel_memory::manager::SharedMemory;
use backchannel_models::ModelRegistry;

use crate::window::enforce_window;

#[derive(Debug, Clone)]
pub struct AgentSession {
    pub id: Uuid,
    pub power: Power,
    pub persona: PersonaConfig,
    pub history: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub active: bool,
}

pub struct SessionManager {
    game_id: String,
    max_history: usize,
    memory: Arc<MemoryManager>,
    registry: Arc<Mutex<ModelRegistry>>,
    provider: Arc<dyn LlmProvider>,
    sessions: RwLock<HashMap<Power, AgentSession>>,
}

impl SessionManager {
    pub fn new(
        game_id: impl Into<String>,
        max_history: usize,
        memory: Arc<MemoryManager>,
        registry: Arc<Mutex<ModelRegistry>>,
        provider: Arc<dyn LlmProvider>,
    ) -> Self {
        Self {
            game_id: game_id.into(),
            max_history,
            memory,
            registry,
            provider,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    /// Create one session: load (or initialize) the power's memory and seed
    /// the system message from its persona.
    pub async fn create_session(&self, power: Power, persona: PersonaConfig) -> Result<()> {
        // Ensure the memory record exists before the first turn.
        self.memory
            .get_memory(power, &self.game_id)
            .await
            .with_context(|| format!("load memory for {power}"))?;

        let system = format!(
            "You are {power} in a game of Diplomacy.\n\nPERSONALITY:\n{}\n\nSTRATEGY:\n{}",
            persona.personality, persona.strategy
        );
        let now = Utc::now();
        let session = AgentSession {
            id: Uuid::new_v4(),
            power,
            persona,
            history: vec![ChatMessage::system(system)],
            created_at: now,
            last_active: now,
            active: true,
        };
        info!(%power, session = %session.id, "session created");
        self.sessions.write().await.insert(power, session);
        Ok(())
    }

    /// Create sessions for all seven powers; missing personas get defaults.
    pub async fn create_all_sessions(
        &self,
        personas: &std::collections::BTreeMap<Power, PersonaConfig>,
    ) -> Result<()> {
        for power in Power::ALL {
            let persona = personas.get(&power).cloned().unwrap_or_default();
            self.create_session(power, persona).await?;
        }
        Ok(())
    }

    /// Shared memory handle for a power's agent.
    pub async fn memory_of(&self, power: Power) -> Result<SharedMemory> {
        Ok(self.memory.get_memory(power, &self.game_id).await?)
    }

    pub fn memory_manager(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    /// Stamp and append a message, then enforce the sliding window.
    pub async fn add_message(&self, power: Power, mut message: ChatMessage) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(&power) else {
            bail!("no session for {power}");
        };
        message.timestamp = Utc::now();
        session.history.push(message);
        session.last_active = Utc::now();
        enforce_window(&mut session.history, self.max_history);
        Ok(())
    }

    pub async fn history(&self, power: Power) -> Result<Vec<ChatMessage>> {
        let sessions = self.sessions.read().await;
        let Some(session) = sessions.get(&power) else {
            bail!("no session for {power}");
        };
        Ok(session.history.clone())
    }

    /// Resolve the power's model through the registry, run the completion
    /// over the current conversation, record usage, and append the
    /// assistant's reply to the history.
    #[instrument(skip(self), fields(game = %self.game_id))]
    pub async fn chat(&self, power: Power) -> Result<LlmResponse> {
        let (messages, temperature, max_tokens) = {
            let sessions = self.sessions.read().await;
            let Some(session) = sessions.get(&power) else {
                bail!("no session for {power}");
            };
            (
                session.history.clone(),
                session.persona.temperature,
                session.persona.max_tokens,
            )
        };

        let model = {
            let mut registry = self.registry.lock().unwrap_or_else(|p| p.into_inner());
            registry.resolve_model_for_power(power)
        };
        debug!(%power, ?model, messages = messages.len(), "dispatching LLM call");

        let request = LlmRequest {
            messages,
            model: model.clone(),
            temperature: Some(temperature),
            max_tokens: Some(max_tokens),
            stop_sequences: Vec::new(),
        };
        let response = self.provider.complete(&request).await?;

        if let (Some(model), Some(usage)) = (&model, &response.usage) {
            let mut registry = self.registry.lock().unwrap_or_else(|p| p.into_inner());
            registry.record_usage(model, usage.input_tokens, usage.output_tokens);
            backchannel_models::record_request(
                &self.game_id,
                power,
                model,
                usage.input_tokens,
                usage.output_tokens,
            );
        }

        self.add_message(power, ChatMessage::assistant(response.content.clone()))
            .await?;
        Ok(response)
    }

    /// The model id the power's next call would use (for error tagging).
    pub fn current_model(&self, power: Power) -> Option<String> {
        let mut registry = self.registry.lock().unwrap_or_else(|p| p.into_inner());
        registry.resolve_model_for_power(power)
    }

    pub async fn deactivate(&self, power: Power) {
        if let Some(session) = self.sessions.write().await.get_mut(&power) {
            session.active = false;
        }
    }
}
