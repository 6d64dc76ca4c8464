//! Runtime configuration: TOML-backed, every section defaultable so a
//! missing or partial file still yields a runnable setup.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use backchannel_game::Power;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameSettings {
    pub game_id: String,
    /// Length of each diplomacy press window.
    pub press_window_minutes: u64,
    /// Sleep between inbox polls inside the window.
    pub poll_interval_secs: u64,
    /// Run agent turns within a phase concurrently.
    pub parallel_agents: bool,
    /// Hard cap per agent turn; on expiry the turn yields its best parse.
    pub turn_timeout_secs: u64,
    pub max_conversation_history: usize,
    /// Root directory for file-backed memory.
    pub data_dir: String,
    /// Supply centers needed to win.
    pub victory_centers: usize,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            game_id: "local".to_string(),
            press_window_minutes: 1,
            poll_interval_secs: 5,
            parallel_agents: false,
            turn_timeout_secs: 120,
            max_conversation_history: 20,
            data_dir: ".backchannel/memory".to_string(),
            victory_centers: 18,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelEntry {
    pub id: String,
    pub provider: String,
    pub cost_per_input_token: f64,
    pub cost_per_output_token: f64,
    pub max_context_tokens: u64,
    pub daily_token_limit: u64,
    pub tier: String,
}

impl Default for ModelEntry {
    fn default() -> Self {
        Self {
            id: String::new(),
            provider: "openrouter".to_string(),
            cost_per_input_token: 0.0,
            cost_per_output_token: 0.0,
            max_context_tokens: 128_000,
            daily_token_limit: 0,
            tier: "standard".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AssignmentEntry {
    pub primary: String,
    pub fallback: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    /// Free-text personality blended into the system message.
    pub personality: String,
    /// Standing strategic guidance, also in the system message.
    pub strategy: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            personality: "A pragmatic negotiator who keeps messages short.".to_string(),
            strategy: "Secure your home centers, then expand where resistance is weakest."
                .to_string(),
            temperature: 0.7,
            max_tokens: 1200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    pub log_level: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self { log_level: "info".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub game: GameSettings,
    pub models: Vec<ModelEntry>,
    /// Power name → model assignment; unassigned powers fail at startup.
    /// Keyed by power name (TOML table keys are strings).
    pub assignments: BTreeMap<String, AssignmentEntry>,
    pub personas: BTreeMap<String, PersonaConfig>,
    pub telemetry: TelemetrySettings,
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_default()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = toml::to_string_pretty(self).context("serialize config")?;
        fs::write(path, raw).with_context(|| format!("write config {}", path.display()))?;
        Ok(())
    }

    /// Persona for a power, falling back to the default persona.
    pub fn persona(&self, power: Power) -> PersonaConfig {
        self.personas.get(power.name()).cloned().unwrap_or_default()
    }

    /// All seven personas, defaults filled in for unconfigured powers.
    pub fn personas_by_power(&self) -> BTreeMap<Power, PersonaConfig> {
        Power::ALL.into_iter().map(|p| (p, self.persona(p))).collect()
    }

    pub fn assignment(&self, power: Power) -> Option<&AssignmentEntry> {
        self.assignments.get(power.name())
    }
}
