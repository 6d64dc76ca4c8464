//! The rules-engine facade.
//!
//! Adjudication, adjacency data, and retreat/build arithmetic are an
//! external collaborator; the runtime talks to them only through
//! [`GameEngine`]. Engine methods are synchronous — the only suspension
//! points in the system are LLM calls, press I/O, store I/O, and sleeps.

use serde::{Deserialize, Serialize};

use crate::order::{BuildOrder, Order, RetreatOrder};
use crate::power::Power;
use crate::state::GameState;

/// Per-order rejection reason, surfaced when validation fails.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OrderError {
    #[error("no {power} unit at {location}")]
    NoSuchUnit { power: Power, location: String },
    #[error("{from} is not adjacent to {to}")]
    NotAdjacent { from: String, to: String },
    #[error("illegal support: {reason}")]
    IllegalSupport { reason: String },
    #[error("illegal build at {location}: {reason}")]
    IllegalBuild { location: String, reason: String },
    #[error("unknown province {0}")]
    UnknownProvince(String),
}

/// Engine-level failures. These indicate orchestrator bugs (wrong-phase
/// submission), not agent misbehavior, and are fatal.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("orders submitted in wrong phase: expected {expected}, game is in {actual}")]
    WrongPhase { expected: String, actual: String },
    #[error("game is already over")]
    GameOver,
}

/// Outcome of a single order after resolution, for the next turn's prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderOutcome {
    pub order: String,
    pub succeeded: bool,
    /// Short adjudicator note, e.g. "bounced in BUR".
    pub note: Option<String>,
}

/// Facade over the external rules engine.
pub trait GameEngine: Send + Sync {
    /// Current board snapshot.
    fn state(&self) -> &GameState;

    /// Provinces reachable by the unit currently at `location`.
    fn adjacent(&self, location: &str) -> Vec<String>;

    /// Validate a single movement order without submitting it.
    fn validate_order(&self, power: Power, order: &Order) -> Result<(), OrderError>;

    fn submit_orders(&mut self, power: Power, orders: Vec<Order>) -> Result<(), EngineError>;
    fn submit_retreats(&mut self, power: Power, retreats: Vec<RetreatOrder>) -> Result<(), EngineError>;
    fn submit_builds(&mut self, power: Power, builds: Vec<BuildOrder>) -> Result<(), EngineError>;

    /// Resolve the current movement phase, advancing season/phase and
    /// populating pending retreats.
    fn resolve_movement(&mut self) -> Result<(), EngineError>;
    fn resolve_retreats(&mut self) -> Result<(), EngineError>;
    /// Resolve builds and advance into the next year's spring.
    fn resolve_builds(&mut self) -> Result<(), EngineError>;

    /// Last-phase order outcomes for a power's units.
    fn last_outcomes(&self, power: Power) -> Vec<OrderOutcome>;

    /// Deep-copy the current state (for what-if views and snapshots).
    fn clone_state(&self) -> GameState {
        self.state().clone()
    }
}
