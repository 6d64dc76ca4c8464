//! The runtime orchestrator: phase scheduling, per-agent turns, response
//! parsing, and the reconciliation wiring that threads game results back
//! into each agent's memory.

pub mod events;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod telemetry;
pub mod turn;
pub mod view;

pub use events::{EventBus, RuntimeEvent};
pub use orchestrator::{Orchestrator, registry_from_config};
pub use parser::{AgentResponse, SendDirective, SendStage, parse_agent_response};
pub use turn::{TurnOutcome, run_agent_turn};
