//! Per-agent sessions: bounded conversation state with summarizing
//! eviction, the recall tool, and LLM dispatch through the model registry.

pub mod manager;
pub mod recall;
pub mod window;

pub use manager::{AgentSession, SessionManager};
pub use recall::{
    MAX_RECALL_CALLS_PER_TURN, RecallKind, RecallRequest, execute_recall, format_recall,
    parse_recall, strip_recall,
};
pub use window::{SUMMARY_MARKER, enforce_window};
