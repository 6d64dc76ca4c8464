//! The orchestrator's event bus: typed events delivered synchronously to
//! callbacks registered at setup time. A panicking callback is logged and
//! skipped; it never halts the scheduler.

use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::warn;

use backchannel_game::{PhaseKind, Power, Season};

#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    GameStarted {
        game_id: String,
    },
    PhaseStarted {
        year: u16,
        season: Season,
        phase: PhaseKind,
    },
    AgentTurnStarted {
        power: Power,
        year: u16,
        season: Season,
        phase: PhaseKind,
    },
    AgentTurnCompleted {
        power: Power,
        year: u16,
        season: Season,
        phase: PhaseKind,
    },
    OrdersSubmitted {
        power: Power,
        accepted: usize,
        dropped: usize,
    },
    PhaseResolved {
        year: u16,
        season: Season,
        phase: PhaseKind,
    },
    GameEnded {
        winner: Option<Power>,
        draw: bool,
    },
}

type Callback = Box<dyn Fn(&RuntimeEvent) + Send + Sync>;

#[derive(Default)]
pub struct EventBus {
    callbacks: Vec<Callback>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, callback: impl Fn(&RuntimeEvent) + Send + Sync + 'static) {
        self.callbacks.push(Box::new(callback));
    }

    /// Fire an event to every callback, in registration order.
    pub fn emit(&self, event: &RuntimeEvent) {
        for callback in &self.callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                warn!(?event, "event callback panicked; skipping");
            }
        }
    }
}
