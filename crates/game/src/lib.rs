pub mod engine;
pub mod map;
pub mod order;
pub mod phase;
pub mod power;
pub mod state;

pub use engine::{EngineError, GameEngine, OrderError, OrderOutcome};
pub use map::{HOME_CENTERS, PROVINCES, SUPPLY_CENTERS, base_province, is_province, is_supply_center};
pub use order::{BuildOrder, Order, RetreatOrder, UnitType};
pub use phase::{PhaseFilter, PhaseId, PhaseKind, Season};
pub use power::Power;
pub use state::{GameState, PendingRetreat, Unit};
