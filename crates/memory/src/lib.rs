//! Per-(power, game) agent memory: trust ledger, two-layer diary, promise
//! reconciliation, turn-summary consolidation, and the store/manager pair
//! that persists it all.

pub mod consolidate;
pub mod diary;
pub mod manager;
pub mod notes;
pub mod promise;
pub mod schema;
pub mod store;
pub mod trust;

pub use consolidate::{
    CONSOLIDATION_THRESHOLD, MAX_CONSOLIDATED_BLOCKS, RECENT_TURNS_TO_KEEP, consolidate_turns,
    record_turn_summary, should_consolidate_turns,
};
pub use diary::{YearBoardDelta, consolidate_diary, context_diary, should_consolidate_diary};
pub use manager::MemoryManager;
pub use notes::{MAX_STRATEGIC_NOTES, merge_strategic_notes};
pub use promise::{
    BoardOwnership, ExtractedPromise, PromiseKind, PromiseReconciliation, apply_reconciliation,
    extract_promises, reconcile_promises,
};
pub use schema::{
    AgentMemory, Commitment, ConsolidatedBlock, DiaryEntry, DiaryEntryKind, MemoryEvent,
    MemoryEventKind, NotePriority, Relationship, StrategicNote, TurnStamp, TurnSummary, YearSummary,
};
pub use store::{FileStore, InMemoryStore, MemoryStore, StoreError};
pub use trust::{ALLY_THRESHOLD, ENEMY_THRESHOLD, all_trust_events, record_event, update_trust};
