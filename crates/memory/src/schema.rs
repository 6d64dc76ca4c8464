//! The persistent memory record and its nested types.
//!
//! Serialization contract: Power-keyed maps serialize as arrays of
//! `[Power, value]` pairs, timestamps as ISO-8601 strings, and empty
//! collections are preserved rather than omitted.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use backchannel_game::{PhaseId, Power, Season};

// ── Serde helper: Power-keyed maps as pair arrays ────────────────────────────

pub mod power_map {
    use super::*;
    use serde::ser::SerializeSeq;
    use serde::{Deserializer, Serializer};

    pub fn serialize<V, S>(map: &BTreeMap<Power, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        V: Serialize,
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(map.len()))?;
        for pair in map.iter() {
            seq.serialize_element(&pair)?;
        }
        seq.end()
    }

    pub fn deserialize<'de, V, D>(deserializer: D) -> Result<BTreeMap<Power, V>, D::Error>
    where
        V: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        let pairs: Vec<(Power, V)> = Vec::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}

// ── Nested record types ──────────────────────────────────────────────────────

/// A (year, season) stamp, ordered year-first then SPRING < FALL < WINTER.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TurnStamp {
    pub year: u16,
    pub season: Season,
}

impl TurnStamp {
    pub fn new(year: u16, season: Season) -> Self {
        Self { year, season }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub trust_level: f64,
    /// Derived: trust ≥ 0.5. Recomputed on every trust update.
    pub is_ally: bool,
    /// Derived: trust ≤ -0.5.
    pub is_enemy: bool,
    pub last_interaction: Option<TurnStamp>,
    /// Ids of commitments involving this power.
    pub commitments: Vec<Uuid>,
    pub notes: Vec<String>,
}

impl Relationship {
    pub fn neutral() -> Self {
        Self {
            trust_level: 0.0,
            is_ally: false,
            is_enemy: false,
            last_interaction: None,
            commitments: Vec::new(),
            notes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemoryEventKind {
    AllianceFormed,
    AllianceBroken,
    Betrayal,
    Cooperation,
    Attack,
    SupportGiven,
    SupportReceived,
    PromiseMade,
    PromiseKept,
    PromiseBroken,
}

impl MemoryEventKind {
    /// Events that must survive consolidation at full detail.
    pub fn affects_trust(&self) -> bool {
        matches!(
            self,
            MemoryEventKind::Betrayal
                | MemoryEventKind::PromiseBroken
                | MemoryEventKind::PromiseKept
                | MemoryEventKind::AllianceBroken
                | MemoryEventKind::AllianceFormed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEvent {
    pub kind: MemoryEventKind,
    pub year: u16,
    pub season: Season,
    pub powers: Vec<Power>,
    pub description: String,
    pub trust_impact: f64,
}

impl MemoryEvent {
    pub fn stamp(&self) -> TurnStamp {
        TurnStamp::new(self.year, self.season)
    }
}

/// An explicit promise record, authored by the orchestrator or agent —
/// distinct from machine-extracted press promises.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commitment {
    pub id: Uuid,
    pub year: u16,
    pub season: Season,
    pub from: Power,
    pub to: Power,
    pub description: String,
    pub expires: Option<PhaseId>,
    pub fulfilled: bool,
    pub broken: bool,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotePriority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategicNote {
    pub id: Uuid,
    pub year: u16,
    pub season: Season,
    pub subject: String,
    pub content: String,
    pub priority: NotePriority,
}

/// Per-phase bookkeeping appended after each movement resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnSummary {
    pub year: u16,
    pub season: Season,
    pub orders_submitted: u32,
    pub orders_succeeded: u32,
    pub orders_failed: u32,
    pub centers_gained: Vec<String>,
    pub centers_lost: Vec<String>,
    pub units_built: u32,
    pub units_lost: u32,
    pub diplomatic_highlights: Vec<String>,
}

impl TurnSummary {
    pub fn stamp(&self) -> TurnStamp {
        TurnStamp::new(self.year, self.season)
    }
}

/// Compressed replacement for a range of old turn summaries. Trust-affecting
/// events from the range are embedded at full detail regardless of what the
/// prose summary says.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedBlock {
    pub from: TurnStamp,
    pub to: TurnStamp,
    pub summary: String,
    pub trust_events: Vec<MemoryEvent>,
    pub centers_gained: Vec<String>,
    pub centers_lost: Vec<String>,
    pub consolidated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiaryEntryKind {
    Negotiation,
    Orders,
    Reflection,
    Planning,
    Consolidation,
}

impl DiaryEntryKind {
    pub fn label(&self) -> &'static str {
        match self {
            DiaryEntryKind::Negotiation => "negotiation",
            DiaryEntryKind::Orders => "orders",
            DiaryEntryKind::Reflection => "reflection",
            DiaryEntryKind::Planning => "planning",
            DiaryEntryKind::Consolidation => "consolidation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiaryEntry {
    pub phase: PhaseId,
    pub kind: DiaryEntryKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearSummary {
    pub year: u16,
    pub summary: String,
    pub territorial_changes: Vec<String>,
    pub diplomatic_changes: Vec<String>,
    pub consolidated_at: DateTime<Utc>,
}

// ── The memory record ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMemory {
    pub power: Power,
    pub game_id: String,
    /// Trust toward each other power, clamped into [-1, 1] on every mutation.
    #[serde(with = "power_map")]
    pub trust_levels: BTreeMap<Power, f64>,
    #[serde(with = "power_map")]
    pub relationships: BTreeMap<Power, Relationship>,
    /// Append-only.
    pub events: Vec<MemoryEvent>,
    pub active_commitments: Vec<Commitment>,
    pub strategic_notes: Vec<StrategicNote>,
    pub turn_summaries: Vec<TurnSummary>,
    pub consolidated_blocks: Vec<ConsolidatedBlock>,
    /// Never truncated.
    pub full_private_diary: Vec<DiaryEntry>,
    /// Cleared at year-end consolidation.
    pub current_year_diary: Vec<DiaryEntry>,
    pub year_summaries: Vec<YearSummary>,
    /// Derived from relationships after any trust mutation.
    pub current_allies: Vec<Power>,
    pub current_enemies: Vec<Power>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentMemory {
    pub fn new(power: Power, game_id: impl Into<String>) -> Self {
        let now = Utc::now();
        let trust_levels = power.others().map(|p| (p, 0.0)).collect();
        let relationships = power.others().map(|p| (p, Relationship::neutral())).collect();
        Self {
            power,
            game_id: game_id.into(),
            trust_levels,
            relationships,
            events: Vec::new(),
            active_commitments: Vec::new(),
            strategic_notes: Vec::new(),
            turn_summaries: Vec::new(),
            consolidated_blocks: Vec::new(),
            full_private_diary: Vec::new(),
            current_year_diary: Vec::new(),
            year_summaries: Vec::new(),
            current_allies: Vec::new(),
            current_enemies: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn trust_toward(&self, other: Power) -> f64 {
        self.trust_levels.get(&other).copied().unwrap_or(0.0)
    }

    // ── Commitment bookkeeping ──────────────────────────────────────────────

    pub fn add_commitment(
        &mut self,
        year: u16,
        season: Season,
        from: Power,
        to: Power,
        description: impl Into<String>,
        expires: Option<PhaseId>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.active_commitments.push(Commitment {
            id,
            year,
            season,
            from,
            to,
            description: description.into(),
            expires,
            fulfilled: false,
            broken: false,
        });
        let other = if from == self.power { to } else { from };
        if let Some(rel) = self.relationships.get_mut(&other) {
            rel.commitments.push(id);
        }
        self.touch();
        id
    }

    /// Mark a commitment fulfilled. No-op if already terminal — a commitment
    /// is at most one of fulfilled/broken.
    pub fn fulfill_commitment(&mut self, id: Uuid) -> bool {
        self.set_commitment_state(id, true)
    }

    pub fn break_commitment(&mut self, id: Uuid) -> bool {
        self.set_commitment_state(id, false)
    }

    fn set_commitment_state(&mut self, id: Uuid, fulfilled: bool) -> bool {
        let Some(c) = self.active_commitments.iter_mut().find(|c| c.id == id) else {
            return false;
        };
        if c.fulfilled || c.broken {
            return false;
        }
        if fulfilled {
            c.fulfilled = true;
        } else {
            c.broken = true;
        }
        self.touch();
        true
    }
}
