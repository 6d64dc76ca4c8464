//! Promise extraction and reconciliation.
//!
//! Extraction is a deliberate approximation: deterministic regex scans over
//! bilateral press, one promise per message per type, scanned in a fixed
//! precedence order. Reconciliation compares each promise against the
//! orders the promiser actually submitted the following movement phase and
//! emits trust updates into the *promisee's* memory.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use backchannel_game::{Order, PhaseId, Power, base_province, is_province};
use backchannel_press::PressMessage;

use crate::schema::{AgentMemory, MemoryEvent, MemoryEventKind};
use crate::trust::record_event;

// ── Promise types ────────────────────────────────────────────────────────────

/// Extraction precedence order is the declaration order here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromiseKind {
    Support,
    NonAggression,
    Coordination,
    TerritoryDeal,
    AllianceProposal,
    InformationSharing,
}

const EXTRACTION_ORDER: [PromiseKind; 6] = [
    PromiseKind::Support,
    PromiseKind::NonAggression,
    PromiseKind::Coordination,
    PromiseKind::TerritoryDeal,
    PromiseKind::AllianceProposal,
    PromiseKind::InformationSharing,
];

/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPromise {
    pub id: Uuid,
    pub promiser: Power,
    pub promisee: Power,
    pub phase: PhaseId,
    pub message: String,
    pub kind: PromiseKind,
    pub territory: Option<String>,
    /// Never populated by extraction; reconciliation applies the
    /// low-confidence branch when absent.
    pub target_power: Option<Power>,
    pub expected_action: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromiseReconciliation {
    pub promise: ExtractedPromise,
    pub kept: bool,
    pub evidence: String,
    pub confidence: f64,
    pub related_orders: Vec<String>,
}

// ── Extraction ───────────────────────────────────────────────────────────────

static SUPPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:i|we)\b[^.!?]{0,80}\bsupport\b").unwrap()
});
static NON_AGGRESSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)non[- ]?aggression|\bwill not attack\b|\bwon't attack\b|\bno attacks?\b|\bkeep the peace\b")
        .unwrap()
});
static COORDINATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bcoordinate\b|\bwork together\b|\bjoint(?:ly)?\b|\bmove together\b").unwrap()
});
static TERRITORY_DEAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\byou (?:can|may) (?:have|take|keep)\b|\bis yours\b|\bi (?:concede|cede)\b").unwrap()
});
static ALLIANCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\balliance\b|\ballies\b|\bally\b").unwrap()
});
static INFO_SHARING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bintel(?:ligence)?\b|\bshare information\b|\bi hear(?:d)?\b|\bwarn(?:ing)? you\b")
        .unwrap()
});

fn pattern_for(kind: PromiseKind) -> &'static Regex {
    match kind {
        PromiseKind::Support => &SUPPORT_RE,
        PromiseKind::NonAggression => &NON_AGGRESSION_RE,
        PromiseKind::Coordination => &COORDINATION_RE,
        PromiseKind::TerritoryDeal => &TERRITORY_DEAL_RE,
        PromiseKind::AllianceProposal => &ALLIANCE_RE,
        PromiseKind::InformationSharing => &INFO_SHARING_RE,
    }
}

static PROVINCE_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b[A-Z]{3}\b").unwrap());

/// First three-letter province code mentioned at or after `from`.
fn first_territory_mention(content: &str, from: usize) -> Option<String> {
    PROVINCE_TOKEN_RE
        .find_iter(&content[from..])
        .map(|m| m.as_str().to_ascii_uppercase())
        .find(|token| is_province(token))
}

/// Scan every bilateral message for promises. One promise per message per
/// type; within a type the first regex match wins.
pub fn extract_promises(messages: &[PressMessage]) -> Vec<ExtractedPromise> {
    let mut promises = Vec::new();
    for message in messages {
        for kind in EXTRACTION_ORDER {
            let Some(found) = pattern_for(kind).find(&message.content) else {
                continue;
            };
            let territory = match kind {
                // A deal needs its territory; other kinds record one
                // opportunistically when mentioned.
                PromiseKind::TerritoryDeal => {
                    match first_territory_mention(&message.content, found.start()) {
                        Some(t) => Some(t),
                        None => continue,
                    }
                }
                _ => first_territory_mention(&message.content, 0),
            };
            debug!(
                from = %message.from,
                to = %message.to,
                ?kind,
                ?territory,
                "promise extracted"
            );
            promises.push(ExtractedPromise {
                id: Uuid::new_v4(),
                promiser: message.from,
                promisee: message.to,
                phase: message.phase,
                message: message.content.clone(),
                kind,
                territory,
                target_power: None,
                expected_action: None,
            });
        }
    }
    promises
}

// ── Reconciliation ───────────────────────────────────────────────────────────

/// Board facts reconciliation verifies against: who owns each unit (by
/// location) and who owns each province (supply-center ownership).
#[derive(Debug, Clone, Default)]
pub struct BoardOwnership {
    pub unit_owners: HashMap<String, Power>,
    pub province_owners: BTreeMap<String, Power>,
}

impl BoardOwnership {
    fn unit_owner(&self, location: &str) -> Option<Power> {
        let base = base_province(location).to_ascii_uppercase();
        self.unit_owners
            .get(location)
            .or_else(|| self.unit_owners.get(&base))
            .copied()
    }

    fn province_owner(&self, province: &str) -> Option<Power> {
        self.province_owners
            .get(&base_province(province).to_ascii_uppercase())
            .copied()
    }
}

/// Verify each promise against the promiser's submitted orders.
pub fn reconcile_promises(
    promises: &[ExtractedPromise],
    orders_by_power: &HashMap<Power, Vec<Order>>,
    board: &BoardOwnership,
) -> Vec<PromiseReconciliation> {
    promises
        .iter()
        .map(|promise| {
            let orders = orders_by_power
                .get(&promise.promiser)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            reconcile_one(promise, orders, board)
        })
        .collect()
}

fn reconcile_one(
    promise: &ExtractedPromise,
    orders: &[Order],
    board: &BoardOwnership,
) -> PromiseReconciliation {
    let related = |filtered: Vec<&Order>| -> Vec<String> {
        filtered.iter().map(|o| o.to_string()).collect()
    };

    let (kept, evidence, confidence, related_orders) = match promise.kind {
        PromiseKind::Support => {
            let supports: Vec<&Order> = orders
                .iter()
                .filter(|o| {
                    o.supported_location()
                        .and_then(|loc| board.unit_owner(loc))
                        .is_some_and(|owner| owner == promise.promisee)
                })
                .collect();
            if supports.is_empty() {
                (
                    false,
                    format!("{} issued no support for a {} unit", promise.promiser, promise.promisee),
                    0.8,
                    vec![],
                )
            } else {
                (
                    true,
                    format!("{} supported a {} unit", promise.promiser, promise.promisee),
                    0.8,
                    related(supports),
                )
            }
        }
        PromiseKind::NonAggression => {
            let attacks: Vec<&Order> = orders
                .iter()
                .filter(|o| {
                    o.move_destination()
                        .and_then(|dest| board.province_owner(dest))
                        .is_some_and(|owner| owner == promise.promisee)
                })
                .collect();
            if attacks.is_empty() {
                (
                    true,
                    format!("no {} move targeted {} territory", promise.promiser, promise.promisee),
                    0.9,
                    vec![],
                )
            } else {
                (
                    false,
                    format!("{} moved into {} territory", promise.promiser, promise.promisee),
                    0.9,
                    related(attacks),
                )
            }
        }
        PromiseKind::Coordination => match promise.target_power {
            Some(target) => {
                let moves: Vec<&Order> = orders
                    .iter()
                    .filter(|o| {
                        o.move_destination()
                            .and_then(|dest| board.province_owner(dest))
                            .is_some_and(|owner| owner == target)
                    })
                    .collect();
                let kept = !moves.is_empty();
                (
                    kept,
                    format!("coordination against {target}: {} matching moves", moves.len()),
                    0.6,
                    related(moves),
                )
            }
            // No target captured by extraction — not actionable.
            None => (true, "coordination target unknown".to_string(), 0.3, vec![]),
        },
        PromiseKind::TerritoryDeal => {
            let territory = promise.territory.as_deref().unwrap_or("");
            let violations: Vec<&Order> = orders
                .iter()
                .filter(|o| {
                    o.move_destination()
                        .is_some_and(|dest| base_province(dest).eq_ignore_ascii_case(territory))
                })
                .collect();
            if violations.is_empty() {
                (true, format!("stayed out of {territory}"), 0.7, vec![])
            } else {
                (false, format!("moved into conceded {territory}"), 0.7, related(violations))
            }
        }
        PromiseKind::AllianceProposal | PromiseKind::InformationSharing => {
            // Not verifiable through orders.
            (true, "not verifiable from orders".to_string(), 0.2, vec![])
        }
    };

    PromiseReconciliation {
        promise: promise.clone(),
        kept,
        evidence,
        confidence,
        related_orders,
    }
}

// ── Memory application ───────────────────────────────────────────────────────

/// Minimum confidence for a reconciliation to touch memory.
pub const RECONCILE_CONFIDENCE_FLOOR: f64 = 0.5;

const KEPT_TRUST_DELTA: f64 = 0.1;
const BETRAYAL_TRUST_DELTA: f64 = -0.3;
const BROKEN_TRUST_DELTA: f64 = -0.15;

/// Apply one reconciliation to the *promisee's* memory. Low-confidence
/// results are dropped. Returns true when an event was recorded.
pub fn apply_reconciliation(memory: &mut AgentMemory, recon: &PromiseReconciliation) -> bool {
    debug_assert_eq!(memory.power, recon.promise.promisee);
    if recon.confidence < RECONCILE_CONFIDENCE_FLOOR {
        return false;
    }

    let promise = &recon.promise;
    let (kind, impact, description) = if recon.kept {
        (
            MemoryEventKind::PromiseKept,
            KEPT_TRUST_DELTA,
            format!("{} kept a {:?} promise: {}", promise.promiser, promise.kind, recon.evidence),
        )
    } else if promise.kind == PromiseKind::NonAggression {
        (
            MemoryEventKind::Betrayal,
            BETRAYAL_TRUST_DELTA,
            format!("{} broke non-aggression: {}", promise.promiser, recon.evidence),
        )
    } else {
        (
            MemoryEventKind::PromiseBroken,
            BROKEN_TRUST_DELTA,
            format!("{} broke a {:?} promise: {}", promise.promiser, promise.kind, recon.evidence),
        )
    };

    record_event(
        memory,
        MemoryEvent {
            kind,
            year: promise.phase.year,
            season: promise.phase.season,
            powers: vec![promise.promiser],
            description,
            trust_impact: impact,
        },
    );
    true
}
