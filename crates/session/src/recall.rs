//! The recall tool: a single-line invocation an agent can emit to pull
//! past diary context into its conversation before finalizing a turn.
//!
//! `RECALL: phase=S1903M type=messages count=2 power=FRANCE`
//!
//! Execution is deterministic: newest phase first, insertion order within a
//! phase, capped counts, fixed truncation.

use backchannel_game::{PhaseFilter, PhaseId, Power};
use backchannel_memory::{AgentMemory, DiaryEntry, DiaryEntryKind};

/// Max recall round-trips per agent turn; further requests are stripped.
pub const MAX_RECALL_CALLS_PER_TURN: usize = 3;
/// Max distinct phases one recall may return.
const MAX_PHASE_COUNT: usize = 5;
/// Max entries across all phases.
const MAX_TOTAL_ENTRIES: usize = 15;
const CONTENT_TRUNCATE: usize = 300;
/// Dedup prefix length across the two diary layers.
const DEDUP_PREFIX: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecallKind {
    Messages,
    Orders,
    All,
}

impl RecallKind {
    fn admits(&self, kind: DiaryEntryKind) -> bool {
        match self {
            RecallKind::Messages => kind == DiaryEntryKind::Negotiation,
            RecallKind::Orders => kind == DiaryEntryKind::Orders,
            RecallKind::All => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecallRequest {
    pub phase: PhaseFilter,
    pub kind: RecallKind,
    pub power: Option<Power>,
    pub count: usize,
}

/// Find and parse the first `RECALL:` line in a response. Returns `None`
/// when no line parses — an unparseable recall is a non-fatal parse error
/// the caller logs.
pub fn parse_recall(response: &str) -> Option<RecallRequest> {
    let line = response
        .lines()
        .map(str::trim)
        .find(|l| l.to_ascii_uppercase().starts_with("RECALL:"))?;
    let args = &line["RECALL:".len()..];

    let mut phase: Option<PhaseFilter> = None;
    let mut kind = RecallKind::All;
    let mut power: Option<Power> = None;
    let mut count: usize = 1;

    for token in args.split_whitespace() {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        match key.to_ascii_lowercase().as_str() {
            "phase" => phase = PhaseFilter::parse(value),
            "type" => {
                kind = match value.to_ascii_lowercase().as_str() {
                    "messages" => RecallKind::Messages,
                    "orders" => RecallKind::Orders,
                    "all" => RecallKind::All,
                    _ => return None,
                }
            }
            "power" => power = value.parse().ok(),
            "count" => count = value.parse().unwrap_or(1),
            _ => {}
        }
    }

    Some(RecallRequest {
        phase: phase?,
        kind,
        power,
        count: count.clamp(1, MAX_PHASE_COUNT),
    })
}

/// Remove every `RECALL:` line (used when the per-turn recall budget is
/// exhausted and the response must stand as-is).
pub fn strip_recall(response: &str) -> String {
    response
        .lines()
        .filter(|l| !l.trim().to_ascii_uppercase().starts_with("RECALL:"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn dedup_key(entry: &DiaryEntry) -> (PhaseId, DiaryEntryKind, String) {
    let prefix: String = entry.content.chars().take(DEDUP_PREFIX).collect();
    (entry.phase, entry.kind, prefix)
}

/// Execute a recall against both diary layers.
pub fn execute_recall(memory: &AgentMemory, request: &RecallRequest) -> Vec<DiaryEntry> {
    let mut seen = std::collections::HashSet::new();
    let mut matched: Vec<&DiaryEntry> = Vec::new();

    for entry in memory
        .current_year_diary
        .iter()
        .chain(memory.full_private_diary.iter())
    {
        if !request.phase.matches(entry.phase) || !request.kind.admits(entry.kind) {
            continue;
        }
        if let Some(power) = request.power {
            if !entry.content.to_ascii_uppercase().contains(power.name()) {
                continue;
            }
        }
        if seen.insert(dedup_key(entry)) {
            matched.push(entry);
        }
    }

    // Newest phase first; insertion order within a phase.
    let mut phases: Vec<PhaseId> = matched.iter().map(|e| e.phase).collect();
    phases.sort_unstable();
    phases.dedup();
    phases.reverse();
    phases.truncate(request.count);

    let mut results = Vec::new();
    for phase in phases {
        for entry in matched.iter().filter(|e| e.phase == phase) {
            if results.len() >= MAX_TOTAL_ENTRIES {
                return results;
            }
            let mut entry = (*entry).clone();
            if entry.content.chars().count() > CONTENT_TRUNCATE {
                entry.content = entry.content.chars().take(CONTENT_TRUNCATE).collect();
            }
            results.push(entry);
        }
    }
    results
}

/// Render recall results for injection back into the conversation.
pub fn format_recall(entries: &[DiaryEntry]) -> String {
    if entries.is_empty() {
        return "RECALL RESULT: no matching diary entries.".to_string();
    }
    let mut out = String::from("RECALL RESULT:\n");
    for entry in entries {
        out.push_str(&format!(
            "{} [{}]: {}\n",
            entry.phase.tag(),
            entry.kind.label(),
            entry.content
        ));
    }
    out
}
