//! The two-layer private diary.
//!
//! Every entry lands in the permanent `full_private_diary` and the working
//! `current_year_diary`; at year end the current year is consolidated into
//! a `YearSummary` by the LLM (with a deterministic fallback) and cleared,
//! keeping prompt context bounded while the permanent log keeps everything.

use chrono::Utc;
use tracing::{debug, warn};

use backchannel_game::{PhaseId, PhaseKind, Season};
use backchannel_llm::{ChatMessage, LlmProvider, LlmRequest};

use crate::schema::{AgentMemory, DiaryEntry, DiaryEntryKind, MemoryEventKind, YearSummary};

/// How many current-year entries the prompt context block shows.
const CONTEXT_ENTRY_LIMIT: usize = 10;

const CONSOLIDATION_TEMPERATURE: f32 = 0.3;
const CONSOLIDATION_MAX_TOKENS: u32 = 500;

// ── Append ───────────────────────────────────────────────────────────────────

pub fn append_entry(
    memory: &mut AgentMemory,
    phase: PhaseId,
    kind: DiaryEntryKind,
    content: impl Into<String>,
) {
    let entry = DiaryEntry {
        phase,
        kind,
        content: content.into(),
        timestamp: Utc::now(),
    };
    memory.full_private_diary.push(entry.clone());
    memory.current_year_diary.push(entry);
    memory.touch();
}

pub fn add_negotiation_entry(memory: &mut AgentMemory, phase: PhaseId, content: impl Into<String>) {
    append_entry(memory, phase, DiaryEntryKind::Negotiation, content);
}

pub fn add_orders_entry(memory: &mut AgentMemory, phase: PhaseId, content: impl Into<String>) {
    append_entry(memory, phase, DiaryEntryKind::Orders, content);
}

pub fn add_reflection_entry(memory: &mut AgentMemory, phase: PhaseId, content: impl Into<String>) {
    append_entry(memory, phase, DiaryEntryKind::Reflection, content);
}

// ── Context block ────────────────────────────────────────────────────────────

/// The bounded diary block injected into prompts: one line per completed
/// year, then the last ten current-year entries. Empty memory yields an
/// empty string.
pub fn context_diary(memory: &AgentMemory) -> String {
    if memory.year_summaries.is_empty() && memory.current_year_diary.is_empty() {
        return String::new();
    }

    let mut out = String::new();

    if !memory.year_summaries.is_empty() {
        out.push_str("Past Years Summary:\n");
        for ys in &memory.year_summaries {
            out.push_str(&format!("{}: {}", ys.year, ys.summary));
            if !ys.territorial_changes.is_empty() {
                out.push_str(&format!(" [Territorial: {}]", ys.territorial_changes.join(", ")));
            }
            if !ys.diplomatic_changes.is_empty() {
                out.push_str(&format!(" [Diplomatic: {}]", ys.diplomatic_changes.join(", ")));
            }
            out.push('\n');
        }
    }

    if !memory.current_year_diary.is_empty() {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str("Current Year Diary:\n");
        let total = memory.current_year_diary.len();
        let start = total.saturating_sub(CONTEXT_ENTRY_LIMIT);
        for entry in &memory.current_year_diary[start..] {
            out.push_str(&format!(
                "{} [{}]: {}\n",
                entry.phase.tag(),
                entry.kind.label(),
                entry.content
            ));
        }
        if start > 0 {
            out.push_str(&format!("({start} earlier entries)\n"));
        }
    }

    out
}

/// Rough token count: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

// ── Year-end consolidation ───────────────────────────────────────────────────

/// Supply-center delta for the year, computed by the orchestrator from the
/// board before and after.
#[derive(Debug, Clone, Default)]
pub struct YearBoardDelta {
    pub gained: Vec<String>,
    pub lost: Vec<String>,
}

/// True iff the phase is a year-end build, the current year has entries,
/// and the year has not already been summarized.
pub fn should_consolidate_diary(
    year: u16,
    season: Season,
    phase: PhaseKind,
    memory: &AgentMemory,
) -> bool {
    let year_end = matches!(
        (season, phase),
        (Season::Fall, PhaseKind::Build) | (Season::Winter, PhaseKind::Build)
    );
    year_end
        && !memory.current_year_diary.is_empty()
        && !memory.year_summaries.iter().any(|ys| ys.year == year)
}

/// Consolidate the current year's diary into a [`YearSummary`], append the
/// consolidation entry to the permanent log, and clear the working diary.
/// LLM failure degrades to a deterministic summary; it never aborts.
pub async fn consolidate_diary(
    memory: &mut AgentMemory,
    year: u16,
    board: Option<&YearBoardDelta>,
    llm: &dyn LlmProvider,
) -> YearSummary {
    let summary = if memory.current_year_diary.is_empty() {
        YearSummary {
            year,
            summary: format!("No significant events in {year}."),
            territorial_changes: Vec::new(),
            diplomatic_changes: Vec::new(),
            consolidated_at: Utc::now(),
        }
    } else {
        let prompt = build_consolidation_prompt(memory, year, board);
        let request = LlmRequest {
            messages: vec![ChatMessage::user(prompt)],
            model: None,
            temperature: Some(CONSOLIDATION_TEMPERATURE),
            max_tokens: Some(CONSOLIDATION_MAX_TOKENS),
            stop_sequences: Vec::new(),
        };
        match llm.complete(&request).await {
            Ok(response) => parse_year_summary(&response.content, year),
            Err(err) => {
                warn!(power = %memory.power, year, %err, "diary consolidation LLM failed, using fallback");
                fallback_year_summary(memory, year, board)
            }
        }
    };

    let consolidation_entry = DiaryEntry {
        phase: PhaseId::new(year, Season::Winter, PhaseKind::Build),
        kind: DiaryEntryKind::Consolidation,
        content: format!("Year {year} consolidated: {}", summary.summary),
        timestamp: Utc::now(),
    };
    memory.full_private_diary.push(consolidation_entry);
    memory.year_summaries.push(summary.clone());
    memory.current_year_diary.clear();
    memory.touch();

    debug!(power = %memory.power, year, "diary consolidated");
    summary
}

fn build_consolidation_prompt(memory: &AgentMemory, year: u16, board: Option<&YearBoardDelta>) -> String {
    let mut prompt = format!(
        "You are {} reviewing your private diary for {year}. Condense the year \
         into a short narrative.\n\nDIARY ENTRIES:\n",
        memory.power
    );
    for entry in &memory.current_year_diary {
        prompt.push_str(&format!(
            "{} [{}]: {}\n",
            entry.phase.tag(),
            entry.kind.label(),
            entry.content
        ));
    }

    if let Some(board) = board {
        let alliances: Vec<String> = year_event_powers(memory, year, MemoryEventKind::AllianceFormed);
        let betrayals: Vec<String> = year_event_powers(memory, year, MemoryEventKind::Betrayal);
        prompt.push_str(&format!(
            "\nBOARD RESULT:\nGained: {}, Lost: {}, Alliances: {}, Betrayals: {}\n",
            join_or_none(&board.gained),
            join_or_none(&board.lost),
            join_or_none(&alliances),
            join_or_none(&betrayals),
        ));
    }

    prompt.push_str(
        "\nRespond with:\nSUMMARY: <2-3 sentence narrative>\n\
         TERRITORIAL: <comma-separated changes, or None>\n\
         DIPLOMATIC: <comma-separated changes, or None>\n",
    );
    prompt
}

fn year_event_powers(memory: &AgentMemory, year: u16, kind: MemoryEventKind) -> Vec<String> {
    memory
        .events
        .iter()
        .filter(|e| e.year == year && e.kind == kind)
        .flat_map(|e| e.powers.iter().map(|p| p.to_string()))
        .collect()
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() { "None".to_string() } else { items.join(", ") }
}

/// Parse a consolidation response. Structured `SUMMARY:` / `TERRITORIAL:` /
/// `DIPLOMATIC:` sections are honored; an untagged response becomes the
/// summary wholesale.
fn parse_year_summary(response: &str, year: u16) -> YearSummary {
    let mut summary = String::new();
    let mut territorial = Vec::new();
    let mut diplomatic = Vec::new();
    let mut saw_tags = false;
    let mut in_summary = false;

    for line in response.lines() {
        let trimmed = line.trim();
        let upper = trimmed.to_ascii_uppercase();
        if let Some(rest) = upper.strip_prefix("SUMMARY:") {
            saw_tags = true;
            in_summary = true;
            summary = trimmed[trimmed.len() - rest.len()..].trim().to_string();
        } else if upper.starts_with("TERRITORIAL:") {
            saw_tags = true;
            in_summary = false;
            territorial = parse_change_list(&trimmed["TERRITORIAL:".len()..]);
        } else if upper.starts_with("DIPLOMATIC:") {
            saw_tags = true;
            in_summary = false;
            diplomatic = parse_change_list(&trimmed["DIPLOMATIC:".len()..]);
        } else if in_summary && !trimmed.is_empty() {
            // Continuation of a multi-line summary.
            summary.push(' ');
            summary.push_str(trimmed);
        }
    }

    if !saw_tags {
        summary = response.trim().to_string();
    }

    YearSummary {
        year,
        summary,
        territorial_changes: territorial,
        diplomatic_changes: diplomatic,
        consolidated_at: Utc::now(),
    }
}

fn parse_change_list(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return Vec::new();
    }
    trimmed
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("none"))
        .collect()
}

/// Deterministic summary synthesized from entry counts plus the board delta.
fn fallback_year_summary(memory: &AgentMemory, year: u16, board: Option<&YearBoardDelta>) -> YearSummary {
    let negotiations = memory
        .current_year_diary
        .iter()
        .filter(|e| e.kind == DiaryEntryKind::Negotiation)
        .count();
    let order_phases = memory
        .current_year_diary
        .iter()
        .filter(|e| e.kind == DiaryEntryKind::Orders)
        .count();

    let mut summary = format!(
        "Year {year}: {negotiations} negotiation rounds and {order_phases} order phases recorded."
    );
    let (territorial, gained, lost) = match board {
        Some(b) => (
            b.gained
                .iter()
                .map(|sc| format!("gained {sc}"))
                .chain(b.lost.iter().map(|sc| format!("lost {sc}")))
                .collect(),
            b.gained.len(),
            b.lost.len(),
        ),
        None => (Vec::new(), 0, 0),
    };
    if gained + lost > 0 {
        summary.push_str(&format!(" Supply centers: +{gained}/-{lost}."));
    }

    YearSummary {
        year,
        summary,
        territorial_changes: territorial,
        diplomatic_changes: Vec::new(),
        consolidated_at: Utc::now(),
    }
}
