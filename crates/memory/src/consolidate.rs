//! Turn-summary consolidation with trust preservation.
//!
//! When the per-phase summaries pile up, the oldest prefix is replaced by a
//! single compressed block. The prose can come from an LLM or the
//! deterministic fallback, but every trust-affecting event in the replaced
//! range is embedded in the block verbatim: consolidation never loses a
//! betrayal.

use chrono::Utc;
use tracing::{debug, warn};

use backchannel_llm::{ChatMessage, LlmProvider, LlmRequest};

use crate::schema::{
    AgentMemory, ConsolidatedBlock, MemoryEvent, MemoryEventKind, TurnStamp, TurnSummary,
};

pub const CONSOLIDATION_THRESHOLD: usize = 10;
pub const RECENT_TURNS_TO_KEEP: usize = 5;
pub const MAX_CONSOLIDATED_BLOCKS: usize = 6;

/// Highlight keywords that synthesize a preserved betrayal event even when
/// no typed event was recorded.
const HIGHLIGHT_KEYWORDS: [&str; 3] = ["betray", "broken", "stab"];
const SYNTHESIZED_BETRAYAL_IMPACT: f64 = -0.3;

/// Append the post-movement turn summary.
pub fn record_turn_summary(memory: &mut AgentMemory, summary: TurnSummary) {
    memory.turn_summaries.push(summary);
    memory.touch();
}

pub fn should_consolidate_turns(memory: &AgentMemory) -> bool {
    memory.turn_summaries.len() > CONSOLIDATION_THRESHOLD
}

/// Replace the oldest turn summaries with a consolidated block, keeping the
/// most recent [`RECENT_TURNS_TO_KEEP`] intact. Pass `None` for `llm` (or
/// let the call fail) to use the deterministic summary.
pub async fn consolidate_turns(memory: &mut AgentMemory, llm: Option<&dyn LlmProvider>) {
    if memory.turn_summaries.len() <= RECENT_TURNS_TO_KEEP {
        return;
    }
    let cut = memory.turn_summaries.len() - RECENT_TURNS_TO_KEEP;
    let prefix: Vec<TurnSummary> = memory.turn_summaries.drain(..cut).collect();

    let from = prefix.first().map(TurnSummary::stamp).unwrap_or(TurnStamp::new(0, backchannel_game::Season::Spring));
    let to = prefix.last().map(TurnSummary::stamp).unwrap_or(from);

    let trust_events = preserved_trust_events(memory, &prefix, from, to);
    let (gained, lost) = net_center_changes(&prefix);

    let summary = match llm {
        Some(llm) => match llm_block_summary(&prefix, llm).await {
            Ok(text) => text,
            Err(err) => {
                warn!(power = %memory.power, %err, "turn consolidation LLM failed, using fallback");
                fallback_block_summary(&prefix, &gained, &lost, trust_events.len())
            }
        },
        None => fallback_block_summary(&prefix, &gained, &lost, trust_events.len()),
    };

    debug!(
        power = %memory.power,
        turns = prefix.len(),
        preserved = trust_events.len(),
        "turn summaries consolidated"
    );

    memory.consolidated_blocks.push(ConsolidatedBlock {
        from,
        to,
        summary,
        trust_events,
        centers_gained: gained,
        centers_lost: lost,
        consolidated_at: Utc::now(),
    });

    while memory.consolidated_blocks.len() > MAX_CONSOLIDATED_BLOCKS {
        merge_oldest_blocks(memory);
    }
    memory.touch();
}

/// Trust-affecting events within the consolidated range, plus betrayal
/// events synthesized from highlight keywords. Deduplicated by
/// (stamp, description).
fn preserved_trust_events(
    memory: &AgentMemory,
    prefix: &[TurnSummary],
    from: TurnStamp,
    to: TurnStamp,
) -> Vec<MemoryEvent> {
    let mut preserved: Vec<MemoryEvent> = memory
        .events
        .iter()
        .filter(|e| e.kind.affects_trust() && e.stamp() >= from && e.stamp() <= to)
        .cloned()
        .collect();

    let mut seen: std::collections::HashSet<(TurnStamp, String)> = preserved
        .iter()
        .map(|e| (e.stamp(), e.description.clone()))
        .collect();

    for summary in prefix {
        for highlight in &summary.diplomatic_highlights {
            let lower = highlight.to_lowercase();
            if !HIGHLIGHT_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
                continue;
            }
            let key = (summary.stamp(), highlight.clone());
            if !seen.insert(key) {
                continue;
            }
            preserved.push(MemoryEvent {
                kind: MemoryEventKind::Betrayal,
                year: summary.year,
                season: summary.season,
                powers: Vec::new(),
                description: highlight.clone(),
                trust_impact: SYNTHESIZED_BETRAYAL_IMPACT,
            });
        }
    }

    preserved.sort_by_key(|e| e.stamp());
    preserved
}

/// Aggregate supply-center changes across the range; a center appearing in
/// both gained and lost cancels out (once per appearance).
fn net_center_changes(prefix: &[TurnSummary]) -> (Vec<String>, Vec<String>) {
    let gained: Vec<String> = prefix.iter().flat_map(|t| t.centers_gained.clone()).collect();
    let lost: Vec<String> = prefix.iter().flat_map(|t| t.centers_lost.clone()).collect();
    cancel_centers(gained, lost)
}

fn cancel_centers(gained: Vec<String>, lost: Vec<String>) -> (Vec<String>, Vec<String>) {
    let mut remaining_lost = lost;
    let mut net_gained = Vec::new();
    for sc in gained {
        if let Some(pos) = remaining_lost.iter().position(|l| *l == sc) {
            remaining_lost.remove(pos);
        } else {
            net_gained.push(sc);
        }
    }
    (net_gained, remaining_lost)
}

async fn llm_block_summary(
    prefix: &[TurnSummary],
    llm: &dyn LlmProvider,
) -> Result<String, backchannel_llm::LlmError> {
    let mut prompt = String::from(
        "Condense these Diplomacy turn records into 2-3 sentences. Keep any \
         betrayals or broken promises explicit.\n\n",
    );
    for t in prefix {
        prompt.push_str(&format!(
            "{} {}: {} orders ({} failed), gained [{}], lost [{}], highlights: {}\n",
            t.season,
            t.year,
            t.orders_submitted,
            t.orders_failed,
            t.centers_gained.join(", "),
            t.centers_lost.join(", "),
            t.diplomatic_highlights.join("; "),
        ));
    }
    let request = LlmRequest {
        messages: vec![ChatMessage::user(prompt)],
        model: None,
        temperature: Some(0.3),
        max_tokens: Some(300),
        stop_sequences: Vec::new(),
    };
    llm.complete(&request).await.map(|r| r.content.trim().to_string())
}

fn fallback_block_summary(
    prefix: &[TurnSummary],
    gained: &[String],
    lost: &[String],
    betrayal_count: usize,
) -> String {
    let orders: u32 = prefix.iter().map(|t| t.orders_submitted).sum();
    let failed: u32 = prefix.iter().map(|t| t.orders_failed).sum();
    let net = gained.len() as i64 - lost.len() as i64;

    let mut highlights: Vec<&String> =
        prefix.iter().flat_map(|t| t.diplomatic_highlights.iter()).collect();
    highlights.truncate(3);
    let highlight_text = if highlights.is_empty() {
        String::from("none")
    } else {
        highlights.iter().map(|h| h.as_str()).collect::<Vec<_>>().join("; ")
    };

    format!(
        "{} turns: net {net:+} centers (gained [{}], lost [{}]), {orders} orders ({failed} failed). \
         Highlights: {highlight_text}. Trust events preserved: {betrayal_count}.",
        prefix.len(),
        gained.join(", "),
        lost.join(", "),
    )
}

/// Merge the two oldest blocks: `|`-joined summaries, trust events unioned
/// with (stamp, description) dedup, center changes re-cancelled.
fn merge_oldest_blocks(memory: &mut AgentMemory) {
    if memory.consolidated_blocks.len() < 2 {
        return;
    }
    let second = memory.consolidated_blocks.remove(1);
    let first = &mut memory.consolidated_blocks[0];

    first.to = second.to;
    first.summary = format!("{} | {}", first.summary, second.summary);

    let mut seen: std::collections::HashSet<(TurnStamp, String)> = first
        .trust_events
        .iter()
        .map(|e| (e.stamp(), e.description.clone()))
        .collect();
    for event in second.trust_events {
        if seen.insert((event.stamp(), event.description.clone())) {
            first.trust_events.push(event);
        }
    }
    first.trust_events.sort_by_key(|e| e.stamp());

    let gained = first
        .centers_gained
        .drain(..)
        .chain(second.centers_gained)
        .collect::<Vec<_>>();
    let lost = first
        .centers_lost
        .drain(..)
        .chain(second.centers_lost)
        .collect::<Vec<_>>();
    let (gained, lost) = cancel_centers(gained, lost);
    first.centers_gained = gained;
    first.centers_lost = lost;
    first.consolidated_at = Utc::now();
}
