//! The sliding conversation window.
//!
//! When a session's history outgrows the configured maximum, the oldest
//! messages are folded into a single synthetic `[CONVERSATION SUMMARY]`
//! user message. The index-0 system message is always preserved, so the
//! window is `[system, summary, ...recent]` and append stays O(1) amortized.

use backchannel_llm::{ChatMessage, ChatRole};

pub const SUMMARY_MARKER: &str = "[CONVERSATION SUMMARY]";
const SUMMARY_CHAR_CAP: usize = 2000;
/// How many order lines / directives one evicted message contributes.
const LINES_PER_MESSAGE: usize = 4;

/// Shrink `history` to at most `max` messages, summarizing what falls off.
/// No-op while the history fits.
pub fn enforce_window(history: &mut Vec<ChatMessage>, max: usize) {
    if history.len() <= max || max < 3 {
        return;
    }

    let has_system = history.first().is_some_and(|m| m.role == ChatRole::System);
    let head = usize::from(has_system);

    // Layout after eviction: [system] + [summary] + recent.
    let keep_recent = max - head - 1;
    let tail_start = history.len() - keep_recent;

    let evicted: Vec<ChatMessage> = history.drain(head..tail_start).collect();
    let summary = summarize_evicted(&evicted);
    history.insert(head, ChatMessage::user(summary));
}

/// Fold evicted messages into one summary string: prior summary content is
/// merged in, assistant messages contribute their `ORDERS:` lines and
/// `SEND <POWER>:` directives, user messages contribute their
/// `Y:.. S:.. P:..` phase markers.
fn summarize_evicted(evicted: &[ChatMessage]) -> String {
    let mut parts: Vec<String> = Vec::new();

    for message in evicted {
        match message.role {
            ChatRole::User if message.content.starts_with(SUMMARY_MARKER) => {
                // A previous summary: merge its body first.
                let body = message.content[SUMMARY_MARKER.len()..].trim();
                if !body.is_empty() {
                    parts.insert(0, body.to_string());
                }
            }
            ChatRole::User => {
                for line in message.content.lines() {
                    let trimmed = line.trim();
                    if trimmed.starts_with("Y:") && trimmed.contains("S:") && trimmed.contains("P:") {
                        parts.push(trimmed.to_string());
                    }
                }
            }
            ChatRole::Assistant => {
                parts.extend(extract_assistant_facts(&message.content));
            }
            ChatRole::System => {}
        }
    }

    let mut summary = String::from(SUMMARY_MARKER);
    summary.push('\n');
    summary.push_str(&parts.join("\n"));
    if summary.len() > SUMMARY_CHAR_CAP {
        let mut cut = SUMMARY_CHAR_CAP;
        while !summary.is_char_boundary(cut) {
            cut -= 1;
        }
        summary.truncate(cut);
    }
    summary
}

fn extract_assistant_facts(content: &str) -> Vec<String> {
    let mut facts = Vec::new();
    let mut in_orders = false;
    let mut order_lines = 0;

    for line in content.lines() {
        let trimmed = line.trim();
        let upper = trimmed.to_ascii_uppercase();

        if upper.starts_with("ORDERS:") {
            in_orders = true;
            order_lines = 0;
            facts.push("ORDERS:".to_string());
            continue;
        }
        if upper.starts_with("SEND ") && trimmed.contains(':') {
            in_orders = false;
            let directive: String = trimmed.chars().take(120).collect();
            facts.push(directive);
            continue;
        }
        if in_orders {
            if trimmed.is_empty() || upper.ends_with(':') {
                in_orders = false;
                continue;
            }
            if order_lines < LINES_PER_MESSAGE {
                facts.push(format!("  {trimmed}"));
                order_lines += 1;
            }
        }
    }
    facts
}
