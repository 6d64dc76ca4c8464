//! Strategic-note merging: keeps the note list bounded without ever
//! dropping a CRITICAL note.

use tracing::debug;

use backchannel_game::Season;

use crate::schema::{AgentMemory, NotePriority, StrategicNote};

pub const MAX_STRATEGIC_NOTES: usize = 20;

/// SPRING < FALL < WINTER; compared only after year.
fn season_index(season: Season) -> u8 {
    match season {
        Season::Spring => 0,
        Season::Fall => 1,
        Season::Winter => 2,
    }
}

fn recency_key(note: &StrategicNote) -> (NotePriority, u16, u8) {
    (note.priority, note.year, season_index(note.season))
}

/// Merge notes sharing a subject (case-folded, trimmed), then if still over
/// budget retain by priority. Runs only once the list exceeds
/// [`MAX_STRATEGIC_NOTES`].
pub fn merge_strategic_notes(memory: &mut AgentMemory) {
    if memory.strategic_notes.len() <= MAX_STRATEGIC_NOTES {
        return;
    }
    let before = memory.strategic_notes.len();

    // Group by normalized subject, preserving first-seen group order.
    let mut order: Vec<String> = Vec::new();
    let mut groups: std::collections::HashMap<String, Vec<StrategicNote>> =
        std::collections::HashMap::new();
    for note in memory.strategic_notes.drain(..) {
        let key = note.subject.trim().to_lowercase();
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(note);
    }

    let mut merged: Vec<StrategicNote> = Vec::new();
    for key in order {
        let mut group = groups.remove(&key).unwrap_or_default();
        if group.len() == 1 {
            merged.extend(group.pop());
            continue;
        }
        // Winner: highest priority, then most recent year, then season order.
        let winner_idx = group
            .iter()
            .enumerate()
            .max_by_key(|(_, n)| recency_key(n))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let mut winner = group.swap_remove(winner_idx);
        for other in &group {
            winner.content.push_str(&format!(" [{}]", other.content));
        }
        merged.push(winner);
    }

    // Still over budget: keep CRITICAL unconditionally, then fill with the
    // highest-priority / most recent of the rest.
    if merged.len() > MAX_STRATEGIC_NOTES {
        let (critical, mut rest): (Vec<StrategicNote>, Vec<StrategicNote>) =
            merged.into_iter().partition(|n| n.priority == NotePriority::Critical);
        rest.sort_by_key(|n| std::cmp::Reverse(recency_key(n)));
        rest.truncate(MAX_STRATEGIC_NOTES.saturating_sub(critical.len()));
        merged = critical;
        merged.extend(rest);
        merged.sort_by_key(|n| (n.year, season_index(n.season)));
    }

    debug!(power = %memory.power, before, after = merged.len(), "strategic notes merged");
    memory.strategic_notes = merged;
    memory.touch();
}
