//! Turn prompt assembly.
//!
//! Callers pre-compute everything async (game view, drained press) and
//! hand it over; assembly itself is pure. The leading `Y:/S:/P:` marker
//! line is load-bearing: the session window summarizer keys on it when
//! this message is eventually evicted.

use backchannel_game::{PhaseId, PhaseKind, Power};
use backchannel_memory::{AgentMemory, context_diary};
use backchannel_press::PressMessage;
use backchannel_session::MAX_RECALL_CALLS_PER_TURN;

/// How many recent events the prompt shows.
const RECENT_EVENT_LIMIT: usize = 5;

pub struct TurnPromptInputs<'a> {
    pub power: Power,
    pub phase: PhaseId,
    pub game_view: &'a str,
    pub memory: &'a AgentMemory,
    /// Unread press drained for this turn.
    pub incoming: &'a [PressMessage],
}

pub fn build_turn_prompt(inputs: &TurnPromptInputs<'_>) -> String {
    let phase = inputs.phase;
    let marker = format!("Y:{} S:{} P:{}", phase.year, phase.season, phase.kind);

    let strategic = build_strategic_summary(inputs.memory);
    let relationships = build_relationships_block(inputs.memory);
    let diary = context_diary(inputs.memory);
    let events = build_recent_events(inputs.memory);
    let notes = build_priority_notes(inputs.memory);
    let press = build_press_block(inputs.incoming);
    let instructions = phase_instructions(phase.kind);

    let mut prompt = format!(
        "{marker}\nIt is {phase}. You are {power}.\n\n{strategic}\n\nBOARD:\n{view}\n",
        power = inputs.power,
        view = inputs.game_view,
    );
    if !relationships.is_empty() {
        prompt.push_str(&format!("\nRELATIONSHIPS:\n{relationships}\n"));
    }
    if !diary.is_empty() {
        prompt.push_str(&format!("\nYOUR DIARY:\n{diary}\n"));
    }
    if !events.is_empty() {
        prompt.push_str(&format!("\nRECENT EVENTS:\n{events}\n"));
    }
    if !notes.is_empty() {
        prompt.push_str(&format!("\nSTANDING NOTES:\n{notes}\n"));
    }
    if !press.is_empty() {
        prompt.push_str(&format!("\nINCOMING PRESS:\n{press}\n"));
    }
    prompt.push_str(&format!("\n{instructions}\n"));
    prompt
}

fn build_strategic_summary(memory: &AgentMemory) -> String {
    let allies: Vec<String> = memory.current_allies.iter().map(Power::to_string).collect();
    let enemies: Vec<String> = memory.current_enemies.iter().map(Power::to_string).collect();
    format!(
        "SITUATION: allies [{}], enemies [{}], {} commitments open, {} years summarized.",
        allies.join(", "),
        enemies.join(", "),
        memory
            .active_commitments
            .iter()
            .filter(|c| !c.fulfilled && !c.broken)
            .count(),
        memory.year_summaries.len(),
    )
}

fn build_relationships_block(memory: &AgentMemory) -> String {
    memory
        .relationships
        .iter()
        .map(|(power, rel)| {
            let standing = if rel.is_ally {
                "ally"
            } else if rel.is_enemy {
                "enemy"
            } else {
                "neutral"
            };
            format!("  {power}: trust {:+.2} ({standing})", rel.trust_level)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_recent_events(memory: &AgentMemory) -> String {
    let start = memory.events.len().saturating_sub(RECENT_EVENT_LIMIT);
    memory.events[start..]
        .iter()
        .map(|e| format!("  {} {}: {}", e.season, e.year, e.description))
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_priority_notes(memory: &AgentMemory) -> String {
    use backchannel_memory::NotePriority;
    memory
        .strategic_notes
        .iter()
        .filter(|n| n.priority >= NotePriority::High)
        .map(|n| format!("  [{:?}] {}: {}", n.priority, n.subject, n.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_press_block(incoming: &[PressMessage]) -> String {
    incoming
        .iter()
        .map(|m| format!("  {} says: {}", m.from, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn phase_instructions(kind: PhaseKind) -> String {
    let recall_hint = format!(
        "You may first emit one line `RECALL: phase=<tag> type=<messages|orders|all> \
         [power=<POWER>] [count=<n>]` to pull past diary context (at most \
         {MAX_RECALL_CALLS_PER_TURN} recalls per turn)."
    );
    match kind {
        PhaseKind::Diplomacy => format!(
            "Send focused press to one or two powers. Respond with:\n\
             DIPLOMACY:\n\
             SEND <POWER>: [OPENING|COUNTER|FINAL|ACCEPT|REJECT] \"<message>\"\n\
             {recall_hint}"
        ),
        PhaseKind::Movement => format!(
            "Issue one order per unit, using only the reachable provinces listed. Respond with:\n\
             ORDERS:\n\
             A PROV HOLD | A PROV -> DEST [VIA CONVOY] | F PROV SUPPORT A OTHER [-> DEST] | \
             F PROV CONVOY A OTHER -> DEST\n\
             Then optionally REASONING: on its own lines.\n\
             {recall_hint}"
        ),
        PhaseKind::Retreat => "Order each dislodged unit. Respond with:\n\
             RETREATS:\n\
             A PROV -> DEST | A PROV DISBAND"
            .to_string(),
        PhaseKind::Build => "Spend your build delta. Respond with:\n\
             BUILDS:\n\
             BUILD A|F PROV | DISBAND A|F PROV"
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backchannel_game::Season;
    use backchannel_memory::diary::add_negotiation_entry;
    use backchannel_memory::trust::update_trust;
    use chrono::Utc;
    use uuid::Uuid;

    fn inputs_with<'a>(
        memory: &'a AgentMemory,
        incoming: &'a [PressMessage],
        kind: PhaseKind,
    ) -> TurnPromptInputs<'a> {
        TurnPromptInputs {
            power: Power::England,
            phase: PhaseId::new(1901, Season::Spring, kind),
            game_view: "BOARD VIEW HERE",
            memory,
            incoming,
        }
    }

    #[test]
    fn prompt_leads_with_phase_marker() {
        let memory = AgentMemory::new(Power::England, "g");
        let prompt = build_turn_prompt(&inputs_with(&memory, &[], PhaseKind::Movement));
        assert!(prompt.starts_with("Y:1901 S:SPRING P:MOVEMENT\n"));
        assert!(prompt.contains("BOARD VIEW HERE"));
        assert!(prompt.contains("ORDERS:"));
    }

    #[test]
    fn diplomacy_prompt_asks_for_sends() {
        let memory = AgentMemory::new(Power::England, "g");
        let prompt = build_turn_prompt(&inputs_with(&memory, &[], PhaseKind::Diplomacy));
        assert!(prompt.contains("SEND <POWER>:"));
        assert!(prompt.contains("RECALL:"));
    }

    #[test]
    fn prompt_carries_relationships_diary_and_press() {
        let mut memory = AgentMemory::new(Power::England, "g");
        update_trust(&mut memory, Power::France, 0.6, 1901, Season::Spring);
        add_negotiation_entry(
            &mut memory,
            PhaseId::new(1901, Season::Spring, PhaseKind::Diplomacy),
            "FRANCE offered the channel",
        );
        let incoming = vec![PressMessage {
            id: Uuid::new_v4(),
            from: Power::France,
            to: Power::England,
            phase: PhaseId::new(1901, Season::Spring, PhaseKind::Diplomacy),
            content: "the channel is yours".into(),
            sent_at: Utc::now(),
        }];
        let prompt = build_turn_prompt(&inputs_with(&memory, &incoming, PhaseKind::Diplomacy));
        assert!(prompt.contains("FRANCE: trust +0.60 (ally)"));
        assert!(prompt.contains("FRANCE offered the channel"));
        assert!(prompt.contains("FRANCE says: the channel is yours"));
        assert!(prompt.contains("allies [FRANCE]"));
    }

    #[test]
    fn retreat_and_build_prompts_skip_recall() {
        let memory = AgentMemory::new(Power::England, "g");
        let retreat = build_turn_prompt(&inputs_with(&memory, &[], PhaseKind::Retreat));
        assert!(retreat.contains("RETREATS:"));
        assert!(!retreat.contains("RECALL:"));
        let build = build_turn_prompt(&inputs_with(&memory, &[], PhaseKind::Build));
        assert!(build.contains("BUILDS:"));
    }
}
