//! The trust ledger: clamped trust updates, derived standings, and the
//! durable union of recent and consolidated trust events.

use tracing::debug;

use backchannel_game::{Power, Season};

use crate::schema::{AgentMemory, MemoryEvent, Relationship, TurnStamp};

pub const ALLY_THRESHOLD: f64 = 0.5;
pub const ENEMY_THRESHOLD: f64 = -0.5;

/// Apply a trust delta toward `other`, clamped into [-1, 1], refreshing the
/// relationship's derived fields and the memory-level ally/enemy lists.
pub fn update_trust(memory: &mut AgentMemory, other: Power, delta: f64, year: u16, season: Season) {
    if other == memory.power {
        return;
    }

    let level = memory.trust_levels.entry(other).or_insert(0.0);
    *level = (*level + delta).clamp(-1.0, 1.0);
    let level = *level;

    let rel = memory
        .relationships
        .entry(other)
        .or_insert_with(Relationship::neutral);
    rel.trust_level = level;
    rel.is_ally = level >= ALLY_THRESHOLD;
    rel.is_enemy = level <= ENEMY_THRESHOLD;
    rel.last_interaction = Some(TurnStamp::new(year, season));

    debug!(power = %memory.power, toward = %other, delta, level, "trust updated");
    refresh_standings(memory);
    memory.touch();
}

/// Recompute the derived ally/enemy convenience lists from relationships.
pub fn refresh_standings(memory: &mut AgentMemory) {
    memory.current_allies = memory
        .relationships
        .iter()
        .filter(|(_, r)| r.is_ally)
        .map(|(p, _)| *p)
        .collect();
    memory.current_enemies = memory
        .relationships
        .iter()
        .filter(|(_, r)| r.is_enemy)
        .map(|(p, _)| *p)
        .collect();
}

/// Append an event and apply its trust impact to every power it names.
pub fn record_event(memory: &mut AgentMemory, event: MemoryEvent) {
    for power in event.powers.clone() {
        update_trust(memory, power, event.trust_impact, event.year, event.season);
    }
    memory.events.push(event);
    memory.touch();
}

/// Every trust-affecting event ever recorded: recent events still in the
/// live list plus events preserved inside consolidated blocks, deduplicated
/// where the two overlap. Consolidation never loses a betrayal.
pub fn all_trust_events(memory: &AgentMemory) -> Vec<&MemoryEvent> {
    let mut seen: std::collections::HashSet<(TurnStamp, &str)> = std::collections::HashSet::new();
    let mut events: Vec<&MemoryEvent> = memory
        .consolidated_blocks
        .iter()
        .flat_map(|b| b.trust_events.iter())
        .chain(memory.events.iter().filter(|e| e.kind.affects_trust()))
        .filter(|e| seen.insert((e.stamp(), e.description.as_str())))
        .collect();
    events.sort_by_key(|e| e.stamp());
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MemoryEventKind;

    fn event(kind: MemoryEventKind, powers: Vec<Power>, impact: f64) -> MemoryEvent {
        MemoryEvent {
            kind,
            year: 1901,
            season: Season::Spring,
            powers,
            description: "test".into(),
            trust_impact: impact,
        }
    }

    #[test]
    fn trust_clamps_at_both_bounds() {
        let mut memory = AgentMemory::new(Power::England, "g");
        update_trust(&mut memory, Power::France, 0.9, 1901, Season::Spring);
        update_trust(&mut memory, Power::France, 0.9, 1901, Season::Fall);
        assert_eq!(memory.trust_toward(Power::France), 1.0);

        update_trust(&mut memory, Power::France, -3.0, 1902, Season::Spring);
        assert_eq!(memory.trust_toward(Power::France), -1.0);
    }

    #[test]
    fn repeated_cooperation_reaches_ally() {
        // Scenario S1: four cooperations at +0.15 → 0.60 and ally status.
        let mut memory = AgentMemory::new(Power::England, "g");
        for _ in 0..4 {
            record_event(
                &mut memory,
                event(MemoryEventKind::Cooperation, vec![Power::France], 0.15),
            );
        }
        assert!((memory.trust_toward(Power::France) - 0.60).abs() < 1e-9);
        assert!(memory.current_allies.contains(&Power::France));
        assert!(memory.relationships[&Power::France].is_ally);
        assert_eq!(memory.events.len(), 4);
    }

    #[test]
    fn betrayal_flips_ally_to_enemy_with_clamp() {
        // Scenario S2: +0.6 alliance then -1.2 betrayal clamps at -0.6.
        let mut memory = AgentMemory::new(Power::England, "g");
        record_event(
            &mut memory,
            event(MemoryEventKind::AllianceFormed, vec![Power::France], 0.6),
        );
        assert!(memory.relationships[&Power::France].is_ally);

        record_event(
            &mut memory,
            event(MemoryEventKind::Betrayal, vec![Power::France], -1.2),
        );
        let rel = &memory.relationships[&Power::France];
        assert!((rel.trust_level - (-0.6)).abs() < 1e-9);
        assert!(!rel.is_ally);
        assert!(rel.is_enemy);
        assert!(memory.current_enemies.contains(&Power::France));
        assert!(!memory.current_allies.contains(&Power::France));
    }

    #[test]
    fn record_event_applies_impact_once_per_power() {
        let mut memory = AgentMemory::new(Power::England, "g");
        record_event(
            &mut memory,
            event(MemoryEventKind::Betrayal, vec![Power::France], -0.5),
        );
        assert!((memory.trust_toward(Power::France) - (-0.5)).abs() < 1e-9);
        assert_eq!(memory.trust_toward(Power::Germany), 0.0);
    }

    #[test]
    fn last_interaction_is_stamped() {
        let mut memory = AgentMemory::new(Power::England, "g");
        update_trust(&mut memory, Power::Russia, 0.1, 1903, Season::Fall);
        assert_eq!(
            memory.relationships[&Power::Russia].last_interaction,
            Some(TurnStamp::new(1903, Season::Fall))
        );
    }

    #[test]
    fn self_trust_is_ignored() {
        let mut memory = AgentMemory::new(Power::England, "g");
        update_trust(&mut memory, Power::England, 0.5, 1901, Season::Spring);
        assert!(!memory.trust_levels.contains_key(&Power::England));
    }

    #[test]
    fn all_trust_events_unions_blocks_and_recents() {
        let mut memory = AgentMemory::new(Power::England, "g");
        record_event(
            &mut memory,
            event(MemoryEventKind::Betrayal, vec![Power::France], -0.3),
        );
        // A cooperation event does not affect trust durability.
        record_event(
            &mut memory,
            event(MemoryEventKind::Cooperation, vec![Power::Italy], 0.1),
        );
        memory.consolidated_blocks.push(crate::schema::ConsolidatedBlock {
            from: TurnStamp::new(1899, Season::Spring),
            to: TurnStamp::new(1900, Season::Fall),
            summary: "old".into(),
            trust_events: vec![MemoryEvent {
                kind: MemoryEventKind::PromiseBroken,
                year: 1900,
                season: Season::Fall,
                powers: vec![Power::Turkey],
                description: "old break".into(),
                trust_impact: -0.15,
            }],
            centers_gained: vec![],
            centers_lost: vec![],
            consolidated_at: chrono::Utc::now(),
        });

        let events = all_trust_events(&memory);
        assert_eq!(events.len(), 2);
        // Oldest first.
        assert_eq!(events[0].description, "old break");
        assert_eq!(events[1].description, "test");
    }
}
