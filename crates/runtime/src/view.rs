//! Per-power game view: what one agent is allowed to see each turn.
//!
//! No hidden information — other powers' units and supply centers are
//! public in Diplomacy — but no other power's orders, press, or memory.

use backchannel_game::{GameEngine, Power};

/// Render the board from `power`'s seat.
pub fn build_game_view(power: Power, engine: &dyn GameEngine) -> String {
    let state = engine.state();
    let mut out = String::new();

    out.push_str("YOUR UNITS (with reachable provinces):\n");
    let own: Vec<_> = state.units_of(power).collect();
    if own.is_empty() {
        out.push_str("  none\n");
    }
    for unit in &own {
        let adjacent = engine.adjacent(&unit.location);
        out.push_str(&format!(
            "  {} {} -> [{}]\n",
            unit.unit_type,
            unit.location,
            adjacent.join(", ")
        ));
    }

    out.push_str("\nOTHER POWERS' UNITS:\n");
    for other in Power::ALL {
        if other == power {
            continue;
        }
        let units: Vec<String> = state
            .units_of(other)
            .map(|u| format!("{} {}", u.unit_type, u.location))
            .collect();
        if !units.is_empty() {
            out.push_str(&format!("  {other}: {}\n", units.join(", ")));
        }
    }

    out.push_str("\nSUPPLY CENTERS:\n");
    for p in Power::ALL {
        let centers = state.supply_centers_of(p);
        out.push_str(&format!("  {p} ({}): {}\n", centers.len(), centers.join(", ")));
    }

    let retreats = state.retreats_of(power);
    if !retreats.is_empty() {
        out.push_str("\nYOUR PENDING RETREATS:\n");
        for retreat in retreats {
            out.push_str(&format!(
                "  {} {} dislodged, may retreat to [{}]\n",
                retreat.unit_type,
                retreat.from,
                retreat.options.join(", ")
            ));
        }
    }

    let delta = state.build_delta(power);
    if delta != 0 {
        out.push_str(&format!("\nBUILD DELTA: {delta:+}\n"));
        if delta > 0 {
            let occupied: Vec<&str> = own.iter().map(|u| u.location.as_str()).collect();
            let available: Vec<&str> = power
                .home_centers()
                .iter()
                .copied()
                .filter(|hc| {
                    state.supply_centers.get(*hc) == Some(&power) && !occupied.contains(hc)
                })
                .collect();
            out.push_str(&format!("AVAILABLE HOME CENTERS: {}\n", available.join(", ")));
        }
    }

    let outcomes = engine.last_outcomes(power);
    if !outcomes.is_empty() {
        out.push_str("\nLAST PHASE RESULTS:\n");
        for outcome in outcomes {
            let mark = if outcome.succeeded { "ok" } else { "FAILED" };
            match &outcome.note {
                Some(note) => out.push_str(&format!("  {} [{mark}: {note}]\n", outcome.order)),
                None => out.push_str(&format!("  {} [{mark}]\n", outcome.order)),
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use backchannel_game::{
        BuildOrder, EngineError, GameState, Order, OrderError, OrderOutcome, PendingRetreat,
        PhaseKind, RetreatOrder, Season, Unit, UnitType,
    };
    use std::collections::BTreeMap;

    struct FixedEngine {
        state: GameState,
    }

    impl GameEngine for FixedEngine {
        fn state(&self) -> &GameState {
            &self.state
        }
        fn adjacent(&self, location: &str) -> Vec<String> {
            match location {
                "LON" => vec!["ENG".into(), "NTH".into(), "WAL".into(), "YOR".into()],
                _ => vec![],
            }
        }
        fn validate_order(&self, _power: Power, _order: &Order) -> Result<(), OrderError> {
            Ok(())
        }
        fn submit_orders(&mut self, _power: Power, _orders: Vec<Order>) -> Result<(), EngineError> {
            Ok(())
        }
        fn submit_retreats(
            &mut self,
            _power: Power,
            _retreats: Vec<RetreatOrder>,
        ) -> Result<(), EngineError> {
            Ok(())
        }
        fn submit_builds(
            &mut self,
            _power: Power,
            _builds: Vec<BuildOrder>,
        ) -> Result<(), EngineError> {
            Ok(())
        }
        fn resolve_movement(&mut self) -> Result<(), EngineError> {
            Ok(())
        }
        fn resolve_retreats(&mut self) -> Result<(), EngineError> {
            Ok(())
        }
        fn resolve_builds(&mut self) -> Result<(), EngineError> {
            Ok(())
        }
        fn last_outcomes(&self, power: Power) -> Vec<OrderOutcome> {
            if power == Power::England {
                vec![OrderOutcome {
                    order: "F LON -> NTH".into(),
                    succeeded: false,
                    note: Some("bounced in NTH".into()),
                }]
            } else {
                vec![]
            }
        }
    }

    fn engine() -> FixedEngine {
        let mut supply_centers = BTreeMap::new();
        supply_centers.insert("LON".to_string(), Power::England);
        supply_centers.insert("EDI".to_string(), Power::England);
        supply_centers.insert("PAR".to_string(), Power::France);
        FixedEngine {
            state: GameState {
                year: 1901,
                season: Season::Spring,
                phase: PhaseKind::Movement,
                units: vec![
                    Unit { power: Power::England, unit_type: UnitType::Fleet, location: "LON".into() },
                    Unit { power: Power::France, unit_type: UnitType::Army, location: "PAR".into() },
                ],
                supply_centers,
                pending_retreats: vec![PendingRetreat {
                    power: Power::England,
                    unit_type: UnitType::Fleet,
                    from: "NTH".into(),
                    options: vec!["NWG".into(), "SKA".into()],
                }],
                pending_builds: BTreeMap::from([(Power::England, 1)]),
                winner: None,
                draw: false,
            },
        }
    }

    #[test]
    fn view_shows_own_units_with_adjacency() {
        let view = build_game_view(Power::England, &engine());
        assert!(view.contains("F LON -> [ENG, NTH, WAL, YOR]"));
    }

    #[test]
    fn view_groups_other_units_without_orders() {
        let view = build_game_view(Power::England, &engine());
        assert!(view.contains("FRANCE: A PAR"));
        assert!(!view.contains("FRANCE: A PAR ->"));
    }

    #[test]
    fn view_includes_retreats_builds_and_outcomes() {
        let view = build_game_view(Power::England, &engine());
        assert!(view.contains("F NTH dislodged, may retreat to [NWG, SKA]"));
        assert!(view.contains("BUILD DELTA: +1"));
        // LON is occupied by the fleet; EDI is free.
        assert!(view.contains("AVAILABLE HOME CENTERS: EDI"));
        assert!(view.contains("F LON -> NTH [FAILED: bounced in NTH]"));
    }

    #[test]
    fn view_for_other_power_omits_england_private_sections() {
        let view = build_game_view(Power::France, &engine());
        assert!(!view.contains("BUILD DELTA"));
        assert!(!view.contains("PENDING RETREATS"));
        assert!(view.contains("ENGLAND: F LON"));
    }
}
