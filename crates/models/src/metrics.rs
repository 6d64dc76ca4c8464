//! Per-game model metrics.
//!
//! A process-wide registry keyed by game id, initialized lazily, cleared at
//! game end. Write-only from the runtime: it records request counts, parse
//! failures, and dropped orders per (power, model) so per-model error rates
//! can be reported after a game.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use serde::Serialize;
use tracing::debug;

use backchannel_game::Power;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelCallStats {
    pub requests: u64,
    pub parse_failures: u64,
    pub invalid_orders: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Reasons for dropped orders, most recent last. Bounded.
    pub drop_reasons: Vec<String>,
}

const MAX_DROP_REASONS: usize = 50;

#[derive(Debug, Clone, Default)]
pub struct GameStats {
    /// Keyed by (power, model id).
    pub by_agent: HashMap<(Power, String), ModelCallStats>,
}

impl GameStats {
    /// Flatten into serializable rows, sorted by power then model id.
    pub fn rows(&self) -> Vec<(Power, String, ModelCallStats)> {
        let mut rows: Vec<_> = self
            .by_agent
            .iter()
            .map(|((power, model), stats)| (*power, model.clone(), stats.clone()))
            .collect();
        rows.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));
        rows
    }
}

fn registry() -> &'static Mutex<HashMap<String, GameStats>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, GameStats>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

fn with_stats<F: FnOnce(&mut ModelCallStats)>(game_id: &str, power: Power, model: &str, f: F) {
    let mut games = match registry().lock() {
        Ok(guard) => guard,
        // A poisoned lock only loses metrics, never the game.
        Err(poisoned) => poisoned.into_inner(),
    };
    let stats = games
        .entry(game_id.to_string())
        .or_default()
        .by_agent
        .entry((power, model.to_string()))
        .or_default();
    f(stats);
}

pub fn record_request(game_id: &str, power: Power, model: &str, input_tokens: u64, output_tokens: u64) {
    with_stats(game_id, power, model, |s| {
        s.requests += 1;
        s.input_tokens += input_tokens;
        s.output_tokens += output_tokens;
    });
}

pub fn record_parse_failure(game_id: &str, power: Power, model: &str) {
    debug!(game_id, %power, model, "parse failure recorded");
    with_stats(game_id, power, model, |s| s.parse_failures += 1);
}

pub fn record_invalid_order(game_id: &str, power: Power, model: &str, reason: &str) {
    debug!(game_id, %power, model, reason, "invalid order recorded");
    with_stats(game_id, power, model, |s| {
        s.invalid_orders += 1;
        if s.drop_reasons.len() < MAX_DROP_REASONS {
            s.drop_reasons.push(reason.to_string());
        }
    });
}

/// Snapshot of a game's stats, if any were recorded.
pub fn game_stats(game_id: &str) -> Option<GameStats> {
    let games = match registry().lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    games.get(game_id).cloned()
}

/// Drop a finished game's stats.
pub fn clear_game(game_id: &str) {
    let mut games = match registry().lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    games.remove(game_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_accumulate_per_power_and_model() {
        let game = "metrics-test-1";
        record_request(game, Power::France, "m1", 100, 20);
        record_request(game, Power::France, "m1", 50, 10);
        record_invalid_order(game, Power::France, "m1", "A PAR -> MOS not adjacent");
        record_parse_failure(game, Power::England, "m2");

        let stats = game_stats(game).unwrap();
        let france = &stats.by_agent[&(Power::France, "m1".to_string())];
        assert_eq!(france.requests, 2);
        assert_eq!(france.input_tokens, 150);
        assert_eq!(france.invalid_orders, 1);
        assert_eq!(france.drop_reasons.len(), 1);

        let england = &stats.by_agent[&(Power::England, "m2".to_string())];
        assert_eq!(england.parse_failures, 1);

        clear_game(game);
        assert!(game_stats(game).is_none());
    }

    #[test]
    fn drop_reasons_are_bounded() {
        let game = "metrics-test-2";
        for i in 0..(MAX_DROP_REASONS + 10) {
            record_invalid_order(game, Power::Italy, "m", &format!("reason {i}"));
        }
        let stats = game_stats(game).unwrap();
        let italy = &stats.by_agent[&(Power::Italy, "m".to_string())];
        assert_eq!(italy.invalid_orders as usize, MAX_DROP_REASONS + 10);
        assert_eq!(italy.drop_reasons.len(), MAX_DROP_REASONS);
        clear_game(game);
    }
}
