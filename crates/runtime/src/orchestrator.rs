//! The phase scheduler.
//!
//! Drives the fixed yearly cycle — SPRING DIPLOMACY → SPRING MOVEMENT →
//! (RETREAT) → FALL DIPLOMACY → FALL MOVEMENT → (RETREAT) → (WINTER BUILD)
//! — coordinating seven agent turns per phase and threading every
//! resolution through promise reconciliation back into memory.
//!
//! Agent misbehavior silently downgrades (missing orders become HOLDs,
//! invalid orders are dropped and counted); engine errors are fatal.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use futures::future::join_all;
use tracing::{debug, info, warn};

use backchannel_config::AppConfig;
use backchannel_game::{
    GameEngine, GameState, Order, PhaseId, PhaseKind, Power, Season,
};
use backchannel_llm::LlmProvider;
use backchannel_memory::diary::{add_negotiation_entry, add_orders_entry};
use backchannel_memory::{
    BoardOwnership, TurnSummary, YearBoardDelta, apply_reconciliation, consolidate_diary,
    consolidate_turns, extract_promises, merge_strategic_notes, reconcile_promises,
    record_turn_summary, should_consolidate_diary, should_consolidate_turns,
};
use backchannel_models::{
    ModelDefinition, ModelError, ModelRegistry, ModelTier, record_invalid_order,
};
use backchannel_press::PressApi;
use backchannel_session::SessionManager;

use crate::events::{EventBus, RuntimeEvent};
use crate::prompt::{TurnPromptInputs, build_turn_prompt};
use crate::turn::{TurnOutcome, run_agent_turn};
use crate::view::build_game_view;

/// Build and validate the model registry from configuration. An unknown
/// model id or power name in an assignment is fatal at configuration time.
pub fn registry_from_config(config: &AppConfig) -> Result<ModelRegistry> {
    let mut registry = ModelRegistry::new();
    for entry in &config.models {
        let tier = match entry.tier.to_ascii_lowercase().as_str() {
            "premium" => ModelTier::Premium,
            "mini" => ModelTier::Mini,
            _ => ModelTier::Standard,
        };
        registry.register_model(ModelDefinition {
            id: entry.id.clone(),
            provider: entry.provider.clone(),
            cost_per_input_token: entry.cost_per_input_token,
            cost_per_output_token: entry.cost_per_output_token,
            max_context_tokens: entry.max_context_tokens,
            daily_token_limit: entry.daily_token_limit,
            tier,
        });
    }
    for (name, assignment) in &config.assignments {
        let power: Power = name
            .parse()
            .map_err(|_| anyhow::anyhow!("assignment for unknown power {name:?}"))?;
        registry
            .assign_model_to_power(power, assignment.primary.clone(), assignment.fallback.clone())
            .map_err(|err: ModelError| anyhow::anyhow!(err))?;
    }
    Ok(registry)
}

pub struct Orchestrator {
    config: AppConfig,
    engine: Box<dyn GameEngine>,
    press: Arc<dyn PressApi>,
    sessions: Arc<SessionManager>,
    llm: Arc<dyn LlmProvider>,
    events: EventBus,
    running: AtomicBool,
    /// Supply centers per power at the start of the current year, for the
    /// year-end diary board delta.
    year_start_centers: BTreeMap<Power, Vec<String>>,
}

impl Orchestrator {
    pub fn new(
        config: AppConfig,
        engine: Box<dyn GameEngine>,
        press: Arc<dyn PressApi>,
        sessions: Arc<SessionManager>,
        llm: Arc<dyn LlmProvider>,
    ) -> Self {
        Self {
            config,
            engine,
            press,
            sessions,
            llm,
            events: EventBus::new(),
            running: AtomicBool::new(false),
            year_start_centers: BTreeMap::new(),
        }
    }

    pub fn subscribe(&mut self, callback: impl Fn(&RuntimeEvent) + Send + Sync + 'static) {
        self.events.subscribe(callback);
    }

    /// Request a stop; honored between phases, never mid-flight.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> &GameState {
        self.engine.state()
    }

    fn game_over(&self) -> bool {
        let state = self.engine.state();
        state.is_over()
            || Power::ALL
                .iter()
                .any(|p| state.supply_center_count(*p) >= self.config.game.victory_centers)
    }

    fn winner(&self) -> Option<Power> {
        let state = self.engine.state();
        state.winner.or_else(|| {
            Power::ALL
                .into_iter()
                .find(|p| state.supply_center_count(*p) >= self.config.game.victory_centers)
        })
    }

    /// Run the game loop until a winner, a declared draw, or `stop()`.
    pub async fn run(&mut self) -> Result<()> {
        // Refuse to start with an unassigned power: a silent missing model
        // would downgrade every call, which is a config bug, not a game event.
        for power in Power::ALL {
            if self.sessions.current_model(power).is_none() {
                bail!("no model assigned for {power}; refusing to start");
            }
        }

        self.running.store(true, Ordering::SeqCst);
        self.snapshot_year_start();
        self.events.emit(&RuntimeEvent::GameStarted {
            game_id: self.sessions.game_id().to_string(),
        });
        info!(game = %self.sessions.game_id(), "game loop started");

        'game: while self.is_running() && !self.game_over() {
            let year = self.engine.state().year;

            for season in [Season::Spring, Season::Fall] {
                if !self.is_running() || self.game_over() {
                    break 'game;
                }
                self.diplomacy_phase(year, season).await?;

                if !self.is_running() {
                    break 'game;
                }
                self.movement_phase(year, season).await?;

                if !self.engine.state().pending_retreats.is_empty() {
                    self.retreat_phase(year, season).await?;
                }
                self.sessions.memory_manager().persist_all().await?;
            }

            if self.is_running() && !self.game_over() {
                self.build_phase(year).await?;
                self.sessions.memory_manager().persist_all().await?;
                self.snapshot_year_start();
            }
        }

        self.sessions.memory_manager().persist_all().await?;
        let winner = self.winner();
        let draw = self.engine.state().draw;
        self.events.emit(&RuntimeEvent::GameEnded { winner, draw });
        info!(?winner, draw, "game loop ended");
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn snapshot_year_start(&mut self) {
        let state = self.engine.state();
        self.year_start_centers = Power::ALL
            .into_iter()
            .map(|p| (p, state.supply_centers_of(p)))
            .collect();
    }

    // ── Diplomacy ───────────────────────────────────────────────────────────

    /// Time-boxed, multi-round negotiation: round 1 for everyone, then a
    /// polling loop serving only powers with unread press until the window
    /// closes. Window expiry starts no new rounds but cancels nothing.
    async fn diplomacy_phase(&mut self, year: u16, season: Season) -> Result<()> {
        let phase = PhaseId::new(year, season, PhaseKind::Diplomacy);
        self.events.emit(&RuntimeEvent::PhaseStarted {
            year,
            season,
            phase: PhaseKind::Diplomacy,
        });
        info!(%phase, "diplomacy window open");

        self.run_turns(Power::ALL.to_vec(), phase).await;

        let window = Duration::from_secs(self.config.game.press_window_minutes * 60);
        let poll = Duration::from_secs(self.config.game.poll_interval_secs.max(1));
        let deadline = tokio::time::Instant::now() + window;

        loop {
            let now = tokio::time::Instant::now();
            if now >= deadline || !self.is_running() {
                break;
            }
            tokio::time::sleep(poll.min(deadline - now)).await;

            let mut with_unread = Vec::new();
            for power in Power::ALL {
                let inbox = self.press.inbox(power).await;
                if inbox.channels.iter().any(|c| c.unread_count > 0) {
                    with_unread.push(power);
                }
            }
            if with_unread.is_empty() {
                debug!(%phase, "press idle");
                continue;
            }
            debug!(%phase, responders = with_unread.len(), "serving press responses");
            self.run_turns(with_unread, phase).await;
        }

        self.events.emit(&RuntimeEvent::PhaseResolved {
            year,
            season,
            phase: PhaseKind::Diplomacy,
        });
        Ok(())
    }

    // ── Movement ────────────────────────────────────────────────────────────

    async fn movement_phase(&mut self, year: u16, season: Season) -> Result<()> {
        let phase = PhaseId::new(year, season, PhaseKind::Movement);
        self.events.emit(&RuntimeEvent::PhaseStarted {
            year,
            season,
            phase: PhaseKind::Movement,
        });

        let before = self.engine.clone_state();
        let outcomes = self.run_turns(Power::ALL.to_vec(), phase).await;
        let proposed: HashMap<Power, Vec<Order>> = outcomes
            .iter()
            .map(|o| (o.power, o.response.orders.clone()))
            .collect();

        // Validate and submit for every power — one whose turn produced
        // nothing still gets HOLDs for each of its units.
        let mut orders_by_power: HashMap<Power, Vec<Order>> = HashMap::new();
        for power in Power::ALL {
            let model = self.sessions.current_model(power).unwrap_or_default();

            let mut accepted: Vec<Order> = Vec::new();
            let mut dropped = 0usize;
            for order in proposed.get(&power).map(Vec::as_slice).unwrap_or(&[]) {
                match self.engine.validate_order(power, order) {
                    Ok(()) => accepted.push(order.clone()),
                    Err(err) => {
                        dropped += 1;
                        warn!(%power, %model, %order, %err, "order dropped");
                        record_invalid_order(
                            self.sessions.game_id(),
                            power,
                            &model,
                            &err.to_string(),
                        );
                    }
                }
            }

            let ordered: HashSet<String> =
                accepted.iter().map(|o| o.unit_location().to_string()).collect();
            let holds: Vec<Order> = self
                .engine
                .state()
                .units_of(power)
                .filter(|u| !ordered.contains(&u.location))
                .map(|u| Order::Hold { unit: u.unit_type, at: u.location.clone() })
                .collect();
            accepted.extend(holds);

            self.events.emit(&RuntimeEvent::OrdersSubmitted {
                power,
                accepted: accepted.len(),
                dropped,
            });
            self.engine
                .submit_orders(power, accepted.clone())
                .with_context(|| format!("submit movement orders for {power}"))?;
            orders_by_power.insert(power, accepted);
        }

        self.engine.resolve_movement().context("resolve movement")?;
        self.events.emit(&RuntimeEvent::PhaseResolved {
            year,
            season,
            phase: PhaseKind::Movement,
        });

        let after = self.engine.clone_state();
        let highlights = self
            .reconcile_press(year, season, &before, &orders_by_power)
            .await?;
        self.record_turn_summaries(year, season, &before, &after, highlights)
            .await?;
        Ok(())
    }

    /// Compare last diplomacy's promises to the orders just submitted;
    /// apply every resulting update to the promisee's memory. Returns the
    /// per-power diplomatic highlights for the turn summaries.
    async fn reconcile_press(
        &self,
        year: u16,
        season: Season,
        before: &GameState,
        orders_by_power: &HashMap<Power, Vec<Order>>,
    ) -> Result<HashMap<Power, Vec<String>>> {
        let diplomacy = PhaseId::new(year, season, PhaseKind::Diplomacy);
        let messages = self.press.messages_for_phase(diplomacy).await;
        let promises = extract_promises(&messages);
        if promises.is_empty() {
            return Ok(HashMap::new());
        }

        let ownership = BoardOwnership {
            unit_owners: before
                .units
                .iter()
                .map(|u| (u.location.clone(), u.power))
                .collect(),
            province_owners: before.supply_centers.clone(),
        };
        let reconciliations = reconcile_promises(&promises, orders_by_power, &ownership);
        info!(
            promises = promises.len(),
            reconciliations = reconciliations.len(),
            "press reconciled against orders"
        );

        let mut highlights: HashMap<Power, Vec<String>> = HashMap::new();
        for recon in &reconciliations {
            let promisee = recon.promise.promisee;
            let shared = self.sessions.memory_of(promisee).await?;
            let applied = apply_reconciliation(&mut *shared.write().await, recon);
            if applied && !recon.kept {
                highlights
                    .entry(promisee)
                    .or_default()
                    .push(format!("{} broke a promise: {}", recon.promise.promiser, recon.evidence));
            }
        }
        Ok(highlights)
    }

    async fn record_turn_summaries(
        &self,
        year: u16,
        season: Season,
        before: &GameState,
        after: &GameState,
        mut highlights: HashMap<Power, Vec<String>>,
    ) -> Result<()> {
        for power in Power::ALL {
            let outcomes = self.engine.last_outcomes(power);
            let succeeded = outcomes.iter().filter(|o| o.succeeded).count() as u32;

            let before_centers: HashSet<String> =
                before.supply_centers_of(power).into_iter().collect();
            let after_centers: HashSet<String> =
                after.supply_centers_of(power).into_iter().collect();
            let gained: Vec<String> =
                after_centers.difference(&before_centers).cloned().collect();
            let lost: Vec<String> = before_centers.difference(&after_centers).cloned().collect();

            let before_units = before.units_of(power).count();
            let after_units = after.units_of(power).count();

            let summary = TurnSummary {
                year,
                season,
                orders_submitted: outcomes.len() as u32,
                orders_succeeded: succeeded,
                orders_failed: outcomes.len() as u32 - succeeded,
                centers_gained: gained,
                centers_lost: lost,
                units_built: after_units.saturating_sub(before_units) as u32,
                units_lost: before_units.saturating_sub(after_units) as u32,
                diplomatic_highlights: highlights.remove(&power).unwrap_or_default(),
            };

            let shared = self.sessions.memory_of(power).await?;
            let mut memory = shared.write().await;
            record_turn_summary(&mut memory, summary);
            if should_consolidate_turns(&memory) {
                consolidate_turns(&mut memory, Some(&*self.llm)).await;
            }
            merge_strategic_notes(&mut memory);
        }
        Ok(())
    }

    // ── Retreats ────────────────────────────────────────────────────────────

    async fn retreat_phase(&mut self, year: u16, season: Season) -> Result<()> {
        let phase = PhaseId::new(year, season, PhaseKind::Retreat);
        self.events.emit(&RuntimeEvent::PhaseStarted {
            year,
            season,
            phase: PhaseKind::Retreat,
        });

        let eligible: Vec<Power> = Power::ALL
            .into_iter()
            .filter(|p| !self.engine.state().retreats_of(*p).is_empty())
            .collect();
        let outcomes = self.run_turns(eligible, phase).await;

        for outcome in &outcomes {
            self.engine
                .submit_retreats(outcome.power, outcome.response.retreats.clone())
                .with_context(|| format!("submit retreats for {}", outcome.power))?;
        }
        self.engine.resolve_retreats().context("resolve retreats")?;
        self.events.emit(&RuntimeEvent::PhaseResolved {
            year,
            season,
            phase: PhaseKind::Retreat,
        });
        Ok(())
    }

    // ── Builds and year end ─────────────────────────────────────────────────

    async fn build_phase(&mut self, year: u16) -> Result<()> {
        let phase = PhaseId::new(year, Season::Winter, PhaseKind::Build);
        let eligible: Vec<Power> = Power::ALL
            .into_iter()
            .filter(|p| self.engine.state().build_delta(*p) != 0)
            .collect();

        if !eligible.is_empty() {
            self.events.emit(&RuntimeEvent::PhaseStarted {
                year,
                season: Season::Winter,
                phase: PhaseKind::Build,
            });
            let outcomes = self.run_turns(eligible.clone(), phase).await;
            for outcome in &outcomes {
                self.engine
                    .submit_builds(outcome.power, outcome.response.builds.clone())
                    .with_context(|| format!("submit builds for {}", outcome.power))?;
            }
        }

        self.engine.resolve_builds().context("resolve builds")?;
        if !eligible.is_empty() {
            self.events.emit(&RuntimeEvent::PhaseResolved {
                year,
                season: Season::Winter,
                phase: PhaseKind::Build,
            });
        }

        // Year end: consolidate every diary that has a year's worth of
        // entries, with the board delta vs the year's start.
        let state = self.engine.clone_state();
        for power in Power::ALL {
            let shared = self.sessions.memory_of(power).await?;
            let mut memory = shared.write().await;
            if !should_consolidate_diary(year, Season::Winter, PhaseKind::Build, &memory) {
                continue;
            }
            let start: HashSet<String> = self
                .year_start_centers
                .get(&power)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .collect();
            let now: HashSet<String> = state.supply_centers_of(power).into_iter().collect();
            let delta = YearBoardDelta {
                gained: now.difference(&start).cloned().collect(),
                lost: start.difference(&now).cloned().collect(),
            };
            consolidate_diary(&mut memory, year, Some(&delta), &*self.llm).await;
        }
        Ok(())
    }

    // ── Turn fan-out ────────────────────────────────────────────────────────

    /// Run one turn per power, sequentially or as a joined fan-out per
    /// config. A failed turn is logged and skipped; the phase goes on.
    async fn run_turns(&self, powers: Vec<Power>, phase: PhaseId) -> Vec<TurnOutcome> {
        if self.config.game.parallel_agents {
            let futures: Vec<_> = powers
                .into_iter()
                .map(|power| self.single_turn(power, phase))
                .collect();
            join_all(futures)
                .await
                .into_iter()
                .filter_map(|result| match result {
                    Ok(outcome) => Some(outcome),
                    Err(err) => {
                        warn!(%err, "agent turn errored; continuing");
                        None
                    }
                })
                .collect()
        } else {
            let mut outcomes = Vec::new();
            for power in powers {
                match self.single_turn(power, phase).await {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(err) => warn!(%power, %err, "agent turn errored; continuing"),
                }
            }
            outcomes
        }
    }

    async fn single_turn(&self, power: Power, phase: PhaseId) -> Result<TurnOutcome> {
        self.events.emit(&RuntimeEvent::AgentTurnStarted {
            power,
            year: phase.year,
            season: phase.season,
            phase: phase.kind,
        });

        let incoming = self.press.drain_unread(power).await;
        let game_view = build_game_view(power, &*self.engine);
        let shared = self.sessions.memory_of(power).await?;
        let prompt = {
            let memory = shared.read().await;
            build_turn_prompt(&TurnPromptInputs {
                power,
                phase,
                game_view: &game_view,
                memory: &memory,
                incoming: &incoming,
            })
        };

        let timeout = Duration::from_secs(self.config.game.turn_timeout_secs);
        let outcome = run_agent_turn(&self.sessions, power, phase, prompt, timeout).await?;

        for send in &outcome.response.sends {
            if send.to == power {
                continue;
            }
            if let Err(err) = self.press.send_to(power, send.to, phase, &send.content).await {
                warn!(%power, to = %send.to, %err, "press send failed");
            }
        }

        self.write_turn_diary(&shared, &outcome, &incoming).await;

        self.events.emit(&RuntimeEvent::AgentTurnCompleted {
            power,
            year: phase.year,
            season: phase.season,
            phase: phase.kind,
        });
        Ok(outcome)
    }

    async fn write_turn_diary(
        &self,
        shared: &backchannel_memory::manager::SharedMemory,
        outcome: &TurnOutcome,
        incoming: &[backchannel_press::PressMessage],
    ) {
        let mut memory = shared.write().await;
        match outcome.phase.kind {
            PhaseKind::Diplomacy => {
                if outcome.response.sends.is_empty() && incoming.is_empty() {
                    return;
                }
                let sent: Vec<String> = outcome
                    .response
                    .sends
                    .iter()
                    .map(|s| format!("to {}: {}", s.to, s.content))
                    .collect();
                let received: Vec<String> = incoming
                    .iter()
                    .map(|m| format!("from {}: {}", m.from, m.content))
                    .collect();
                add_negotiation_entry(
                    &mut memory,
                    outcome.phase,
                    format!("Received [{}]. Sent [{}].", received.join("; "), sent.join("; ")),
                );
            }
            PhaseKind::Movement => {
                let orders: Vec<String> =
                    outcome.response.orders.iter().map(|o| o.to_string()).collect();
                let mut entry = format!("Orders: {}", orders.join("; "));
                if let Some(reasoning) = &outcome.response.reasoning {
                    entry.push_str(&format!(" Reasoning: {reasoning}"));
                }
                if outcome.timed_out {
                    entry.push_str(" (turn timed out; defaults applied)");
                }
                add_orders_entry(&mut memory, outcome.phase, entry);
            }
            PhaseKind::Retreat => {
                let retreats: Vec<String> =
                    outcome.response.retreats.iter().map(|r| r.to_string()).collect();
                add_orders_entry(&mut memory, outcome.phase, format!("Retreats: {}", retreats.join("; ")));
            }
            PhaseKind::Build => {
                let builds: Vec<String> =
                    outcome.response.builds.iter().map(|b| b.to_string()).collect();
                add_orders_entry(&mut memory, outcome.phase, format!("Builds: {}", builds.join("; ")));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use backchannel_config::{AssignmentEntry, ModelEntry};
    use backchannel_game::{
        BuildOrder, EngineError, OrderError, OrderOutcome, RetreatOrder, Unit, UnitType,
    };
    use backchannel_llm::{ChatRole, LlmError, LlmRequest, LlmResponse};
    use backchannel_memory::{InMemoryStore, MemoryEventKind, MemoryManager};
    use backchannel_press::InMemoryPress;

    // ── Scripted engine ─────────────────────────────────────────────────────

    /// Minimal rules engine: moves always succeed (except to MOS, which is
    /// "not adjacent" for the drop test), retreats never happen, and the
    /// game is declared a draw once 1901 completes.
    struct ScriptedEngine {
        state: GameState,
        submitted: HashMap<Power, Vec<Order>>,
    }

    impl ScriptedEngine {
        fn new() -> Self {
            let mut supply_centers = BTreeMap::new();
            supply_centers.insert("LON".to_string(), Power::England);
            supply_centers.insert("EDI".to_string(), Power::England);
            supply_centers.insert("PAR".to_string(), Power::France);
            supply_centers.insert("BRE".to_string(), Power::France);
            supply_centers.insert("MUN".to_string(), Power::Germany);
            Self {
                state: GameState {
                    year: 1901,
                    season: Season::Spring,
                    phase: PhaseKind::Diplomacy,
                    units: vec![
                        Unit {
                            power: Power::England,
                            unit_type: UnitType::Fleet,
                            location: "LON".into(),
                        },
                        Unit {
                            power: Power::France,
                            unit_type: UnitType::Army,
                            location: "PAR".into(),
                        },
                        Unit {
                            power: Power::Germany,
                            unit_type: UnitType::Army,
                            location: "MUN".into(),
                        },
                    ],
                    supply_centers,
                    pending_retreats: vec![],
                    pending_builds: BTreeMap::new(),
                    winner: None,
                    draw: false,
                },
                submitted: HashMap::new(),
            }
        }
    }

    impl GameEngine for ScriptedEngine {
        fn state(&self) -> &GameState {
            &self.state
        }
        fn adjacent(&self, _location: &str) -> Vec<String> {
            vec!["NTH".into(), "BUR".into(), "SIL".into()]
        }
        fn validate_order(&self, power: Power, order: &Order) -> Result<(), OrderError> {
            if self.state.units_of(power).all(|u| u.location != order.unit_location()) {
                return Err(OrderError::NoSuchUnit {
                    power,
                    location: order.unit_location().to_string(),
                });
            }
            if order.move_destination() == Some("MOS") {
                return Err(OrderError::NotAdjacent {
                    from: order.unit_location().to_string(),
                    to: "MOS".to_string(),
                });
            }
            Ok(())
        }
        fn submit_orders(&mut self, power: Power, orders: Vec<Order>) -> Result<(), EngineError> {
            self.submitted.insert(power, orders);
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
            let submitted = std::mem::take(&mut self.submitted);
            for (power, orders) in submitted {
                for order in orders {
                    if let Order::Move { from, to, .. } = order {
                        if let Some(unit) = self
                            .state
                            .units
                            .iter_mut()
                            .find(|u| u.power == power && u.location == from)
                        {
                            unit.location = to;
                        }
                    }
                }
            }
            self.state.season = match self.state.season {
                Season::Spring => Season::Fall,
                other => other,
            };
            Ok(())
        }
        fn resolve_retreats(&mut self) -> Result<(), EngineError> {
            self.state.pending_retreats.clear();
            Ok(())
        }
        fn resolve_builds(&mut self) -> Result<(), EngineError> {
            self.state.year += 1;
            self.state.season = Season::Spring;
            // One-year scripted game.
            self.state.draw = true;
            Ok(())
        }
        fn last_outcomes(&self, _power: Power) -> Vec<OrderOutcome> {
            vec![]
        }
    }

    // ── Scripted provider ───────────────────────────────────────────────────

    /// Answers by (power, phase) read from the conversation itself.
    struct GameScript;

    impl GameScript {
        fn new() -> Arc<Self> {
            Arc::new(Self)
        }

        fn power_of(request: &LlmRequest) -> Option<Power> {
            let system = request.messages.iter().find(|m| m.role == ChatRole::System)?;
            Power::ALL
                .into_iter()
                .find(|p| system.content.contains(&format!("You are {p} ")))
        }
    }

    #[async_trait]
    impl LlmProvider for GameScript {
        async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
            let last = request.messages.last().map(|m| m.content.as_str()).unwrap_or("");
            let power = Self::power_of(request);

            let content = if last.contains("P:DIPLOMACY") {
                match power {
                    // One promise, made in spring only, so exactly one
                    // reconciliation fires.
                    Some(Power::France) if last.contains("S:SPRING") => {
                        "DIPLOMACY:\nSEND ENGLAND: [OPENING] \"I will support your fleet this year\""
                            .to_string()
                    }
                    _ => "Nothing to send this round.".to_string(),
                }
            } else if last.contains("P:MOVEMENT") {
                match power {
                    // France promised support but attacks elsewhere instead.
                    Some(Power::France) => "ORDERS:\nA PAR -> BUR".to_string(),
                    Some(Power::England) => "ORDERS:\nF LON -> NTH".to_string(),
                    // Germany tries an illegal move that must be dropped.
                    Some(Power::Germany) => "ORDERS:\nA MUN -> MOS".to_string(),
                    _ => String::new(),
                }
            } else {
                // Diary consolidation request.
                "SUMMARY: A quiet scripted year.\nTERRITORIAL: None\nDIPLOMATIC: None".to_string()
            };
            Ok(LlmResponse { content, usage: None, stop_reason: None })
        }
    }

    // ── Harness ─────────────────────────────────────────────────────────────

    fn test_config(game_id: &str) -> AppConfig {
        let mut config = AppConfig::default();
        config.game.game_id = game_id.to_string();
        config.game.press_window_minutes = 0;
        config.game.poll_interval_secs = 1;
        config.game.turn_timeout_secs = 10;
        config.models.push(ModelEntry { id: "scripted".into(), ..Default::default() });
        for power in Power::ALL {
            config.assignments.insert(
                power.name().to_string(),
                AssignmentEntry { primary: "scripted".into(), fallback: None },
            );
        }
        config
    }

    async fn orchestrator_for(game_id: &str, parallel: bool) -> Orchestrator {
        let mut config = test_config(game_id);
        config.game.parallel_agents = parallel;

        let registry = registry_from_config(&config).unwrap();
        let provider = GameScript::new();
        let memory = Arc::new(MemoryManager::new(Arc::new(InMemoryStore::new())));
        let sessions = Arc::new(SessionManager::new(
            game_id,
            config.game.max_conversation_history,
            memory,
            Arc::new(Mutex::new(registry)),
            provider.clone(),
        ));
        sessions.create_all_sessions(&config.personas_by_power()).await.unwrap();

        Orchestrator::new(
            config,
            Box::new(ScriptedEngine::new()),
            Arc::new(InMemoryPress::new()),
            sessions,
            provider,
        )
    }

    #[tokio::test]
    async fn full_year_reconciles_broken_promise_into_promisee_memory() {
        let mut orchestrator = orchestrator_for("it-full-year", false).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        orchestrator.subscribe(move |event| {
            log.lock().unwrap().push(format!("{event:?}"));
        });

        orchestrator.run().await.unwrap();

        // France's SUPPORT promise was never honored: ENGLAND's memory
        // carries the PROMISE_BROKEN event at -0.15.
        let sessions = orchestrator.sessions.clone();
        let shared = sessions.memory_of(Power::England).await.unwrap();
        let memory = shared.read().await;
        assert!(
            memory
                .events
                .iter()
                .any(|e| e.kind == MemoryEventKind::PromiseBroken
                    && e.powers == vec![Power::France])
        );
        assert!((memory.trust_toward(Power::France) - (-0.15)).abs() < 1e-9);

        // Two movement phases produced two turn summaries, and the broken
        // promise surfaced as a diplomatic highlight.
        assert_eq!(memory.turn_summaries.len(), 2);
        assert!(
            memory.turn_summaries[0]
                .diplomatic_highlights
                .iter()
                .any(|h| h.contains("broke"))
        );

        // Year-end diary consolidation ran.
        assert_eq!(memory.year_summaries.len(), 1);
        assert_eq!(memory.year_summaries[0].summary, "A quiet scripted year.");
        assert!(memory.current_year_diary.is_empty());
        drop(memory);

        // Germany's illegal move was dropped and counted against its model.
        let stats = backchannel_models::game_stats("it-full-year").unwrap();
        let germany = &stats.by_agent[&(Power::Germany, "scripted".to_string())];
        assert_eq!(germany.invalid_orders, 1);
        assert!(germany.drop_reasons[0].contains("MOS"));
        backchannel_models::metrics::clear_game("it-full-year");

        // Event stream hit the major milestones in order.
        let events = seen.lock().unwrap();
        assert!(events.first().unwrap().contains("GameStarted"));
        assert!(events.last().unwrap().contains("GameEnded"));
        assert!(events.iter().any(|e| e.contains("OrdersSubmitted")));
        assert!(events.iter().any(|e| e.contains("PhaseResolved")));
    }

    #[tokio::test]
    async fn parallel_fanout_produces_the_same_reconciliation() {
        let mut orchestrator = orchestrator_for("it-parallel", true).await;
        orchestrator.run().await.unwrap();

        let shared = orchestrator.sessions.memory_of(Power::England).await.unwrap();
        let memory = shared.read().await;
        assert!((memory.trust_toward(Power::France) - (-0.15)).abs() < 1e-9);
        backchannel_models::metrics::clear_game("it-parallel");
    }

    #[tokio::test]
    async fn france_diary_records_its_negotiation() {
        let mut orchestrator = orchestrator_for("it-diary", false).await;
        orchestrator.run().await.unwrap();

        let shared = orchestrator.sessions.memory_of(Power::France).await.unwrap();
        let memory = shared.read().await;
        // The negotiation landed in the permanent diary before year-end
        // consolidation cleared the working layer.
        assert!(
            memory
                .full_private_diary
                .iter()
                .any(|e| e.content.contains("to ENGLAND"))
        );
        backchannel_models::metrics::clear_game("it-diary");
    }

    #[tokio::test]
    async fn refuses_to_start_without_model_assignments() {
        let mut config = test_config("it-unassigned");
        config.assignments.remove(Power::Turkey.name());

        let registry = registry_from_config(&config).unwrap();
        let provider = GameScript::new();
        let memory = Arc::new(MemoryManager::new(Arc::new(InMemoryStore::new())));
        let sessions = Arc::new(SessionManager::new(
            "it-unassigned",
            20,
            memory,
            Arc::new(Mutex::new(registry)),
            provider.clone(),
        ));
        sessions.create_all_sessions(&config.personas_by_power()).await.unwrap();

        let mut orchestrator = Orchestrator::new(
            config,
            Box::new(ScriptedEngine::new()),
            Arc::new(InMemoryPress::new()),
            sessions,
            provider,
        );
        let err = orchestrator.run().await.unwrap_err();
        assert!(err.to_string().contains("TURKEY"));
    }

    #[test]
    fn registry_from_config_rejects_unknown_assignment() {
        let mut config = test_config("it-reg");
        config.assignments.insert(
            Power::France.name().to_string(),
            AssignmentEntry { primary: "missing".into(), fallback: None },
        );
        let err = registry_from_config(&config).unwrap_err();
        assert!(err.to_string().contains("unknown model"));
    }
}
