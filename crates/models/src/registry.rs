use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use backchannel_game::Power;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Premium,
    Standard,
    Mini,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub id: String,
    pub provider: String,
    /// USD per input token.
    pub cost_per_input_token: f64,
    /// USD per output token.
    pub cost_per_output_token: f64,
    pub max_context_tokens: u64,
    /// 0 means unlimited.
    pub daily_token_limit: u64,
    pub tier: ModelTier,
}

/// Daily token meter for one model. Resets when the UTC date rolls over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBudget {
    pub model_id: String,
    pub daily_limit: u64,
    pub tokens_used_today: u64,
    pub last_reset_date: NaiveDate,
}

impl TokenBudget {
    fn new(model_id: String, daily_limit: u64, today: NaiveDate) -> Self {
        Self { model_id, daily_limit, tokens_used_today: 0, last_reset_date: today }
    }

    fn roll_over_if_needed(&mut self, today: NaiveDate) {
        if today != self.last_reset_date {
            debug!(model = %self.model_id, %today, "token budget day rollover");
            self.tokens_used_today = 0;
            self.last_reset_date = today;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelAssignment {
    pub primary: String,
    pub fallback: Option<String>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    #[error("unknown model: {0}")]
    UnknownModel(String),
}

/// Registry of available models, per-power assignments, and daily budgets.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: HashMap<String, ModelDefinition>,
    budgets: HashMap<String, TokenBudget>,
    assignments: HashMap<Power, ModelAssignment>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent upsert. A budget is created iff the definition carries a
    /// nonzero daily limit; re-registering refreshes the limit but keeps
    /// today's usage counter.
    pub fn register_model(&mut self, def: ModelDefinition) {
        if def.daily_token_limit > 0 {
            let today = Utc::now().date_naive();
            self.budgets
                .entry(def.id.clone())
                .and_modify(|b| b.daily_limit = def.daily_token_limit)
                .or_insert_with(|| TokenBudget::new(def.id.clone(), def.daily_token_limit, today));
        } else {
            self.budgets.remove(&def.id);
        }
        info!(model = %def.id, tier = ?def.tier, limit = def.daily_token_limit, "model registered");
        self.models.insert(def.id.clone(), def);
    }

    pub fn model(&self, id: &str) -> Option<&ModelDefinition> {
        self.models.get(id)
    }

    pub fn assignment(&self, power: Power) -> Option<&ModelAssignment> {
        self.assignments.get(&power)
    }

    pub fn assign_model_to_power(
        &mut self,
        power: Power,
        primary: impl Into<String>,
        fallback: Option<String>,
    ) -> Result<(), ModelError> {
        let primary = primary.into();
        if !self.models.contains_key(&primary) {
            return Err(ModelError::UnknownModel(primary));
        }
        if let Some(fb) = &fallback {
            if !self.models.contains_key(fb) {
                return Err(ModelError::UnknownModel(fb.clone()));
            }
        }
        debug!(%power, %primary, ?fallback, "model assigned");
        self.assignments.insert(power, ModelAssignment { primary, fallback });
        Ok(())
    }

    /// The model a call for `power` should use right now: the primary while
    /// it has budget, else an in-budget fallback, else the primary again
    /// (the caller absorbs the overage). `None` when the power has no
    /// assignment.
    pub fn resolve_model_for_power(&mut self, power: Power) -> Option<String> {
        self.resolve_at(power, Utc::now().date_naive())
    }

    fn resolve_at(&mut self, power: Power, today: NaiveDate) -> Option<String> {
        let assignment = self.assignments.get(&power)?.clone();
        if self.within_budget_at(&assignment.primary, today) {
            return Some(assignment.primary);
        }
        if let Some(fallback) = assignment.fallback {
            if self.within_budget_at(&fallback, today) {
                warn!(%power, primary = %assignment.primary, %fallback, "primary over budget, using fallback");
                return Some(fallback);
            }
        }
        warn!(%power, primary = %assignment.primary, "all assigned models over budget, keeping primary");
        Some(assignment.primary)
    }

    pub fn record_usage(&mut self, model_id: &str, input_tokens: u64, output_tokens: u64) {
        self.record_usage_at(model_id, input_tokens, output_tokens, Utc::now().date_naive())
    }

    fn record_usage_at(&mut self, model_id: &str, input: u64, output: u64, today: NaiveDate) {
        if let Some(budget) = self.budgets.get_mut(model_id) {
            budget.roll_over_if_needed(today);
            budget.tokens_used_today += input + output;
        }
    }

    /// `true` when the model has no budget, the day has rolled over, or
    /// today's usage is still under the limit.
    pub fn is_within_budget(&mut self, model_id: &str) -> bool {
        self.within_budget_at(model_id, Utc::now().date_naive())
    }

    fn within_budget_at(&mut self, model_id: &str, today: NaiveDate) -> bool {
        match self.budgets.get_mut(model_id) {
            None => true,
            Some(budget) => {
                budget.roll_over_if_needed(today);
                budget.tokens_used_today < budget.daily_limit
            }
        }
    }

    /// Linear cost in USD; 0 for unknown models.
    pub fn calculate_cost(&self, model_id: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        match self.models.get(model_id) {
            Some(def) => {
                input_tokens as f64 * def.cost_per_input_token
                    + output_tokens as f64 * def.cost_per_output_token
            }
            None => 0.0,
        }
    }

    pub fn budget(&self, model_id: &str) -> Option<&TokenBudget> {
        self.budgets.get(model_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(id: &str, daily_limit: u64) -> ModelDefinition {
        ModelDefinition {
            id: id.to_string(),
            provider: "test".to_string(),
            cost_per_input_token: 3e-6,
            cost_per_output_token: 15e-6,
            max_context_tokens: 200_000,
            daily_token_limit: daily_limit,
            tier: ModelTier::Standard,
        }
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    #[test]
    fn register_is_idempotent_and_budget_gated() {
        let mut registry = ModelRegistry::new();
        registry.register_model(def("m-capped", 1000));
        registry.register_model(def("m-free", 0));

        assert!(registry.budget("m-capped").is_some());
        assert!(registry.budget("m-free").is_none());

        registry.record_usage("m-capped", 100, 50);
        registry.register_model(def("m-capped", 2000));
        // Usage survives re-registration; only the limit refreshes.
        let budget = registry.budget("m-capped").unwrap();
        assert_eq!(budget.tokens_used_today, 150);
        assert_eq!(budget.daily_limit, 2000);
    }

    #[test]
    fn assignment_rejects_unknown_models() {
        let mut registry = ModelRegistry::new();
        registry.register_model(def("known", 0));

        assert!(matches!(
            registry.assign_model_to_power(Power::France, "missing", None),
            Err(ModelError::UnknownModel(_))
        ));
        assert!(matches!(
            registry.assign_model_to_power(Power::France, "known", Some("missing".into())),
            Err(ModelError::UnknownModel(_))
        ));
        assert!(registry.assign_model_to_power(Power::France, "known", None).is_ok());
    }

    #[test]
    fn budget_routing_to_fallback() {
        let mut registry = ModelRegistry::new();
        registry.register_model(def("primary", 1000));
        registry.register_model(def("fallback", 0));
        registry
            .assign_model_to_power(Power::England, "primary", Some("fallback".into()))
            .unwrap();

        assert_eq!(registry.resolve_model_for_power(Power::England).as_deref(), Some("primary"));

        registry.record_usage("primary", 600, 400);
        assert!(!registry.is_within_budget("primary"));
        assert_eq!(registry.resolve_model_for_power(Power::England).as_deref(), Some("fallback"));
    }

    #[test]
    fn exhausted_without_fallback_keeps_primary() {
        let mut registry = ModelRegistry::new();
        registry.register_model(def("primary", 10));
        registry.assign_model_to_power(Power::Turkey, "primary", None).unwrap();
        registry.record_usage("primary", 10, 10);
        assert_eq!(registry.resolve_model_for_power(Power::Turkey).as_deref(), Some("primary"));
    }

    #[test]
    fn unassigned_power_resolves_none() {
        let mut registry = ModelRegistry::new();
        assert_eq!(registry.resolve_model_for_power(Power::Italy), None);
    }

    #[test]
    fn day_rollover_resets_usage() {
        let mut registry = ModelRegistry::new();
        registry.register_model(def("m", 100));
        let yesterday = today().pred_opt().unwrap();
        registry.record_usage_at("m", 80, 40, yesterday);
        assert!(!registry.within_budget_at("m", yesterday));
        // Next day: counter resets before the check.
        assert!(registry.within_budget_at("m", today()));
        assert_eq!(registry.budget("m").unwrap().tokens_used_today, 0);
    }

    #[test]
    fn cost_is_linear_and_zero_for_unknown() {
        let mut registry = ModelRegistry::new();
        registry.register_model(def("m", 0));
        let cost = registry.calculate_cost("m", 1000, 100);
        assert!((cost - (1000.0 * 3e-6 + 100.0 * 15e-6)).abs() < 1e-12);
        assert_eq!(registry.calculate_cost("nope", 1000, 100), 0.0);
    }
}
