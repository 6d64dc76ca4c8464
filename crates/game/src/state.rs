use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::order::UnitType;
use crate::phase::{PhaseKind, Season};
use crate::power::Power;

/// A unit on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub power: Power,
    pub unit_type: UnitType,
    /// Province code, possibly coasted (`STP/SC`).
    pub location: String,
}

/// A unit dislodged in the last movement phase, awaiting a retreat order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRetreat {
    pub power: Power,
    pub unit_type: UnitType,
    pub from: String,
    /// Provinces the unit may legally retreat to. Empty means forced disband.
    pub options: Vec<String>,
}

/// Snapshot of the board as exposed by the engine facade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub year: u16,
    pub season: Season,
    pub phase: PhaseKind,
    pub units: Vec<Unit>,
    /// Supply-center ownership, base province code → owner.
    pub supply_centers: BTreeMap<String, Power>,
    pub pending_retreats: Vec<PendingRetreat>,
    /// Positive = builds owed, negative = disbands owed.
    pub pending_builds: BTreeMap<Power, i32>,
    pub winner: Option<Power>,
    pub draw: bool,
}

impl GameState {
    pub fn units_of(&self, power: Power) -> impl Iterator<Item = &Unit> {
        self.units.iter().filter(move |u| u.power == power)
    }

    pub fn supply_center_count(&self, power: Power) -> usize {
        self.supply_centers.values().filter(|&&p| p == power).count()
    }

    /// Base-province codes of the supply centers a power owns, sorted.
    pub fn supply_centers_of(&self, power: Power) -> Vec<String> {
        self.supply_centers
            .iter()
            .filter(|&(_, &owner)| owner == power)
            .map(|(sc, _)| sc.clone())
            .collect()
    }

    pub fn retreats_of(&self, power: Power) -> Vec<&PendingRetreat> {
        self.pending_retreats.iter().filter(|r| r.power == power).collect()
    }

    pub fn build_delta(&self, power: Power) -> i32 {
        self.pending_builds.get(&power).copied().unwrap_or(0)
    }

    pub fn is_over(&self) -> bool {
        self.winner.is_some() || self.draw
    }
}
