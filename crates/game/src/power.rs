use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the seven great powers. Fixed for the life of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Power {
    England,
    France,
    Germany,
    Italy,
    Austria,
    Russia,
    Turkey,
}

impl Power {
    pub const ALL: [Power; 7] = [
        Power::England,
        Power::France,
        Power::Germany,
        Power::Italy,
        Power::Austria,
        Power::Russia,
        Power::Turkey,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Power::England => "ENGLAND",
            Power::France => "FRANCE",
            Power::Germany => "GERMANY",
            Power::Italy => "ITALY",
            Power::Austria => "AUSTRIA",
            Power::Russia => "RUSSIA",
            Power::Turkey => "TURKEY",
        }
    }

    /// Every power other than `self`, in canonical order.
    pub fn others(&self) -> impl Iterator<Item = Power> + '_ {
        Power::ALL.into_iter().filter(move |p| p != self)
    }
}

impl fmt::Display for Power {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown power: {0}")]
pub struct UnknownPower(pub String);

impl FromStr for Power {
    type Err = UnknownPower;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ENGLAND" => Ok(Power::England),
            "FRANCE" => Ok(Power::France),
            "GERMANY" => Ok(Power::Germany),
            "ITALY" => Ok(Power::Italy),
            "AUSTRIA" => Ok(Power::Austria),
            "RUSSIA" => Ok(Power::Russia),
            "TURKEY" => Ok(Power::Turkey),
            other => Err(UnknownPower(other.to_string())),
        }
    }
}
