//! Order grammar: the wire format agents emit in `ORDERS:` / `RETREATS:` /
//! `BUILDS:` blocks, and tolerant line parsers for each.
//!
//! Parsers uppercase their input and ignore spacing; they do not validate
//! adjacency or legality — that is the engine's job.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitType {
    Army,
    Fleet,
}

impl UnitType {
    pub fn letter(&self) -> char {
        match self {
            UnitType::Army => 'A',
            UnitType::Fleet => 'F',
        }
    }

    fn from_token(token: &str) -> Option<UnitType> {
        match token.to_ascii_uppercase().as_str() {
            "A" | "ARMY" => Some(UnitType::Army),
            "F" | "FLEET" => Some(UnitType::Fleet),
            _ => None,
        }
    }
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unparseable order line: {0:?}")]
pub struct OrderParseError(pub String);

/// A movement-phase order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Hold {
        unit: UnitType,
        at: String,
    },
    Move {
        unit: UnitType,
        from: String,
        to: String,
        via_convoy: bool,
    },
    SupportHold {
        unit: UnitType,
        at: String,
        target_unit: UnitType,
        target: String,
    },
    SupportMove {
        unit: UnitType,
        at: String,
        target_unit: UnitType,
        target_from: String,
        target_to: String,
    },
    Convoy {
        at: String,
        army_from: String,
        army_to: String,
    },
}

impl Order {
    /// The province the ordered unit occupies.
    pub fn unit_location(&self) -> &str {
        match self {
            Order::Hold { at, .. }
            | Order::SupportHold { at, .. }
            | Order::SupportMove { at, .. }
            | Order::Convoy { at, .. } => at,
            Order::Move { from, .. } => from,
        }
    }

    /// Destination of a move order, if this is one.
    pub fn move_destination(&self) -> Option<&str> {
        match self {
            Order::Move { to, .. } => Some(to),
            _ => None,
        }
    }

    /// Location of the unit this order supports, if it is a support.
    pub fn supported_location(&self) -> Option<&str> {
        match self {
            Order::SupportHold { target, .. } => Some(target),
            Order::SupportMove { target_from, .. } => Some(target_from),
            _ => None,
        }
    }

    pub fn hold(unit: UnitType, at: impl Into<String>) -> Order {
        Order::Hold { unit, at: norm(at.into()) }
    }
}

fn norm(s: String) -> String {
    s.trim().to_ascii_uppercase()
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Order::Hold { unit, at } => write!(f, "{unit} {at} HOLD"),
            Order::Move { unit, from, to, via_convoy } => {
                write!(f, "{unit} {from} -> {to}")?;
                if *via_convoy {
                    write!(f, " VIA CONVOY")?;
                }
                Ok(())
            }
            Order::SupportHold { unit, at, target_unit, target } => {
                write!(f, "{unit} {at} SUPPORT {target_unit} {target}")
            }
            Order::SupportMove { unit, at, target_unit, target_from, target_to } => {
                write!(f, "{unit} {at} SUPPORT {target_unit} {target_from} -> {target_to}")
            }
            Order::Convoy { at, army_from, army_to } => {
                write!(f, "F {at} CONVOY A {army_from} -> {army_to}")
            }
        }
    }
}

impl FromStr for Order {
    type Err = OrderParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<String> = line
            .split_whitespace()
            .map(|t| t.to_ascii_uppercase())
            .collect();
        let err = || OrderParseError(line.to_string());

        let unit = tokens
            .first()
            .and_then(|t| UnitType::from_token(t))
            .ok_or_else(err)?;
        let at = tokens.get(1).cloned().ok_or_else(err)?;

        match tokens.get(2).map(String::as_str) {
            Some("HOLD") | Some("H") => Ok(Order::Hold { unit, at }),
            Some("->") | Some("-") | Some("MOVE") | Some("TO") => {
                let to = tokens.get(3).cloned().ok_or_else(err)?;
                let via_convoy = tokens[4..].join(" ") == "VIA CONVOY";
                Ok(Order::Move { unit, from: at, to, via_convoy })
            }
            Some("SUPPORT") | Some("S") => {
                let target_unit = tokens
                    .get(3)
                    .and_then(|t| UnitType::from_token(t))
                    .ok_or_else(err)?;
                let target_from = tokens.get(4).cloned().ok_or_else(err)?;
                match tokens.get(5).map(String::as_str) {
                    None => Ok(Order::SupportHold { unit, at, target_unit, target: target_from }),
                    Some("->") | Some("-") => {
                        let target_to = tokens.get(6).cloned().ok_or_else(err)?;
                        Ok(Order::SupportMove { unit, at, target_unit, target_from, target_to })
                    }
                    Some(_) => Err(err()),
                }
            }
            Some("CONVOY") | Some("C") => {
                // F NTH CONVOY A LON -> NWY
                if tokens.get(3).map(String::as_str) != Some("A") {
                    return Err(err());
                }
                let army_from = tokens.get(4).cloned().ok_or_else(err)?;
                if tokens.get(5).map(String::as_str) != Some("->") {
                    return Err(err());
                }
                let army_to = tokens.get(6).cloned().ok_or_else(err)?;
                Ok(Order::Convoy { at, army_from, army_to })
            }
            _ => Err(err()),
        }
    }
}

/// A retreat-phase order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetreatOrder {
    Retreat { unit: UnitType, from: String, to: String },
    Disband { unit: UnitType, at: String },
}

impl fmt::Display for RetreatOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetreatOrder::Retreat { unit, from, to } => write!(f, "{unit} {from} -> {to}"),
            RetreatOrder::Disband { unit, at } => write!(f, "{unit} {at} DISBAND"),
        }
    }
}

impl FromStr for RetreatOrder {
    type Err = OrderParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<String> = line
            .split_whitespace()
            .map(|t| t.to_ascii_uppercase())
            .collect();
        let err = || OrderParseError(line.to_string());

        let unit = tokens
            .first()
            .and_then(|t| UnitType::from_token(t))
            .ok_or_else(err)?;
        let at = tokens.get(1).cloned().ok_or_else(err)?;
        match tokens.get(2).map(String::as_str) {
            Some("->") | Some("-") => {
                let to = tokens.get(3).cloned().ok_or_else(err)?;
                Ok(RetreatOrder::Retreat { unit, from: at, to })
            }
            Some("DISBAND") => Ok(RetreatOrder::Disband { unit, at }),
            _ => Err(err()),
        }
    }
}

/// A build-phase order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildOrder {
    Build { unit: UnitType, at: String },
    Disband { unit: UnitType, at: String },
}

impl fmt::Display for BuildOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildOrder::Build { unit, at } => write!(f, "BUILD {unit} {at}"),
            BuildOrder::Disband { unit, at } => write!(f, "DISBAND {unit} {at}"),
        }
    }
}

impl FromStr for BuildOrder {
    type Err = OrderParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<String> = line
            .split_whitespace()
            .map(|t| t.to_ascii_uppercase())
            .collect();
        let err = || OrderParseError(line.to_string());

        let verb = tokens.first().cloned().ok_or_else(err)?;
        let unit = tokens
            .get(1)
            .and_then(|t| UnitType::from_token(t))
            .ok_or_else(err)?;
        let at = tokens.get(2).cloned().ok_or_else(err)?;
        match verb.as_str() {
            "BUILD" => Ok(BuildOrder::Build { unit, at }),
            "DISBAND" => Ok(BuildOrder::Disband { unit, at }),
            _ => Err(err()),
        }
    }
}
