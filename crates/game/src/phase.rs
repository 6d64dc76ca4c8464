//! Phase identifiers: the (year, season, phase) triple and its bracketed
//! text form, e.g. SPRING 1901 MOVEMENT → `[S1901M]`.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Season {
    Spring,
    Fall,
    Winter,
}

impl Season {
    pub fn letter(&self) -> char {
        match self {
            Season::Spring => 'S',
            Season::Fall => 'F',
            Season::Winter => 'W',
        }
    }

    fn from_letter(c: char) -> Option<Season> {
        match c.to_ascii_uppercase() {
            'S' => Some(Season::Spring),
            'F' => Some(Season::Fall),
            'W' => Some(Season::Winter),
            _ => None,
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Season::Spring => "SPRING",
            Season::Fall => "FALL",
            Season::Winter => "WINTER",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PhaseKind {
    Diplomacy,
    Movement,
    Retreat,
    Build,
}

impl PhaseKind {
    pub fn letter(&self) -> char {
        match self {
            PhaseKind::Diplomacy => 'D',
            PhaseKind::Movement => 'M',
            PhaseKind::Retreat => 'R',
            PhaseKind::Build => 'B',
        }
    }

    fn from_letter(c: char) -> Option<PhaseKind> {
        match c.to_ascii_uppercase() {
            'D' => Some(PhaseKind::Diplomacy),
            'M' => Some(PhaseKind::Movement),
            'R' => Some(PhaseKind::Retreat),
            'B' => Some(PhaseKind::Build),
            _ => None,
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PhaseKind::Diplomacy => "DIPLOMACY",
            PhaseKind::Movement => "MOVEMENT",
            PhaseKind::Retreat => "RETREAT",
            PhaseKind::Build => "BUILD",
        };
        f.write_str(name)
    }
}

/// Fully-qualified phase: season letter + four-digit year + phase letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PhaseId {
    pub year: u16,
    pub season: Season,
    pub kind: PhaseKind,
}

impl PhaseId {
    pub fn new(year: u16, season: Season, kind: PhaseKind) -> Self {
        Self { year, season, kind }
    }

    /// Bracketed tag used in diary entries and prompts, e.g. `[S1901M]`.
    pub fn tag(&self) -> String {
        format!("[{}]", self.compact())
    }

    /// Unbracketed form, e.g. `S1901M`.
    pub fn compact(&self) -> String {
        format!("{}{:04}{}", self.season.letter(), self.year, self.kind.letter())
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.season, self.year, self.kind)
    }
}

/// A possibly-partial phase reference, as accepted by the recall tool:
/// `S1903M` (full), `S1903` (season + year), or `1903` (year only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseFilter {
    pub year: u16,
    pub season: Option<Season>,
    pub kind: Option<PhaseKind>,
}

impl PhaseFilter {
    pub fn matches(&self, phase: PhaseId) -> bool {
        phase.year == self.year
            && self.season.is_none_or(|s| s == phase.season)
            && self.kind.is_none_or(|k| k == phase.kind)
    }

    /// Parse a full or partial phase string, case-insensitively. Brackets
    /// around the tag are tolerated.
    pub fn parse(input: &str) -> Option<PhaseFilter> {
        let s = input.trim().trim_start_matches('[').trim_end_matches(']').trim();
        if s.is_empty() || !s.is_ascii() {
            return None;
        }

        // Year-only form.
        if s.chars().all(|c| c.is_ascii_digit()) {
            let year: u16 = s.parse().ok()?;
            return Some(PhaseFilter { year, season: None, kind: None });
        }

        let mut chars = s.chars();
        let season = Season::from_letter(chars.next()?)?;
        let rest: String = chars.collect();

        // Season + year form.
        if rest.chars().all(|c| c.is_ascii_digit()) {
            let year: u16 = rest.parse().ok()?;
            return Some(PhaseFilter { year, season: Some(season), kind: None });
        }

        // Full form: digits followed by a single phase letter.
        let (digits, tail) = rest.split_at(rest.len().checked_sub(1)?);
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let year: u16 = digits.parse().ok()?;
        let kind = PhaseKind::from_letter(tail.chars().next()?)?;
        Some(PhaseFilter { year, season: Some(season), kind: Some(kind) })
    }
}

/// Parse a full phase tag (e.g. `S1901M` or `[S1901M]`) into a `PhaseId`.
pub fn parse_phase_id(input: &str) -> Option<PhaseId> {
    let filter = PhaseFilter::parse(input)?;
    Some(PhaseId::new(filter.year, filter.season?, filter.kind?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_format() {
        let phase = PhaseId::new(1901, Season::Spring, PhaseKind::Movement);
        assert_eq!(phase.tag(), "[S1901M]");
        assert_eq!(PhaseId::new(1902, Season::Fall, PhaseKind::Diplomacy).tag(), "[F1902D]");
        assert_eq!(PhaseId::new(1905, Season::Winter, PhaseKind::Build).tag(), "[W1905B]");
    }

    #[test]
    fn full_roundtrip() {
        for season in [Season::Spring, Season::Fall, Season::Winter] {
            for kind in [PhaseKind::Diplomacy, PhaseKind::Movement, PhaseKind::Retreat, PhaseKind::Build] {
                let phase = PhaseId::new(1907, season, kind);
                assert_eq!(parse_phase_id(&phase.compact()), Some(phase));
                assert_eq!(parse_phase_id(&phase.tag()), Some(phase));
            }
        }
    }

    #[test]
    fn partial_forms() {
        let f = PhaseFilter::parse("S1903").unwrap();
        assert_eq!(f.year, 1903);
        assert_eq!(f.season, Some(Season::Spring));
        assert_eq!(f.kind, None);

        let y = PhaseFilter::parse("1903").unwrap();
        assert_eq!(y.year, 1903);
        assert_eq!(y.season, None);

        assert!(f.matches(PhaseId::new(1903, Season::Spring, PhaseKind::Retreat)));
        assert!(!f.matches(PhaseId::new(1903, Season::Fall, PhaseKind::Retreat)));
        assert!(y.matches(PhaseId::new(1903, Season::Fall, PhaseKind::Retreat)));
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(
            PhaseFilter::parse("s1903m").unwrap(),
            PhaseFilter::parse("S1903M").unwrap()
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(PhaseFilter::parse("").is_none());
        assert!(PhaseFilter::parse("X1901M").is_none());
        assert!(PhaseFilter::parse("S19A1M").is_none());
        assert!(PhaseFilter::parse("SPRING").is_none());
    }
}
