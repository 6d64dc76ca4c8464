//! Standard-map province tables.
//!
//! Adjacency and movement legality live behind the [`crate::GameEngine`]
//! facade; this module carries only the closed province vocabulary the core
//! needs for promise extraction, build bookkeeping, and coast normalization.

use crate::power::Power;

/// All 75 provinces of the standard map, three-letter codes, sorted.
pub const PROVINCES: [&str; 75] = [
    "ADR", "AEG", "ALB", "ANK", "APU", "ARM", "BAL", "BAR", "BEL", "BER",
    "BLA", "BOH", "BOT", "BRE", "BUD", "BUL", "BUR", "CLY", "CON", "DEN",
    "EAS", "EDI", "ENG", "FIN", "GAL", "GAS", "GRE", "HEL", "HOL", "ION",
    "IRI", "KIE", "LON", "LVN", "LVP", "LYO", "MAO", "MAR", "MOS", "MUN",
    "NAF", "NAO", "NAP", "NTH", "NWG", "NWY", "PAR", "PIC", "PIE", "POR",
    "PRU", "ROM", "RUH", "RUM", "SER", "SEV", "SIL", "SKA", "SMY", "SPA",
    "STP", "SWE", "SYR", "TRI", "TUN", "TUS", "TYR", "TYS", "UKR", "VEN",
    "VIE", "WAL", "WAR", "WES", "YOR",
];

/// The 34 supply centers.
pub const SUPPLY_CENTERS: [&str; 34] = [
    "ANK", "BEL", "BER", "BRE", "BUD", "BUL", "CON", "DEN", "EDI", "GRE",
    "HOL", "KIE", "LON", "LVP", "MAR", "MOS", "MUN", "NAP", "NWY", "PAR",
    "POR", "ROM", "RUM", "SER", "SEV", "SMY", "SPA", "STP", "SWE", "TRI",
    "TUN", "VEN", "VIE", "WAR",
];

/// Home supply centers per power. Russia has four; everyone else three.
pub const HOME_CENTERS: [(Power, &[&str]); 7] = [
    (Power::England, &["LON", "EDI", "LVP"]),
    (Power::France, &["PAR", "MAR", "BRE"]),
    (Power::Germany, &["BER", "MUN", "KIE"]),
    (Power::Italy, &["ROM", "VEN", "NAP"]),
    (Power::Austria, &["VIE", "BUD", "TRI"]),
    (Power::Russia, &["MOS", "SEV", "WAR", "STP"]),
    (Power::Turkey, &["CON", "ANK", "SMY"]),
];

impl Power {
    pub fn home_centers(&self) -> &'static [&'static str] {
        HOME_CENTERS
            .iter()
            .find(|(p, _)| p == self)
            .map(|(_, centers)| *centers)
            .unwrap_or(&[])
    }
}

/// Strip a coast suffix (`STP/NC` → `STP`). Coasted provinces are
/// STP, SPA, and BUL; anything else passes through unchanged.
pub fn base_province(code: &str) -> &str {
    code.split('/').next().unwrap_or(code)
}

pub fn is_province(code: &str) -> bool {
    let upper = base_province(code).to_ascii_uppercase();
    PROVINCES.binary_search(&upper.as_str()).is_ok()
}

pub fn is_supply_center(code: &str) -> bool {
    let upper = base_province(code).to_ascii_uppercase();
    SUPPLY_CENTERS.binary_search(&upper.as_str()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_sorted_for_binary_search() {
        let mut provinces = PROVINCES;
        provinces.sort_unstable();
        assert_eq!(provinces, PROVINCES);

        let mut centers = SUPPLY_CENTERS;
        centers.sort_unstable();
        assert_eq!(centers, SUPPLY_CENTERS);
    }

    #[test]
    fn every_supply_center_is_a_province() {
        for sc in SUPPLY_CENTERS {
            assert!(is_province(sc), "{sc} missing from province table");
        }
    }

    #[test]
    fn home_center_counts() {
        for (power, centers) in HOME_CENTERS {
            let expected = if power == Power::Russia { 4 } else { 3 };
            assert_eq!(centers.len(), expected, "{power}");
            for c in centers {
                assert!(is_supply_center(c));
            }
        }
    }

    #[test]
    fn coast_normalization() {
        assert_eq!(base_province("STP/NC"), "STP");
        assert_eq!(base_province("SPA/SC"), "SPA");
        assert_eq!(base_province("PAR"), "PAR");
        assert!(is_province("bul/ec"));
        assert!(!is_province("ZZZ"));
    }
}
