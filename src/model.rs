use crate::asset_class::AssetClass;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Long-run annual statistics for an asset class (decimal fractions)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssetStats {
    pub expected_return: f64,
    pub volatility: f64,
}

/// The five overlapping cycle models the adjustment layer understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleDimension {
    Business,   // Short-term debt / business cycle
    Economic,   // Long-term debt cycle
    Technology, // Technology adoption / techno-economic paradigm
    Country,    // Country hegemony cycle
    Market,     // Market-specific (Wyckoff) cycle
}

impl CycleDimension {
    pub const ALL: [CycleDimension; 5] = [
        CycleDimension::Business,
        CycleDimension::Economic,
        CycleDimension::Technology,
        CycleDimension::Country,
        CycleDimension::Market,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CycleDimension::Business => "business",
            CycleDimension::Economic => "economic",
            CycleDimension::Technology => "technology",
            CycleDimension::Country => "country",
            CycleDimension::Market => "market",
        }
    }
}

impl fmt::Display for CycleDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Return deviation and volatility multiplier attached to one phase of one cycle.
/// Asset classes absent from `deviations` are unaffected by the phase.
#[derive(Debug)]
pub struct PhaseProfile {
    pub name: &'static str,
    pub deviations: &'static [(AssetClass, f64)],
    pub volatility_multiplier: f64,
}

use AssetClass::{Alternatives, Bonds, Cash, Commodities, RealEstate, Stocks};

static BUSINESS_PHASES: [PhaseProfile; 4] = [
    PhaseProfile {
        name: "Early Recovery",
        deviations: &[
            (Stocks, 0.06),
            (RealEstate, 0.04),
            (Commodities, 0.02),
            (Bonds, -0.01),
            (Alternatives, 0.02),
        ],
        volatility_multiplier: 1.10,
    },
    PhaseProfile {
        name: "Expansion",
        deviations: &[
            (Stocks, 0.03),
            (RealEstate, 0.02),
            (Commodities, 0.02),
            (Bonds, -0.01),
        ],
        volatility_multiplier: 0.90,
    },
    PhaseProfile {
        name: "Late Cycle",
        deviations: &[
            (Stocks, -0.02),
            (RealEstate, -0.01),
            (Commodities, 0.04),
            (Bonds, -0.015),
            (Cash, 0.01),
        ],
        volatility_multiplier: 1.15,
    },
    PhaseProfile {
        name: "Recession",
        deviations: &[
            (Stocks, -0.12),
            (RealEstate, -0.08),
            (Commodities, -0.08),
            (Bonds, 0.03),
            (Cash, 0.005),
            (Alternatives, -0.03),
        ],
        volatility_multiplier: 1.60,
    },
];

static ECONOMIC_PHASES: [PhaseProfile; 6] = [
    PhaseProfile {
        name: "Early Leveraging",
        deviations: &[(Stocks, 0.03), (RealEstate, 0.03), (Bonds, 0.01)],
        volatility_multiplier: 0.90,
    },
    PhaseProfile {
        name: "Bubble",
        deviations: &[
            (Stocks, 0.05),
            (RealEstate, 0.05),
            (Bonds, -0.02),
            (Cash, -0.01),
        ],
        volatility_multiplier: 1.20,
    },
    PhaseProfile {
        name: "Top",
        deviations: &[
            (Stocks, -0.04),
            (RealEstate, -0.03),
            (Bonds, 0.01),
            (Commodities, 0.02),
        ],
        volatility_multiplier: 1.30,
    },
    PhaseProfile {
        name: "Depression",
        deviations: &[
            (Stocks, -0.15),
            (RealEstate, -0.12),
            (Commodities, -0.10),
            (Bonds, 0.04),
            (Alternatives, -0.05),
        ],
        volatility_multiplier: 1.80,
    },
    PhaseProfile {
        name: "Deleveraging",
        deviations: &[
            (Stocks, 0.01),
            (Bonds, -0.01),
            (Commodities, 0.04),
            (Cash, -0.015),
        ],
        volatility_multiplier: 1.25,
    },
    PhaseProfile {
        name: "Normalization",
        deviations: &[(Stocks, 0.02), (RealEstate, 0.01)],
        volatility_multiplier: 1.00,
    },
];

static TECHNOLOGY_PHASES: [PhaseProfile; 5] = [
    PhaseProfile {
        name: "Irruption",
        deviations: &[(Stocks, 0.02), (Alternatives, 0.02)],
        volatility_multiplier: 1.10,
    },
    PhaseProfile {
        name: "Frenzy",
        deviations: &[(Stocks, 0.06), (Alternatives, 0.03), (Bonds, -0.01)],
        volatility_multiplier: 1.35,
    },
    PhaseProfile {
        name: "Turning Point",
        deviations: &[(Stocks, -0.08), (Alternatives, -0.04), (Bonds, 0.02)],
        volatility_multiplier: 1.50,
    },
    PhaseProfile {
        name: "Synergy",
        deviations: &[(Stocks, 0.04), (RealEstate, 0.02)],
        volatility_multiplier: 0.90,
    },
    PhaseProfile {
        name: "Maturity",
        deviations: &[(Stocks, -0.01), (Commodities, 0.01)],
        volatility_multiplier: 1.00,
    },
];

static COUNTRY_PHASES: [PhaseProfile; 4] = [
    PhaseProfile {
        name: "Rise",
        deviations: &[(Stocks, 0.03), (RealEstate, 0.02)],
        volatility_multiplier: 0.95,
    },
    PhaseProfile {
        name: "Peak",
        deviations: &[(Stocks, 0.01), (Bonds, -0.005)],
        volatility_multiplier: 1.05,
    },
    PhaseProfile {
        name: "Decline",
        deviations: &[
            (Stocks, -0.03),
            (Bonds, -0.02),
            (Commodities, 0.04),
            (Cash, -0.01),
        ],
        volatility_multiplier: 1.20,
    },
    PhaseProfile {
        name: "Conflict",
        deviations: &[
            (Stocks, -0.07),
            (RealEstate, -0.04),
            (Commodities, 0.06),
            (Bonds, -0.02),
            (Alternatives, -0.02),
        ],
        volatility_multiplier: 1.50,
    },
];

static MARKET_PHASES: [PhaseProfile; 4] = [
    PhaseProfile {
        name: "Accumulation",
        deviations: &[(Stocks, 0.02), (RealEstate, 0.01)],
        volatility_multiplier: 0.95,
    },
    PhaseProfile {
        name: "Markup",
        deviations: &[(Stocks, 0.05), (RealEstate, 0.02), (Alternatives, 0.02)],
        volatility_multiplier: 0.85,
    },
    PhaseProfile {
        name: "Distribution",
        deviations: &[(Stocks, -0.02), (Bonds, 0.005)],
        volatility_multiplier: 1.10,
    },
    PhaseProfile {
        name: "Markdown",
        deviations: &[
            (Stocks, -0.09),
            (RealEstate, -0.05),
            (Alternatives, -0.03),
            (Bonds, 0.02),
        ],
        volatility_multiplier: 1.45,
    },
];

/// Long-run annual return and volatility for an asset class
pub fn baseline(asset_class: AssetClass) -> AssetStats {
    let (expected_return, volatility) = match asset_class {
        AssetClass::Stocks => (0.10, 0.16),
        AssetClass::Bonds => (0.045, 0.06),
        AssetClass::RealEstate => (0.08, 0.18),
        AssetClass::Commodities => (0.05, 0.22),
        AssetClass::Cash => (0.03, 0.01),
        AssetClass::Alternatives => (0.07, 0.12),
    };
    AssetStats {
        expected_return,
        volatility,
    }
}

/// All phase profiles of a dimension, in canonical cycle order
pub fn phase_profiles(dimension: CycleDimension) -> &'static [PhaseProfile] {
    match dimension {
        CycleDimension::Business => &BUSINESS_PHASES,
        CycleDimension::Economic => &ECONOMIC_PHASES,
        CycleDimension::Technology => &TECHNOLOGY_PHASES,
        CycleDimension::Country => &COUNTRY_PHASES,
        CycleDimension::Market => &MARKET_PHASES,
    }
}

pub fn canonical_phases(dimension: CycleDimension) -> Vec<&'static str> {
    phase_profiles(dimension).iter().map(|p| p.name).collect()
}

// "Late-Cycle", "late cycle" and "LATE_CYCLE" all resolve to the same phase
fn phase_key(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Look up a phase by label. Unrecognized labels return `None`.
pub fn phase_profile(dimension: CycleDimension, label: &str) -> Option<&'static PhaseProfile> {
    let key = phase_key(label);
    if key.is_empty() {
        return None;
    }
    phase_profiles(dimension)
        .iter()
        .find(|profile| phase_key(profile.name) == key)
}

pub fn is_recognized(dimension: CycleDimension, label: &str) -> bool {
    phase_profile(dimension, label).is_some()
}

/// Partial deviation vector for a phase; empty for unrecognized labels
pub fn phase_deviation(dimension: CycleDimension, label: &str) -> &'static [(AssetClass, f64)] {
    phase_profile(dimension, label)
        .map(|p| p.deviations)
        .unwrap_or(&[])
}

/// Deviation for one asset class; zero when the phase does not mention it
pub fn deviation_for(dimension: CycleDimension, label: &str, asset_class: AssetClass) -> f64 {
    phase_deviation(dimension, label)
        .iter()
        .find(|(class, _)| *class == asset_class)
        .map(|(_, deviation)| *deviation)
        .unwrap_or(0.0)
}

/// Volatility multiplier for a phase, 1.0 when the label is not recognized
pub fn volatility_multiplier(dimension: CycleDimension, label: &str) -> f64 {
    phase_profile(dimension, label)
        .map(|p| p.volatility_multiplier)
        .unwrap_or(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baselines_are_sane() {
        for class in AssetClass::ALL {
            let stats = baseline(class);
            assert!(stats.volatility > 0.0, "{} volatility", class);
            assert!(stats.expected_return > 0.0 && stats.expected_return < 0.2);
        }
        assert!(baseline(AssetClass::Stocks).volatility > baseline(AssetClass::Bonds).volatility);
        assert!(baseline(AssetClass::Cash).volatility < baseline(AssetClass::Bonds).volatility);
    }

    #[test]
    fn test_canonical_phase_lists() {
        assert_eq!(
            canonical_phases(CycleDimension::Business),
            vec!["Early Recovery", "Expansion", "Late Cycle", "Recession"]
        );
        assert_eq!(
            canonical_phases(CycleDimension::Market),
            vec!["Accumulation", "Markup", "Distribution", "Markdown"]
        );
        assert_eq!(canonical_phases(CycleDimension::Economic).len(), 6);
        assert_eq!(canonical_phases(CycleDimension::Technology).len(), 5);
        assert_eq!(canonical_phases(CycleDimension::Country).len(), 4);
    }

    #[test]
    fn test_phase_lookup_is_forgiving_about_formatting() {
        assert!(is_recognized(CycleDimension::Business, "late-cycle"));
        assert!(is_recognized(CycleDimension::Business, "LATE_CYCLE"));
        assert!(is_recognized(CycleDimension::Technology, "turning point"));
        assert!(!is_recognized(CycleDimension::Business, "Frenzy"));
        assert!(!is_recognized(CycleDimension::Business, ""));
    }

    #[test]
    fn test_unknown_phase_is_neutral() {
        assert_eq!(volatility_multiplier(CycleDimension::Market, "Moonshot"), 1.0);
        assert!(phase_deviation(CycleDimension::Market, "Moonshot").is_empty());
        assert_eq!(
            deviation_for(CycleDimension::Market, "Moonshot", AssetClass::Stocks),
            0.0
        );
    }

    #[test]
    fn test_crisis_phases_raise_volatility() {
        assert!(volatility_multiplier(CycleDimension::Business, "Recession") > 1.0);
        assert!(volatility_multiplier(CycleDimension::Economic, "Depression") > 1.5);
        assert!(deviation_for(CycleDimension::Business, "Recession", AssetClass::Stocks) < 0.0);
        assert!(deviation_for(CycleDimension::Business, "Recession", AssetClass::Bonds) > 0.0);
        // absent entry contributes nothing
        assert_eq!(
            deviation_for(CycleDimension::Technology, "Frenzy", AssetClass::Cash),
            0.0
        );
    }
}
