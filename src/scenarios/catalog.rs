use crate::asset_class::AssetClass;
use crate::cycles::CyclePhaseState;
use crate::error::InputError;
use crate::model::CycleDimension;
use log::debug;
use serde::Serialize;

/// A named historical period used as a stress scenario
#[derive(Debug, Clone, Serialize)]
pub struct HistoricalAnalog {
    pub id: &'static str,
    pub name: &'static str,
    pub period: &'static str,
    pub aliases: &'static [&'static str],
    /// (asset class, annualized return, peak-to-trough drawdown)
    pub outcomes: &'static [(AssetClass, f64, f64)],
    pub phases: &'static [(CycleDimension, &'static str)],
}

impl HistoricalAnalog {
    pub fn asset_return(&self, asset_class: AssetClass) -> f64 {
        self.outcomes
            .iter()
            .find(|(c, _, _)| *c == asset_class)
            .map(|(_, r, _)| *r)
            .unwrap_or(0.0)
    }

    pub fn max_drawdown(&self, asset_class: AssetClass) -> f64 {
        self.outcomes
            .iter()
            .find(|(c, _, _)| *c == asset_class)
            .map(|(_, _, dd)| *dd)
            .unwrap_or(0.0)
    }

    /// Cycle phases that prevailed during the period
    pub fn phase_state(&self) -> CyclePhaseState {
        self.phases
            .iter()
            .fold(CyclePhaseState::new(), |state, (dimension, phase)| {
                state.with_phase(*dimension, phase)
            })
    }
}

use AssetClass::*;
use CycleDimension::{Business, Country, Economic, Market, Technology};

static ANALOGS: &[HistoricalAnalog] = &[
    HistoricalAnalog {
        id: "great-depression",
        name: "Great Depression",
        period: "1929-1932",
        aliases: &["1929", "1930s", "depression", "crash of 1929", "black tuesday"],
        outcomes: &[
            (Stocks, -0.27, 0.86),
            (Bonds, 0.05, 0.05),
            (RealEstate, -0.15, 0.50),
            (Commodities, -0.20, 0.55),
            (Cash, 0.02, 0.0),
            (Alternatives, -0.10, 0.35),
        ],
        phases: &[
            (Business, "Recession"),
            (Economic, "Depression"),
            (Market, "Markdown"),
        ],
    },
    HistoricalAnalog {
        id: "stagflation-1970s",
        name: "1970s Stagflation",
        period: "1973-1974",
        aliases: &["stagflation", "1973", "1974", "1970s", "oil embargo", "oil shock"],
        outcomes: &[
            (Stocks, -0.20, 0.48),
            (Bonds, 0.03, 0.10),
            (RealEstate, -0.10, 0.35),
            (Commodities, 0.35, 0.15),
            (Cash, 0.07, 0.0),
            (Alternatives, 0.0, 0.15),
        ],
        phases: &[
            (Business, "Recession"),
            (Country, "Decline"),
            (Market, "Markdown"),
        ],
    },
    HistoricalAnalog {
        id: "volcker-1980",
        name: "Volcker Disinflation",
        period: "1980-1982",
        aliases: &["volcker", "1980", "1981", "1982", "double dip", "double-dip recession"],
        outcomes: &[
            (Stocks, 0.05, 0.27),
            (Bonds, 0.05, 0.20),
            (RealEstate, 0.08, 0.15),
            (Commodities, -0.05, 0.30),
            (Cash, 0.12, 0.0),
            (Alternatives, 0.04, 0.12),
        ],
        phases: &[(Business, "Recession"), (Economic, "Deleveraging")],
    },
    HistoricalAnalog {
        id: "dotcom-bust",
        name: "Dot-com Bust",
        period: "2000-2002",
        aliases: &[
            "dotcom",
            "dot com",
            "2000",
            "2001",
            "2002",
            "tech bubble",
            "internet bubble",
            "tech crash",
        ],
        outcomes: &[
            (Stocks, -0.15, 0.49),
            (Bonds, 0.10, 0.04),
            (RealEstate, 0.12, 0.10),
            (Commodities, 0.05, 0.25),
            (Cash, 0.04, 0.0),
            (Alternatives, 0.05, 0.10),
        ],
        phases: &[
            (Business, "Recession"),
            (Technology, "Turning Point"),
            (Market, "Markdown"),
        ],
    },
    HistoricalAnalog {
        id: "global-financial-crisis",
        name: "Global Financial Crisis",
        period: "2007-2009",
        aliases: &[
            "gfc",
            "2007",
            "2008",
            "2009",
            "financial crisis",
            "housing crisis",
            "housing crash",
            "lehman",
            "subprime",
            "great recession",
        ],
        outcomes: &[
            (Stocks, -0.18, 0.55),
            (Bonds, 0.06, 0.04),
            (RealEstate, -0.25, 0.68),
            (Commodities, -0.15, 0.55),
            (Cash, 0.02, 0.0),
            (Alternatives, -0.05, 0.25),
        ],
        phases: &[
            (Business, "Recession"),
            (Economic, "Deleveraging"),
            (Market, "Markdown"),
        ],
    },
    HistoricalAnalog {
        id: "covid-crash",
        name: "COVID-19 Crash",
        period: "2020",
        aliases: &["covid", "covid19", "2020", "pandemic", "coronavirus", "lockdown"],
        outcomes: &[
            (Stocks, 0.18, 0.34),
            (Bonds, 0.075, 0.06),
            (RealEstate, -0.05, 0.40),
            (Commodities, -0.03, 0.35),
            (Cash, 0.005, 0.0),
            (Alternatives, 0.05, 0.15),
        ],
        phases: &[(Business, "Recession"), (Market, "Markdown")],
    },
    HistoricalAnalog {
        id: "inflation-2022",
        name: "2022 Inflation Shock",
        period: "2022",
        aliases: &["2022", "inflation", "inflation shock", "rate hikes", "rate shock"],
        outcomes: &[
            (Stocks, -0.18, 0.25),
            (Bonds, -0.13, 0.17),
            (RealEstate, -0.25, 0.30),
            (Commodities, 0.16, 0.20),
            (Cash, 0.015, 0.0),
            (Alternatives, -0.02, 0.10),
        ],
        phases: &[
            (Business, "Late Cycle"),
            (Economic, "Top"),
            (Market, "Distribution"),
        ],
    },
    HistoricalAnalog {
        id: "roaring-nineties",
        name: "Late-1990s Bull Market",
        period: "1995-1999",
        aliases: &["1990s", "nineties", "1995", "1999", "bull market", "boom"],
        outcomes: &[
            (Stocks, 0.28, 0.19),
            (Bonds, 0.07, 0.05),
            (RealEstate, 0.08, 0.20),
            (Commodities, 0.02, 0.25),
            (Cash, 0.05, 0.0),
            (Alternatives, 0.12, 0.08),
        ],
        phases: &[
            (Business, "Expansion"),
            (Technology, "Frenzy"),
            (Market, "Markup"),
        ],
    },
];

// Lowercase alphanumeric tokens, single-space separated and padded for whole-token matching
fn tokenize(text: &str) -> String {
    let tokens: Vec<String> = text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
        .collect();
    format!(" {} ", tokens.join(" "))
}

pub struct AnalogCatalog;

impl AnalogCatalog {
    pub fn all() -> &'static [HistoricalAnalog] {
        ANALOGS
    }

    pub fn get(id: &str) -> Option<&'static HistoricalAnalog> {
        ANALOGS.iter().find(|a| a.id.eq_ignore_ascii_case(id.trim()))
    }

    /// Resolve an identifier or free-text query ("what if 2008 happens again").
    ///
    /// Exact id, then exact alias, then the longest id or alias whose tokens appear
    /// contiguously in the query.
    pub fn resolve(query: &str) -> Result<&'static HistoricalAnalog, InputError> {
        if let Some(analog) = Self::get(query) {
            return Ok(analog);
        }

        let needle = tokenize(query);
        if needle.trim().is_empty() {
            return Err(InputError::UnknownScenario(query.to_string()));
        }

        if let Some(analog) = ANALOGS
            .iter()
            .find(|a| a.aliases.iter().any(|alias| tokenize(alias) == needle))
        {
            return Ok(analog);
        }

        let mut best: Option<(&'static HistoricalAnalog, usize)> = None;
        for analog in ANALOGS {
            let candidates = std::iter::once(analog.id).chain(analog.aliases.iter().copied());
            for candidate in candidates {
                let pattern = tokenize(candidate);
                if needle.contains(&pattern) && best.is_none_or(|(_, len)| pattern.len() > len) {
                    best = Some((analog, pattern.len()));
                }
            }
        }

        match best {
            Some((analog, _)) => {
                debug!("Resolved scenario query '{}' to {}", query, analog.id);
                Ok(analog)
            }
            None => Err(InputError::UnknownScenario(query.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model;

    #[test]
    fn test_resolve_by_id_and_alias() {
        assert_eq!(
            AnalogCatalog::resolve("global-financial-crisis").unwrap().id,
            "global-financial-crisis"
        );
        assert_eq!(AnalogCatalog::resolve("GFC").unwrap().id, "global-financial-crisis");
        assert_eq!(AnalogCatalog::resolve("Covid").unwrap().id, "covid-crash");
    }

    #[test]
    fn test_resolve_natural_language() {
        let analog = AnalogCatalog::resolve("What if 2008 happens again?").unwrap();
        assert_eq!(analog.id, "global-financial-crisis");

        let analog = AnalogCatalog::resolve("replay the dot com crash").unwrap();
        assert_eq!(analog.id, "dotcom-bust");

        // longest matching alias wins
        let analog = AnalogCatalog::resolve("an oil shock like 1973").unwrap();
        assert_eq!(analog.id, "stagflation-1970s");
    }

    #[test]
    fn test_unknown_scenario() {
        assert_eq!(
            AnalogCatalog::resolve("alien invasion").unwrap_err(),
            InputError::UnknownScenario("alien invasion".to_string())
        );
        assert!(AnalogCatalog::resolve("   ").is_err());
        // partial tokens do not match
        assert!(AnalogCatalog::resolve("gfcx").is_err());
    }

    #[test]
    fn test_catalog_is_complete_and_consistent() {
        assert_eq!(AnalogCatalog::all().len(), 8);
        for analog in AnalogCatalog::all() {
            assert_eq!(analog.outcomes.len(), AssetClass::ALL.len(), "{}", analog.id);
            for (_, _, drawdown) in analog.outcomes {
                assert!((0.0..=1.0).contains(drawdown));
            }
            for (dimension, phase) in analog.phases {
                assert!(
                    model::is_recognized(*dimension, phase),
                    "{} uses unknown phase {}",
                    analog.id,
                    phase
                );
            }
        }
    }

    #[test]
    fn test_phase_state() {
        let gfc = AnalogCatalog::get("global-financial-crisis").unwrap();
        let state = gfc.phase_state();
        assert_eq!(state.phase(CycleDimension::Business), Some("Recession"));
        assert_eq!(state.phase(CycleDimension::Technology), None);
        assert_eq!(gfc.asset_return(AssetClass::RealEstate), -0.25);
        assert_eq!(gfc.max_drawdown(AssetClass::Stocks), 0.55);
    }
}
