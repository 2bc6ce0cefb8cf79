use crate::asset_class::AssetClass;
use crate::error::InputError;
use crate::model::{self, AssetStats, CycleDimension};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Currently active phase label per cycle dimension, as supplied by an external classifier.
/// Dimensions with no known phase are simply absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CyclePhaseState {
    phases: BTreeMap<CycleDimension, String>,
}

impl CyclePhaseState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_phase(mut self, dimension: CycleDimension, phase: &str) -> Self {
        self.set_phase(dimension, phase);
        self
    }

    pub fn set_phase(&mut self, dimension: CycleDimension, phase: &str) {
        self.phases.insert(dimension, phase.to_string());
    }

    pub fn phase(&self, dimension: CycleDimension) -> Option<&str> {
        self.phases.get(&dimension).map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (CycleDimension, &str)> {
        self.phases.iter().map(|(d, p)| (*d, p.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Stable textual form, used to key cached "current conditions" results.
    ///
    /// Built from canonical phase names, so label spellings that resolve to the same phase
    /// share a fingerprint. Unrecognized labels are neutral and leave no trace.
    pub fn fingerprint(&self) -> String {
        let parts: Vec<String> = self
            .phases
            .iter()
            .filter_map(|(d, p)| {
                let profile = model::phase_profile(*d, p)?;
                let name = profile.name.to_ascii_lowercase().replace(' ', "-");
                Some(format!("{}={}", d, name))
            })
            .collect();
        if parts.is_empty() {
            "neutral".to_string()
        } else {
            parts.join(",")
        }
    }
}

/// Fixed per-dimension blend weights. Tunable, but never caller input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CycleWeights {
    #[serde(default = "default_business_weight")]
    pub business: f64,
    #[serde(default = "default_economic_weight")]
    pub economic: f64,
    #[serde(default = "default_technology_weight")]
    pub technology: f64,
    #[serde(default = "default_country_weight")]
    pub country: f64,
    #[serde(default = "default_market_weight")]
    pub market: f64,
}

fn default_business_weight() -> f64 {
    0.30
}
fn default_economic_weight() -> f64 {
    0.20
}
fn default_technology_weight() -> f64 {
    0.20
}
fn default_country_weight() -> f64 {
    0.15
}
fn default_market_weight() -> f64 {
    0.15
}

impl Default for CycleWeights {
    fn default() -> Self {
        Self {
            business: default_business_weight(),
            economic: default_economic_weight(),
            technology: default_technology_weight(),
            country: default_country_weight(),
            market: default_market_weight(),
        }
    }
}

impl CycleWeights {
    pub fn weight(&self, dimension: CycleDimension) -> f64 {
        match dimension {
            CycleDimension::Business => self.business,
            CycleDimension::Economic => self.economic,
            CycleDimension::Technology => self.technology,
            CycleDimension::Country => self.country,
            CycleDimension::Market => self.market,
        }
    }

    pub fn validate(&self) -> Result<(), InputError> {
        let weights = CycleDimension::ALL.map(|d| self.weight(d));
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(InputError::InvalidConfig(
                "cycle weights must be finite and non-negative".to_string(),
            ));
        }
        let total: f64 = weights.iter().sum();
        if (total - 1.0).abs() > 1e-6 {
            return Err(InputError::InvalidConfig(format!(
                "cycle weights must sum to 1.0, got {:.6}",
                total
            )));
        }
        Ok(())
    }
}

/// Phase-adjusted return vector and volatility multiplier, consumed by the simulators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleAdjustment {
    pub adjusted_returns: BTreeMap<AssetClass, f64>,
    pub volatility_multiplier: f64,
    pub active_phases: Vec<(CycleDimension, String)>,
    pub ignored_phases: Vec<(CycleDimension, String)>,
}

impl CycleAdjustment {
    /// Baseline statistics untouched: zero deviation, multiplier 1.0
    pub fn neutral() -> Self {
        Self {
            adjusted_returns: AssetClass::ALL
                .iter()
                .map(|c| (*c, model::baseline(*c).expected_return))
                .collect(),
            volatility_multiplier: 1.0,
            active_phases: Vec::new(),
            ignored_phases: Vec::new(),
        }
    }

    pub fn adjusted_return(&self, asset_class: AssetClass) -> f64 {
        self.adjusted_returns
            .get(&asset_class)
            .copied()
            .unwrap_or_else(|| model::baseline(asset_class).expected_return)
    }

    /// Deviation from the unadjusted long-run return
    pub fn return_deviation(&self, asset_class: AssetClass) -> f64 {
        self.adjusted_return(asset_class) - model::baseline(asset_class).expected_return
    }

    /// Long-run statistics for an asset class after the cycle overlay
    pub fn adjusted_stats(&self, asset_class: AssetClass) -> AssetStats {
        let base = model::baseline(asset_class);
        AssetStats {
            expected_return: self.adjusted_return(asset_class),
            volatility: base.volatility * self.volatility_multiplier,
        }
    }

    pub fn is_neutral(&self) -> bool {
        self.active_phases.is_empty()
    }
}

/// Combines the active phase of each cycle into one adjustment using fixed weights.
///
/// Volatility multipliers are combined with MAX: the most conservative active phase wins,
/// so a crisis in any single dimension always widens simulated dispersion.
#[derive(Debug, Clone)]
pub struct CycleAdjustmentCalculator {
    weights: CycleWeights,
}

impl CycleAdjustmentCalculator {
    pub fn new(weights: CycleWeights) -> Result<Self, InputError> {
        weights.validate()?;
        Ok(Self { weights })
    }

    pub fn weights(&self) -> &CycleWeights {
        &self.weights
    }

    pub fn adjust(&self, state: &CyclePhaseState) -> CycleAdjustment {
        let mut adjustment = CycleAdjustment::neutral();
        let mut multiplier: Option<f64> = None;

        for (dimension, phase) in state.iter() {
            let Some(profile) = model::phase_profile(dimension, phase) else {
                warn!(
                    "Unrecognized {} cycle phase '{}', treating as neutral",
                    dimension, phase
                );
                adjustment
                    .ignored_phases
                    .push((dimension, phase.to_string()));
                continue;
            };

            let weight = self.weights.weight(dimension);
            for (asset_class, deviation) in profile.deviations {
                if let Some(value) = adjustment.adjusted_returns.get_mut(asset_class) {
                    *value += weight * deviation;
                }
            }

            multiplier = Some(match multiplier {
                Some(current) => current.max(profile.volatility_multiplier),
                None => profile.volatility_multiplier,
            });
            adjustment
                .active_phases
                .push((dimension, profile.name.to_string()));
        }

        adjustment.volatility_multiplier = multiplier.unwrap_or(1.0);

        debug!(
            "Cycle adjustment: {} active phases, volatility multiplier {:.3}, stocks {:.4}",
            adjustment.active_phases.len(),
            adjustment.volatility_multiplier,
            adjustment.adjusted_return(AssetClass::Stocks)
        );

        adjustment
    }
}

impl Default for CycleAdjustmentCalculator {
    fn default() -> Self {
        Self {
            weights: CycleWeights::default(),
        }
    }
}
