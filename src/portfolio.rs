use crate::asset_class::AssetClass;
use crate::error::{DataGap, EngineError, EngineResult, InputError};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// One caller-supplied holding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub ticker: String,
    pub weight: f64, // Fraction of portfolio, 0-1
    pub asset_class: AssetClass,
    #[serde(default)]
    pub year1_return: Option<f64>, // Near-term estimate from the targets collaborator
    #[serde(default)]
    pub historical_volatility: Option<f64>, // Annualized, when already known upstream
    #[serde(default)]
    pub current_price: Option<f64>,
}

impl Position {
    pub fn new(ticker: &str, weight: f64, asset_class: AssetClass, year1_return: f64) -> Self {
        Self {
            ticker: ticker.to_string(),
            weight,
            asset_class,
            year1_return: Some(year1_return),
            historical_volatility: None,
            current_price: None,
        }
    }

    pub fn with_volatility(mut self, volatility: f64) -> Self {
        self.historical_volatility = Some(volatility);
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.current_price = Some(price);
        self
    }

    /// The year-1 estimate, or a `MissingYear1Return` gap if absent or not finite
    pub fn require_year1_return(&self) -> EngineResult<f64> {
        match self.year1_return {
            Some(r) if r.is_finite() => Ok(r),
            _ => Err(EngineError::data_unavailable(
                &self.ticker,
                DataGap::MissingYear1Return,
            )),
        }
    }
}

/// What to do with a holding whose inputs are unavailable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingDataPolicy {
    /// Fail the whole request with the first per-ticker cause
    AllOrNothing,
    /// Skip the holding, report it, and renormalize the rest
    #[default]
    DropAndRenormalize,
}

impl MissingDataPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissingDataPolicy::AllOrNothing => "all_or_nothing",
            MissingDataPolicy::DropAndRenormalize => "drop_and_renormalize",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedPosition {
    pub ticker: String,
    pub weight: f64,
    pub reason: String,
}

/// A validated portfolio snapshot whose weights sum to one
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Portfolio {
    positions: Vec<Position>,
    original_total_weight: f64,
}

impl Portfolio {
    /// Validate weights and merge duplicate tickers.
    ///
    /// Negative or non-finite weights and an empty or zero-weight portfolio are input errors.
    /// A total weight outside `1 +/- tolerance` is normalized and logged.
    pub fn build(positions: Vec<Position>, tolerance: f64) -> Result<Self, InputError> {
        if positions.is_empty() {
            return Err(InputError::EmptyPortfolio);
        }

        for position in &positions {
            if !position.weight.is_finite() {
                return Err(InputError::InvalidWeight {
                    ticker: position.ticker.clone(),
                });
            }
            if position.weight < 0.0 {
                return Err(InputError::NegativeWeight {
                    ticker: position.ticker.clone(),
                    weight: position.weight,
                });
            }
        }

        let merged = merge_duplicates(positions);
        let total: f64 = merged.iter().map(|p| p.weight).sum();
        if total <= 0.0 {
            return Err(InputError::ZeroTotalWeight { total });
        }

        if (total - 1.0).abs() > tolerance {
            warn!(
                "Portfolio weights sum to {:.4}, normalizing {} positions to 1.0",
                total,
                merged.len()
            );
        }

        Ok(Self::normalized(merged, total))
    }

    fn normalized(mut positions: Vec<Position>, total: f64) -> Self {
        for position in &mut positions {
            position.weight /= total;
        }
        Self {
            positions,
            original_total_weight: total,
        }
    }

    /// Remove holdings by ticker and renormalize what remains
    pub fn without(&self, tickers: &[String]) -> Result<Self, InputError> {
        let remaining: Vec<Position> = self
            .positions
            .iter()
            .filter(|p| !tickers.iter().any(|t| t.eq_ignore_ascii_case(&p.ticker)))
            .cloned()
            .collect();

        if remaining.is_empty() {
            return Err(InputError::EmptyPortfolio);
        }
        let total: f64 = remaining.iter().map(|p| p.weight).sum();
        if total <= 0.0 {
            return Err(InputError::ZeroTotalWeight { total });
        }
        if !tickers.is_empty() {
            info!(
                "Renormalizing portfolio after dropping {} positions ({:.1}% of weight)",
                tickers.len(),
                (1.0 - total) * 100.0
            );
        }
        Ok(Self::normalized(remaining, total))
    }

    /// Split holdings lacking a year-1 estimate according to `policy`
    pub fn apply_missing_data_policy(
        self,
        policy: MissingDataPolicy,
    ) -> EngineResult<(Self, Vec<SkippedPosition>)> {
        let mut skipped = Vec::new();
        for position in &self.positions {
            if let Err(err) = position.require_year1_return() {
                match policy {
                    MissingDataPolicy::AllOrNothing => return Err(err),
                    MissingDataPolicy::DropAndRenormalize => {
                        warn!("Skipping {}: {}", position.ticker, err);
                        skipped.push(SkippedPosition {
                            ticker: position.ticker.clone(),
                            weight: position.weight,
                            reason: err.to_string(),
                        });
                    }
                }
            }
        }

        if skipped.is_empty() {
            return Ok((self, skipped));
        }
        let tickers: Vec<String> = skipped.iter().map(|s| s.ticker.clone()).collect();
        let remaining = self.without(&tickers)?;
        Ok((remaining, skipped))
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn original_total_weight(&self) -> f64 {
        self.original_total_weight
    }

    /// Ticker -> normalized weight, kept with cached results for audit
    pub fn weights_snapshot(&self) -> BTreeMap<String, f64> {
        self.positions
            .iter()
            .map(|p| (p.ticker.clone(), p.weight))
            .collect()
    }

    /// Digest of the per-holding inputs besides weight: asset class, year-1 estimate,
    /// supplied volatility and price. Independent of listing order.
    pub fn input_fingerprint(&self) -> String {
        let mut positions: Vec<&Position> = self.positions.iter().collect();
        positions.sort_by(|a, b| a.ticker.cmp(&b.ticker));

        let mut hasher = DefaultHasher::new();
        for position in positions {
            position.ticker.to_ascii_uppercase().hash(&mut hasher);
            position.asset_class.hash(&mut hasher);
            position.year1_return.map(f64::to_bits).hash(&mut hasher);
            position.historical_volatility.map(f64::to_bits).hash(&mut hasher);
            position.current_price.map(f64::to_bits).hash(&mut hasher);
        }
        format!("{:016x}", hasher.finish())
    }

    /// Normalized weight per asset class
    pub fn asset_class_weights(&self) -> BTreeMap<AssetClass, f64> {
        let mut weights = BTreeMap::new();
        for position in &self.positions {
            *weights.entry(position.asset_class).or_insert(0.0) += position.weight;
        }
        weights
    }
}

// Same ticker listed twice: sum weights, weight-average the year-1 estimate
fn merge_duplicates(positions: Vec<Position>) -> Vec<Position> {
    let mut merged: Vec<Position> = Vec::with_capacity(positions.len());

    for position in positions {
        let Some(existing) = merged
            .iter_mut()
            .find(|p| p.ticker.eq_ignore_ascii_case(&position.ticker))
        else {
            merged.push(position);
            continue;
        };

        warn!(
            "Duplicate position {} merged ({:.4} + {:.4})",
            position.ticker, existing.weight, position.weight
        );
        let total = existing.weight + position.weight;
        existing.year1_return = match (existing.year1_return, position.year1_return) {
            (Some(a), Some(b)) if total > 0.0 => {
                Some((a * existing.weight + b * position.weight) / total)
            }
            (Some(a), Some(_)) => Some(a),
            _ => None,
        };
        existing.historical_volatility = existing
            .historical_volatility
            .or(position.historical_volatility);
        existing.current_price = existing.current_price.or(position.current_price);
        existing.weight = total;
    }

    merged
}
