//! Single-shock-per-period log-normal simulation shared by the position and portfolio
//! simulators.

use crate::error::{EngineError, EngineResult, InputError};
use crate::stats;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub const MAX_HORIZON_YEARS: f64 = 50.0;

/// Distribution summary for one holding or a whole portfolio
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub median: f64,     // Median terminal return, annualized over the horizon
    pub upside: f64,     // 95th percentile single-year return
    pub downside: f64,   // 5th percentile single-year return
    pub volatility: f64, // Time-weighted annual sigma used across the horizon
    pub simulation_count: usize,
}

impl SimulationResult {
    /// Build a result, refusing percentile inversion or non-finite statistics.
    pub fn new(
        median: f64,
        upside: f64,
        downside: f64,
        volatility: f64,
        simulation_count: usize,
    ) -> EngineResult<Self> {
        if ![median, upside, downside, volatility]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(EngineError::InvariantViolation(format!(
                "non-finite statistic: median {} upside {} downside {} volatility {}",
                median, upside, downside, volatility
            )));
        }
        if upside < downside {
            return Err(EngineError::InvariantViolation(format!(
                "upside {:.6} is below downside {:.6}",
                upside, downside
            )));
        }
        Ok(Self {
            median,
            upside,
            downside,
            volatility,
            simulation_count,
        })
    }

    /// Width of the 5-95 band
    pub fn spread(&self) -> f64 {
        self.upside - self.downside
    }
}

/// Drift and volatility for the first year and for every later year
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathSpec {
    pub start_price: f64,
    pub year1_return: f64,
    pub year1_volatility: f64,
    pub long_run_return: f64,
    pub long_run_volatility: f64,
}

impl PathSpec {
    fn params_for(&self, period_index: usize) -> (f64, f64) {
        if period_index == 0 {
            (self.year1_return, self.year1_volatility)
        } else {
            (self.long_run_return, self.long_run_volatility)
        }
    }
}

pub fn validate_horizon(horizon_years: f64) -> Result<(), InputError> {
    if !horizon_years.is_finite() || horizon_years <= 0.0 || horizon_years > MAX_HORIZON_YEARS {
        return Err(InputError::InvalidHorizon(horizon_years));
    }
    Ok(())
}

/// Split a horizon into annual periods. A fractional final year is snapped to a whole
/// number of trading days (at least one) and expressed in years.
pub fn horizon_periods(horizon_years: f64, trading_days_per_year: u32) -> Vec<f64> {
    let full_years = horizon_years.floor() as usize;
    let mut periods = vec![1.0; full_years];

    let remainder = horizon_years - full_years as f64;
    if remainder > 1e-9 {
        let days = ((remainder * trading_days_per_year as f64).round() as u32).max(1);
        periods.push(days as f64 / trading_days_per_year as f64);
    }
    periods
}

/// Run `trials` independent paths and summarise them.
///
/// Each period draws one standard-normal shock `Z` and moves price by
/// `exp((mu - sigma^2 / 2) * f + sigma * sqrt(f) * Z)` for a period of `f` years.
/// Every period's return (re-annualized when `f < 1`) feeds the single-year distribution
/// that upside and downside are read from; the median comes from terminal returns
/// annualized over the whole horizon.
pub fn simulate_paths<R: Rng>(
    spec: &PathSpec,
    horizon_years: f64,
    trials: usize,
    trading_days_per_year: u32,
    rng: &mut R,
) -> EngineResult<SimulationResult> {
    validate_horizon(horizon_years)?;
    if trials == 0 {
        return Err(InputError::InvalidConfig("trials must be positive".to_string()).into());
    }

    let periods = horizon_periods(horizon_years, trading_days_per_year);
    let effective_years: f64 = periods.iter().sum();

    let mut period_returns = Vec::with_capacity(trials * periods.len());
    let mut terminal_returns = Vec::with_capacity(trials);

    for _ in 0..trials {
        let mut price = spec.start_price;

        for (index, &fraction) in periods.iter().enumerate() {
            let (mu, sigma) = spec.params_for(index);
            let z: f64 = rng.sample(StandardNormal);

            // volatility drag correction
            let drift = mu - 0.5 * sigma * sigma;
            let factor = (drift * fraction + sigma * fraction.sqrt() * z).exp();
            let period_return = factor - 1.0;

            period_returns.push(if fraction < 1.0 {
                stats::annualize_return(period_return, fraction)
            } else {
                period_return
            });
            price *= factor;
        }

        let total_return = price / spec.start_price - 1.0;
        terminal_returns.push(stats::annualize_return(total_return, effective_years));
    }

    let tails = stats::percentile_summary(period_returns).ok_or_else(|| {
        EngineError::InvariantViolation("period return sample contains NaN".to_string())
    })?;
    let median = stats::median(terminal_returns).ok_or_else(|| {
        EngineError::InvariantViolation("terminal return sample contains NaN".to_string())
    })?;

    let volatility = periods
        .iter()
        .enumerate()
        .map(|(index, fraction)| spec.params_for(index).1 * fraction)
        .sum::<f64>()
        / effective_years;

    SimulationResult::new(median, tails.p95, tails.p5, volatility, trials)
}

/// Stable per-unit seed so a batch gives the same answer in any completion order
pub fn derive_seed(base_seed: u64, label: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    base_seed.hash(&mut hasher);
    label.hash(&mut hasher);
    hasher.finish()
}
