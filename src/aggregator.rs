//! Portfolio-level simulation.
//!
//! The portfolio is reduced to three weighted scalars (year-1 return, cycle-adjusted long-run
//! return and asset-class volatility) and simulated as a single instrument. Every period
//! draws ONE shock shared by all holdings, which is equivalent to assuming perfect
//! correlation between positions. Diversification benefit is therefore not modelled and
//! portfolio dispersion is an upper bound. Replacing this with per-holding shocks requires a
//! correlation matrix the engine does not currently carry.

use crate::cycles::CycleAdjustment;
use crate::error::EngineResult;
use crate::portfolio::Portfolio;
use crate::simulation::{self, PathSpec, SimulationResult};
use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Weighted inputs for the shared-shock portfolio path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioAggregate {
    pub year1_return: f64,
    pub long_run_return: f64,
    pub volatility: f64,
    pub weights: BTreeMap<String, f64>,
}

impl PortfolioAggregate {
    pub fn path_spec(&self) -> PathSpec {
        PathSpec {
            start_price: 1.0,
            year1_return: self.year1_return,
            year1_volatility: self.volatility,
            long_run_return: self.long_run_return,
            long_run_volatility: self.volatility,
        }
    }
}

/// Collapse a portfolio into weighted scalars.
///
/// Positions without a year-1 estimate fail here; callers apply the missing-data policy first.
pub fn aggregate(
    portfolio: &Portfolio,
    adjustment: &CycleAdjustment,
) -> EngineResult<PortfolioAggregate> {
    let mut year1_return = 0.0;
    let mut long_run_return = 0.0;
    let mut volatility = 0.0;

    for position in portfolio.positions() {
        let stats = adjustment.adjusted_stats(position.asset_class);
        year1_return += position.weight * position.require_year1_return()?;
        long_run_return += position.weight * stats.expected_return;
        volatility += position.weight * stats.volatility;
    }

    debug!(
        "Aggregated {} positions: year1 {:.4}, long run {:.4}, vol {:.4}",
        portfolio.len(),
        year1_return,
        long_run_return,
        volatility
    );

    Ok(PortfolioAggregate {
        year1_return,
        long_run_return,
        volatility,
        weights: portfolio.weights_snapshot(),
    })
}

pub fn simulate_portfolio<R: Rng>(
    portfolio: &Portfolio,
    horizon_years: f64,
    adjustment: &CycleAdjustment,
    trials: usize,
    trading_days_per_year: u32,
    rng: &mut R,
) -> EngineResult<SimulationResult> {
    let aggregate = aggregate(portfolio, adjustment)?;
    simulation::simulate_paths(
        &aggregate.path_spec(),
        horizon_years,
        trials,
        trading_days_per_year,
        rng,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset_class::AssetClass;
    use crate::cycles::CyclePhaseState;
    use crate::cycles::CycleAdjustmentCalculator;
    use crate::model::CycleDimension;
    use crate::portfolio::Position;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn sixty_forty() -> Portfolio {
        Portfolio::build(
            vec![
                Position::new("VTI", 0.6, AssetClass::Stocks, 0.05),
                Position::new("BND", 0.4, AssetClass::Bonds, 0.05),
            ],
            0.01,
        )
        .unwrap()
    }

    #[test]
    fn test_volatility_is_weighted_between_classes() {
        let agg = aggregate(&sixty_forty(), &CycleAdjustment::neutral()).unwrap();
        assert!((agg.volatility - 0.12).abs() < 1e-12);
        assert!(agg.volatility > 0.06 && agg.volatility < 0.16);
        assert!((agg.year1_return - 0.05).abs() < 1e-12);
        assert!((agg.long_run_return - (0.6 * 0.10 + 0.4 * 0.045)).abs() < 1e-12);
    }

    #[test]
    fn test_multiplier_applies_to_portfolio_volatility() {
        let state = CyclePhaseState::new().with_phase(CycleDimension::Business, "Recession");
        let adjustment = CycleAdjustmentCalculator::default().adjust(&state);
        let agg = aggregate(&sixty_forty(), &adjustment).unwrap();
        assert!((agg.volatility - 0.12 * 1.60).abs() < 1e-12);
    }

    #[test]
    fn test_shared_shock_portfolio_result() {
        let result = simulate_portfolio(
            &sixty_forty(),
            1.0,
            &CycleAdjustment::neutral(),
            2_000,
            252,
            &mut StdRng::seed_from_u64(5),
        )
        .unwrap();
        assert!((result.volatility - 0.12).abs() < 1e-12);
        assert!(result.upside > result.median && result.median > result.downside);
    }
}
