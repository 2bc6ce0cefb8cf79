use crate::config::SimulationConfig;
use crate::cycles::CycleAdjustment;
use crate::error::{DataGap, EngineError, EngineResult};
use crate::market_data::{PriceSeries, PriceSource};
use crate::portfolio::Position;
use crate::simulation::{self, PathSpec, SimulationResult};
use crate::volatility::VolatilityCache;
use log::{debug, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;

/// Historical inputs gathered for one ticker before simulating
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketInputs {
    pub volatility: f64,
    pub last_price: Option<f64>,
}

/// Simulates a single holding: year 1 from its own estimate and history, later years from
/// its asset class.
pub struct PositionSimulator<S: PriceSource> {
    source: Arc<S>,
    volatility_cache: Arc<VolatilityCache>,
    config: SimulationConfig,
}

impl<S: PriceSource> PositionSimulator<S> {
    pub fn new(source: Arc<S>, config: SimulationConfig) -> Self {
        let volatility_cache = Arc::new(VolatilityCache::new(config.volatility_ttl()));
        Self::with_cache(source, volatility_cache, config)
    }

    pub fn with_cache(
        source: Arc<S>,
        volatility_cache: Arc<VolatilityCache>,
        config: SimulationConfig,
    ) -> Self {
        Self {
            source,
            volatility_cache,
            config,
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn volatility_cache(&self) -> &Arc<VolatilityCache> {
        &self.volatility_cache
    }

    /// Fetch history with the configured timeout
    async fn fetch_history(&self, ticker: &str) -> EngineResult<PriceSeries> {
        let fetch = self.source.fetch(ticker, self.config.lookback_days);
        match tokio::time::timeout(self.config.fetch_timeout(), fetch).await {
            Ok(Ok(series)) => Ok(series),
            Ok(Err(e)) => {
                warn!("Price fetch for {} failed: {:#}", ticker, e);
                Err(EngineError::data_unavailable(
                    ticker,
                    DataGap::FetchFailed(format!("{:#}", e)),
                ))
            }
            Err(_) => {
                warn!(
                    "Price fetch for {} timed out after {}s",
                    ticker, self.config.fetch_timeout_secs
                );
                Err(EngineError::data_unavailable(
                    ticker,
                    DataGap::Timeout(self.config.fetch_timeout_secs),
                ))
            }
        }
    }

    /// Historical volatility and latest price for a holding.
    ///
    /// A volatility supplied on the position wins, then the TTL cache, then an estimate from
    /// freshly fetched history.
    pub async fn market_inputs(&self, position: &Position) -> EngineResult<MarketInputs> {
        if let Some(vol) = position.historical_volatility {
            if vol.is_finite() && vol >= 0.0 {
                return Ok(MarketInputs {
                    volatility: vol,
                    last_price: position.current_price,
                });
            }
            warn!(
                "Ignoring invalid supplied volatility {} for {}",
                vol, position.ticker
            );
        }

        if let Some(vol) = self.volatility_cache.get(&position.ticker).await {
            debug!("Volatility cache hit for {}", position.ticker);
            return Ok(MarketInputs {
                volatility: vol,
                last_price: position.current_price,
            });
        }

        let series = self.fetch_history(&position.ticker).await?;
        let vol = self
            .config
            .volatility_estimator
            .estimate(
                &series,
                self.config.min_history_samples,
                self.config.trading_days_per_year as f64,
            )
            .map_err(|gap| EngineError::data_unavailable(&position.ticker, gap))?;

        self.volatility_cache.insert(&position.ticker, vol).await;
        info!(
            "Estimated {} volatility {:.4} from {} closes",
            position.ticker,
            vol,
            series.len()
        );

        Ok(MarketInputs {
            volatility: vol,
            last_price: position.current_price.or(series.last_price()),
        })
    }

    pub async fn simulate(
        &self,
        position: &Position,
        horizon_years: f64,
        adjustment: &CycleAdjustment,
    ) -> EngineResult<SimulationResult> {
        simulation::validate_horizon(horizon_years)?;
        let year1_return = position.require_year1_return()?;
        let inputs = self.market_inputs(position).await?;
        self.simulate_with_inputs(position, year1_return, inputs, horizon_years, adjustment)
    }

    /// Pure part of the simulation once market inputs are known
    pub fn simulate_with_inputs(
        &self,
        position: &Position,
        year1_return: f64,
        inputs: MarketInputs,
        horizon_years: f64,
        adjustment: &CycleAdjustment,
    ) -> EngineResult<SimulationResult> {
        let long_run = adjustment.adjusted_stats(position.asset_class);
        let spec = PathSpec {
            start_price: inputs.last_price.filter(|p| *p > 0.0).unwrap_or(1.0),
            year1_return,
            year1_volatility: inputs.volatility * adjustment.volatility_multiplier,
            long_run_return: long_run.expected_return,
            long_run_volatility: long_run.volatility,
        };

        let mut rng = self.rng_for(&position.ticker);
        let result = simulation::simulate_paths(
            &spec,
            horizon_years,
            self.config.trials,
            self.config.trading_days_per_year,
            &mut rng,
        )?;

        debug!(
            "{}: median {:.4}, band [{:.4}, {:.4}] over {} years",
            position.ticker, result.median, result.downside, result.upside, horizon_years
        );
        Ok(result)
    }

    pub fn rng_for(&self, label: &str) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(simulation::derive_seed(seed, label)),
            None => StdRng::from_entropy(),
        }
    }
}
