use crate::aggregator::{self, PortfolioAggregate};
use crate::asset_class::AssetClass;
use crate::cache::{CacheStore, CachedResult, InputSnapshot, ResultCache};
use crate::config::EngineConfig;
use crate::cycles::{CycleAdjustment, CycleAdjustmentCalculator, CyclePhaseState};
use crate::error::{EngineError, EngineResult, InputError};
use crate::market_data::PriceSource;
use crate::portfolio::{MissingDataPolicy, Portfolio, Position, SkippedPosition};
use crate::position_simulator::PositionSimulator;
use crate::scenarios::{
    AnalogCatalog, HistoricalAnalog, ScenarioOutcome, ScenarioScore, ScenarioScorer,
};
use crate::simulation::{self, SimulationResult};
use futures::stream::{self, StreamExt};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Which conditions to project under
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioSelection {
    /// Unadjusted long-run baseline
    #[default]
    Base,
    /// Current conditions as reported by the phase classifier
    Current { phases: CyclePhaseState },
    /// A historical analog, by id or free text
    Analog { query: String },
}

#[derive(Debug, Clone)]
pub struct ResolvedScenario {
    pub scenario_id: String,
    pub adjustment: CycleAdjustment,
    pub analog: Option<&'static HistoricalAnalog>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionRequest {
    pub portfolio_id: String,
    pub positions: Vec<Position>,
    pub horizon_years: f64,
    #[serde(default)]
    pub scenario: ScenarioSelection,
    /// Overrides the configured policy for this request
    #[serde(default)]
    pub missing_data_policy: Option<MissingDataPolicy>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioProjection {
    pub portfolio_id: String,
    pub scenario_id: String,
    pub horizon_years: f64,
    pub model_version: u32,
    pub portfolio: SimulationResult,
    pub aggregate: PortfolioAggregate,
    pub positions: BTreeMap<String, SimulationResult>,
    pub skipped: Vec<SkippedPosition>,
    pub adjustment: CycleAdjustment,
}

/// Per-ticker results of a bounded batch. One ticker failing never fails the others.
#[derive(Debug, Default)]
pub struct BatchSimulation {
    pub results: BTreeMap<String, SimulationResult>,
    pub failures: BTreeMap<String, EngineError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioEvaluation {
    pub scenario_id: String,
    pub scenario_name: String,
    pub period: String,
    pub horizon_years: f64,
    pub portfolio_projection: SimulationResult,
    pub benchmark_projection: SimulationResult,
    /// What each side actually did over the historical period, for reference
    pub historical_portfolio: ScenarioOutcome,
    pub historical_benchmark: ScenarioOutcome,
    /// Computed from the two simulated projections
    pub score: ScenarioScore,
}

/// Entry point tying the cycle overlay, simulators, scorer and cache together
pub struct ProjectionEngine<S: PriceSource> {
    config: EngineConfig,
    calculator: CycleAdjustmentCalculator,
    scorer: ScenarioScorer,
    positions: PositionSimulator<S>,
}

impl<S: PriceSource> ProjectionEngine<S> {
    pub fn new(config: EngineConfig, source: Arc<S>) -> Result<Self, InputError> {
        config.validate()?;
        let calculator = CycleAdjustmentCalculator::new(config.cycle_weights)?;
        let scorer = ScenarioScorer::new(config.scoring.clone())?;
        let positions = PositionSimulator::new(source, config.simulation.clone());

        info!(
            "Projection engine ready: {} trials, batch concurrency {}, model v{}",
            config.simulation.trials,
            config.simulation.batch_concurrency,
            config.cache.model_version
        );

        Ok(Self {
            config,
            calculator,
            scorer,
            positions,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scorer(&self) -> &ScenarioScorer {
        &self.scorer
    }

    pub fn position_simulator(&self) -> &PositionSimulator<S> {
        &self.positions
    }

    pub fn resolve_scenario(
        &self,
        selection: &ScenarioSelection,
    ) -> Result<ResolvedScenario, InputError> {
        let resolved = match selection {
            ScenarioSelection::Base => ResolvedScenario {
                scenario_id: "base".to_string(),
                adjustment: CycleAdjustment::neutral(),
                analog: None,
            },
            ScenarioSelection::Current { phases } => ResolvedScenario {
                scenario_id: format!("current:{}", phases.fingerprint()),
                adjustment: self.calculator.adjust(phases),
                analog: None,
            },
            ScenarioSelection::Analog { query } => {
                let analog = AnalogCatalog::resolve(query)?;
                ResolvedScenario {
                    scenario_id: analog.id.to_string(),
                    adjustment: self.calculator.adjust(&analog.phase_state()),
                    analog: Some(analog),
                }
            }
        };
        Ok(resolved)
    }

    pub async fn simulate_position(
        &self,
        position: &Position,
        horizon_years: f64,
        adjustment: &CycleAdjustment,
    ) -> EngineResult<SimulationResult> {
        self.positions.simulate(position, horizon_years, adjustment).await
    }

    /// Simulate many holdings with at most `batch_concurrency` in flight
    pub async fn simulate_tickers(
        &self,
        positions: &[Position],
        horizon_years: f64,
        adjustment: &CycleAdjustment,
    ) -> BatchSimulation {
        let outcomes: Vec<(String, EngineResult<SimulationResult>)> = stream::iter(positions)
            .map(|position| async move {
                let result = self.simulate_position(position, horizon_years, adjustment).await;
                (position.ticker.clone(), result)
            })
            .buffer_unordered(self.config.simulation.batch_concurrency)
            .collect()
            .await;

        let mut batch = BatchSimulation::default();
        for (ticker, outcome) in outcomes {
            match outcome {
                Ok(result) => {
                    batch.results.insert(ticker, result);
                }
                Err(e) => {
                    warn!("Simulation for {} failed: {}", ticker, e);
                    batch.failures.insert(ticker, e);
                }
            }
        }
        batch
    }

    pub async fn project(&self, request: &ProjectionRequest) -> EngineResult<PortfolioProjection> {
        simulation::validate_horizon(request.horizon_years)?;
        let portfolio = Portfolio::build(
            request.positions.clone(),
            self.config.simulation.weight_tolerance,
        )?;
        let scenario = self.resolve_scenario(&request.scenario)?;
        let policy = request
            .missing_data_policy
            .unwrap_or(self.config.simulation.missing_data_policy);

        let (portfolio, mut skipped) = portfolio.apply_missing_data_policy(policy)?;
        let batch = self
            .simulate_tickers(portfolio.positions(), request.horizon_years, &scenario.adjustment)
            .await;

        let mut dropped = Vec::new();
        for (ticker, err) in batch.failures {
            if err.is_fatal() || err.is_input_error() || policy == MissingDataPolicy::AllOrNothing
            {
                return Err(err);
            }
            let weight = portfolio
                .positions()
                .iter()
                .find(|p| p.ticker == ticker)
                .map(|p| p.weight)
                .unwrap_or(0.0);
            skipped.push(SkippedPosition {
                ticker: ticker.clone(),
                weight,
                reason: err.to_string(),
            });
            dropped.push(ticker);
        }
        let portfolio = if dropped.is_empty() {
            portfolio
        } else {
            portfolio.without(&dropped)?
        };

        let aggregate = aggregator::aggregate(&portfolio, &scenario.adjustment)?;
        let mut rng = self
            .positions
            .rng_for(&format!("{}/{}", request.portfolio_id, scenario.scenario_id));
        let result = simulation::simulate_paths(
            &aggregate.path_spec(),
            request.horizon_years,
            self.config.simulation.trials,
            self.config.simulation.trading_days_per_year,
            &mut rng,
        )?;

        info!(
            "Projected {} under {} over {} years: median {:.4}, band [{:.4}, {:.4}], {} skipped",
            request.portfolio_id,
            scenario.scenario_id,
            request.horizon_years,
            result.median,
            result.downside,
            result.upside,
            skipped.len()
        );

        Ok(PortfolioProjection {
            portfolio_id: request.portfolio_id.clone(),
            scenario_id: scenario.scenario_id,
            horizon_years: request.horizon_years,
            model_version: self.config.cache.model_version,
            portfolio: result,
            aggregate,
            positions: batch.results,
            skipped,
            adjustment: scenario.adjustment,
        })
    }

    /// `project` through the result cache, keyed by portfolio, scenario and horizon
    pub async fn project_cached<C: CacheStore>(
        &self,
        request: &ProjectionRequest,
        cache: &ResultCache<C>,
    ) -> EngineResult<(PortfolioProjection, bool)> {
        simulation::validate_horizon(request.horizon_years)?;
        let portfolio = Portfolio::build(
            request.positions.clone(),
            self.config.simulation.weight_tolerance,
        )?;
        let policy = request
            .missing_data_policy
            .unwrap_or(self.config.simulation.missing_data_policy);
        let inputs = cache_inputs(&portfolio, Some(policy));
        let scenario = self.resolve_scenario(&request.scenario)?;
        let scenario_key = horizon_key(&scenario.scenario_id, request.horizon_years);

        let lookup = cache
            .get_or_compute(&request.portfolio_id, &scenario_key, inputs, || async {
                let projection = self.project(request).await?;
                Ok::<_, EngineError>(CachedResult::Projection(Box::new(projection)))
            })
            .await?;

        let computed = lookup.computed;
        let key = lookup.entry.key.clone();
        let projection = lookup.entry.payload.into_projection().ok_or_else(|| {
            EngineError::InvariantViolation(format!("cache entry {} is not a projection", key))
        })?;
        Ok((projection, computed))
    }

    /// Replay a historical analog against the portfolio and the benchmark
    pub async fn evaluate_scenario(
        &self,
        query: &str,
        positions: &[Position],
        horizon_years: f64,
    ) -> EngineResult<ScenarioEvaluation> {
        let analog = AnalogCatalog::resolve(query)?;
        simulation::validate_horizon(horizon_years)?;
        let portfolio =
            Portfolio::build(positions.to_vec(), self.config.simulation.weight_tolerance)?;
        let adjustment = self.calculator.adjust(&analog.phase_state());

        // Year 1 replays the analog's asset-class returns
        let replayed: Vec<Position> = portfolio
            .positions()
            .iter()
            .cloned()
            .map(|mut p| {
                p.year1_return = Some(analog.asset_return(p.asset_class));
                p
            })
            .collect();
        let replayed = Portfolio::build(replayed, self.config.simulation.weight_tolerance)?;

        let benchmark_weights = self.scorer.benchmark_weights();
        let benchmark = self.benchmark_portfolio(analog, &benchmark_weights)?;

        let portfolio_projection =
            self.simulate_analog(&replayed, analog, "portfolio", horizon_years, &adjustment)?;
        let benchmark_projection =
            self.simulate_analog(&benchmark, analog, "benchmark", horizon_years, &adjustment)?;

        let score = self.scorer.score(
            analog.id,
            &ScenarioOutcome::from_simulation(&portfolio_projection),
            &ScenarioOutcome::from_simulation(&benchmark_projection),
        );

        info!(
            "Scenario {}: score {:.1} ({})",
            analog.id,
            score.score,
            score.label.description()
        );

        Ok(ScenarioEvaluation {
            scenario_id: analog.id.to_string(),
            scenario_name: analog.name.to_string(),
            period: analog.period.to_string(),
            horizon_years,
            portfolio_projection,
            benchmark_projection,
            historical_portfolio: ScenarioOutcome::from_analog(
                analog,
                &portfolio.asset_class_weights(),
            ),
            historical_benchmark: ScenarioOutcome::from_analog(analog, &benchmark_weights),
            score,
        })
    }

    /// `evaluate_scenario` through the result cache
    pub async fn evaluate_scenario_cached<C: CacheStore>(
        &self,
        subject_id: &str,
        query: &str,
        positions: &[Position],
        horizon_years: f64,
        cache: &ResultCache<C>,
    ) -> EngineResult<(ScenarioEvaluation, bool)> {
        let analog = AnalogCatalog::resolve(query)?;
        simulation::validate_horizon(horizon_years)?;
        let portfolio =
            Portfolio::build(positions.to_vec(), self.config.simulation.weight_tolerance)?;
        let inputs = cache_inputs(&portfolio, None);
        let scenario_key = format!("evaluate:{}", horizon_key(analog.id, horizon_years));

        let lookup = cache
            .get_or_compute(subject_id, &scenario_key, inputs, || async {
                let evaluation = self.evaluate_scenario(analog.id, positions, horizon_years).await?;
                Ok::<_, EngineError>(CachedResult::Evaluation(Box::new(evaluation)))
            })
            .await?;

        let computed = lookup.computed;
        let key = lookup.entry.key.clone();
        let evaluation = lookup.entry.payload.into_evaluation().ok_or_else(|| {
            EngineError::InvariantViolation(format!("cache entry {} is not an evaluation", key))
        })?;
        Ok((evaluation, computed))
    }

    fn benchmark_portfolio(
        &self,
        analog: &HistoricalAnalog,
        weights: &BTreeMap<AssetClass, f64>,
    ) -> Result<Portfolio, InputError> {
        let positions = weights
            .iter()
            .map(|(class, weight)| {
                Position::new(class.as_str(), *weight, *class, analog.asset_return(*class))
            })
            .collect();
        Portfolio::build(positions, self.config.simulation.weight_tolerance)
    }

    fn simulate_analog(
        &self,
        portfolio: &Portfolio,
        analog: &HistoricalAnalog,
        label: &str,
        horizon_years: f64,
        adjustment: &CycleAdjustment,
    ) -> EngineResult<SimulationResult> {
        let mut rng = self.positions.rng_for(&format!("{}/{}", analog.id, label));
        aggregator::simulate_portfolio(
            portfolio,
            horizon_years,
            adjustment,
            self.config.simulation.trials,
            self.config.simulation.trading_days_per_year,
            &mut rng,
        )
    }
}

fn horizon_key(scenario_id: &str, horizon_years: f64) -> String {
    format!("{}@{}y", scenario_id, horizon_years)
}

// Everything a cached result depends on besides its key
fn cache_inputs(portfolio: &Portfolio, policy: Option<MissingDataPolicy>) -> InputSnapshot {
    let fingerprint = match policy {
        Some(policy) => format!("{}/{}", portfolio.input_fingerprint(), policy.as_str()),
        None => portfolio.input_fingerprint(),
    };
    InputSnapshot::new(portfolio.weights_snapshot(), fingerprint)
}
