use super::catalog::HistoricalAnalog;
use crate::asset_class::AssetClass;
use crate::config::ScoringConfig;
use crate::error::InputError;
use crate::simulation::SimulationResult;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Return and drawdown of one portfolio under one scenario
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub expected_return: f64,
    pub max_drawdown: f64, // Positive fraction, 0.35 = 35% peak-to-trough
}

impl ScenarioOutcome {
    /// Weighted analog return and drawdown for asset-class weights (normalized here)
    pub fn from_analog(analog: &HistoricalAnalog, weights: &BTreeMap<AssetClass, f64>) -> Self {
        let total: f64 = weights.values().sum();
        if total <= 0.0 {
            return Self {
                expected_return: 0.0,
                max_drawdown: 0.0,
            };
        }

        let (expected_return, max_drawdown) =
            weights
                .iter()
                .fold((0.0, 0.0), |(ret, dd), (class, weight)| {
                    let w = weight / total;
                    (
                        ret + w * analog.asset_return(*class),
                        dd + w * analog.max_drawdown(*class),
                    )
                });

        Self {
            expected_return,
            max_drawdown,
        }
    }

    /// Median as the return, the downside tail as the drawdown proxy
    pub fn from_simulation(result: &SimulationResult) -> Self {
        Self {
            expected_return: result.median,
            max_drawdown: (-result.downside).max(0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreLabel {
    Outperforms,
    ModestEdge,
    InLine,
    Lags,
    Underperforms,
}

impl ScoreLabel {
    pub fn from_score(score: f64) -> Self {
        if score >= 70.0 {
            ScoreLabel::Outperforms
        } else if score >= 55.0 {
            ScoreLabel::ModestEdge
        } else if score >= 45.0 {
            ScoreLabel::InLine
        } else if score >= 30.0 {
            ScoreLabel::Lags
        } else {
            ScoreLabel::Underperforms
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ScoreLabel::Outperforms => "outperforms the benchmark",
            ScoreLabel::ModestEdge => "modest edge over the benchmark",
            ScoreLabel::InLine => "in line with the benchmark",
            ScoreLabel::Lags => "lags the benchmark",
            ScoreLabel::Underperforms => "underperforms the benchmark",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioScore {
    pub scenario_id: String,
    pub score: f64, // 0-100, 50 = same as benchmark
    pub label: ScoreLabel,
    pub return_score: f64,
    pub drawdown_score: f64,
    pub portfolio: ScenarioOutcome,
    pub benchmark: ScenarioOutcome,
}

/// Compares a portfolio to the benchmark under a scenario on a 0-100 scale.
///
/// Better return and shallower drawdown can only raise the score.
#[derive(Debug, Clone)]
pub struct ScenarioScorer {
    config: ScoringConfig,
}

impl ScenarioScorer {
    pub fn new(config: ScoringConfig) -> Result<Self, InputError> {
        if config.return_weight < 0.0
            || config.drawdown_weight < 0.0
            || config.return_weight + config.drawdown_weight <= 0.0
        {
            return Err(InputError::InvalidConfig(
                "scoring weights must be non-negative and not both zero".to_string(),
            ));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Benchmark weights by asset class, normalized
    pub fn benchmark_weights(&self) -> BTreeMap<AssetClass, f64> {
        let total: f64 = self.config.benchmark.iter().map(|h| h.weight).sum();
        let mut weights = BTreeMap::new();
        for holding in &self.config.benchmark {
            let w = if total > 0.0 { holding.weight / total } else { 0.0 };
            *weights.entry(holding.asset_class).or_insert(0.0) += w;
        }
        weights
    }

    pub fn score(
        &self,
        scenario_id: &str,
        portfolio: &ScenarioOutcome,
        benchmark: &ScenarioOutcome,
    ) -> ScenarioScore {
        let return_score = clamp_score(
            50.0 + (portfolio.expected_return - benchmark.expected_return)
                * self.config.return_sensitivity,
        );
        let drawdown_score = clamp_score(
            50.0 + (benchmark.max_drawdown - portfolio.max_drawdown)
                * self.config.drawdown_sensitivity,
        );

        let (wr, wd) = (self.config.return_weight, self.config.drawdown_weight);
        let score = (wr * return_score + wd * drawdown_score) / (wr + wd);
        let label = ScoreLabel::from_score(score);

        debug!(
            "Scenario {} score {:.1} ({:?}): return {:.1}, drawdown {:.1}",
            scenario_id, score, label, return_score, drawdown_score
        );

        ScenarioScore {
            scenario_id: scenario_id.to_string(),
            score,
            label,
            return_score,
            drawdown_score,
            portfolio: *portfolio,
            benchmark: *benchmark,
        }
    }
}

impl Default for ScenarioScorer {
    fn default() -> Self {
        Self {
            config: ScoringConfig::default(),
        }
    }
}

// NaN differences score as neutral
fn clamp_score(raw: f64) -> f64 {
    if raw.is_nan() {
        50.0
    } else {
        raw.clamp(0.0, 100.0)
    }
}
