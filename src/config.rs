use crate::asset_class::AssetClass;
use crate::cycles::CycleWeights;
use crate::error::InputError;
use crate::portfolio::MissingDataPolicy;
use crate::volatility::VolatilityEstimator;
use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub cycle_weights: CycleWeights,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub data: DataConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_trials")]
    pub trials: usize,
    /// Base seed; per-ticker seeds are derived from it. `None` draws from entropy.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_trading_days_per_year")]
    pub trading_days_per_year: u32,
    #[serde(default = "default_min_history_samples")]
    pub min_history_samples: usize,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: usize,
    #[serde(default)]
    pub volatility_estimator: VolatilityEstimator,
    #[serde(default = "default_volatility_ttl_secs")]
    pub volatility_ttl_secs: u64,
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_weight_tolerance")]
    pub weight_tolerance: f64,
    #[serde(default)]
    pub missing_data_policy: MissingDataPolicy,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            trials: default_trials(),
            seed: None,
            trading_days_per_year: default_trading_days_per_year(),
            min_history_samples: default_min_history_samples(),
            lookback_days: default_lookback_days(),
            volatility_estimator: VolatilityEstimator::default(),
            volatility_ttl_secs: default_volatility_ttl_secs(),
            batch_concurrency: default_batch_concurrency(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            weight_tolerance: default_weight_tolerance(),
            missing_data_policy: MissingDataPolicy::default(),
        }
    }
}

impl SimulationConfig {
    pub fn volatility_ttl(&self) -> Duration {
        Duration::from_secs(self.volatility_ttl_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

fn default_trials() -> usize {
    5_000
}

fn default_trading_days_per_year() -> u32 {
    252
}

fn default_min_history_samples() -> usize {
    30 // Minimum daily returns for a usable volatility estimate
}

fn default_lookback_days() -> usize {
    252 // One year of trading days
}

fn default_volatility_ttl_secs() -> u64 {
    86_400 // Volatility estimates are refreshed daily
}

fn default_batch_concurrency() -> usize {
    5 // Keep fan-out friendly to rate-limited price sources
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_weight_tolerance() -> f64 {
    0.01
}

/// Reference portfolio holding used for comparative scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkHolding {
    pub asset_class: AssetClass,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_return_weight")]
    pub return_weight: f64,
    #[serde(default = "default_drawdown_weight")]
    pub drawdown_weight: f64,
    /// Score points per unit of return outperformance (250 => 2.5 points per 1%)
    #[serde(default = "default_return_sensitivity")]
    pub return_sensitivity: f64,
    #[serde(default = "default_drawdown_sensitivity")]
    pub drawdown_sensitivity: f64,
    #[serde(default = "default_benchmark")]
    pub benchmark: Vec<BenchmarkHolding>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            return_weight: default_return_weight(),
            drawdown_weight: default_drawdown_weight(),
            return_sensitivity: default_return_sensitivity(),
            drawdown_sensitivity: default_drawdown_sensitivity(),
            benchmark: default_benchmark(),
        }
    }
}

fn default_return_weight() -> f64 {
    0.6
}

fn default_drawdown_weight() -> f64 {
    0.4
}

fn default_return_sensitivity() -> f64 {
    250.0
}

fn default_drawdown_sensitivity() -> f64 {
    200.0
}

fn default_benchmark() -> Vec<BenchmarkHolding> {
    // Classic 60/40
    vec![
        BenchmarkHolding {
            asset_class: AssetClass::Stocks,
            weight: 0.6,
        },
        BenchmarkHolding {
            asset_class: AssetClass::Bonds,
            weight: 0.4,
        },
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Bump when formulas or parameter tables change; older entries stop being served
    #[serde(default = "default_model_version")]
    pub model_version: u32,
    /// Durable store location; in-memory when unset
    #[serde(default)]
    pub sqlite_path: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            model_version: default_model_version(),
            sqlite_path: None,
        }
    }
}

fn default_model_version() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_price_dir")]
    pub price_dir: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            price_dir: default_price_dir(),
        }
    }
}

fn default_price_dir() -> String {
    "data/prices".to_string()
}

impl EngineConfig {
    pub fn load() -> Result<Self> {
        Self::load_from_file("config.json")
    }

    /// Load configuration, falling back to defaults when the file does not exist
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: EngineConfig = if path.exists() {
            let config_str = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&config_str)
                .with_context(|| format!("parsing config {}", path.display()))?
        } else {
            warn!("Config file {} not found, using defaults", path.display());
            EngineConfig::default()
        };

        config.validate()?;
        info!(
            "Loaded engine config: {} trials, model version {}",
            config.simulation.trials, config.cache.model_version
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), InputError> {
        let sim = &self.simulation;
        if sim.trials < 100 {
            return Err(InputError::InvalidConfig(format!(
                "trials must be at least 100, got {}",
                sim.trials
            )));
        }
        if sim.trading_days_per_year == 0 {
            return Err(InputError::InvalidConfig(
                "trading_days_per_year must be positive".to_string(),
            ));
        }
        if sim.batch_concurrency == 0 {
            return Err(InputError::InvalidConfig(
                "batch_concurrency must be positive".to_string(),
            ));
        }
        if !(sim.weight_tolerance >= 0.0 && sim.weight_tolerance < 1.0) {
            return Err(InputError::InvalidConfig(format!(
                "weight_tolerance must be in [0, 1), got {}",
                sim.weight_tolerance
            )));
        }
        if let VolatilityEstimator::Ewma { half_life } = sim.volatility_estimator {
            if !(half_life > 0.0) {
                return Err(InputError::InvalidConfig(
                    "EWMA half-life must be positive".to_string(),
                ));
            }
        }

        self.cycle_weights.validate()?;

        let scoring = &self.scoring;
        if scoring.return_weight < 0.0
            || scoring.drawdown_weight < 0.0
            || scoring.return_weight + scoring.drawdown_weight <= 0.0
        {
            return Err(InputError::InvalidConfig(
                "scoring weights must be non-negative and not both zero".to_string(),
            ));
        }
        if scoring.return_sensitivity < 0.0 || scoring.drawdown_sensitivity < 0.0 {
            return Err(InputError::InvalidConfig(
                "scoring sensitivities must be non-negative".to_string(),
            ));
        }
        if scoring.benchmark.is_empty() || scoring.benchmark.iter().any(|h| h.weight < 0.0) {
            return Err(InputError::InvalidConfig(
                "benchmark needs at least one holding with non-negative weight".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
