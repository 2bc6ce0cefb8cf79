use crate::error::DataGap;
use crate::market_data::PriceSeries;
use crate::stats;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// How an instrument's historical volatility is estimated from daily closes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum VolatilityEstimator {
    /// Annualized sample standard deviation of log returns
    Sample,
    /// Exponentially weighted moving average (half-life in trading days, typically 32-64)
    Ewma { half_life: f64 },
}

impl Default for VolatilityEstimator {
    fn default() -> Self {
        VolatilityEstimator::Sample
    }
}

impl VolatilityEstimator {
    /// Annualized volatility of a price series.
    ///
    /// Fails with `InsufficientHistory` when fewer than `min_samples` returns are available,
    /// with `NonPositivePrice` if any close is zero or negative, and with `NoVolatility` when
    /// the closes never move. Supply the volatility on the position for instruments whose
    /// price is pinned.
    pub fn estimate(
        &self,
        series: &PriceSeries,
        min_samples: usize,
        periods_per_year: f64,
    ) -> Result<f64, DataGap> {
        let closes = series.closes();
        if closes.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(DataGap::NonPositivePrice);
        }

        let returns = stats::log_returns(&closes);
        if returns.len() < min_samples.max(2) {
            return Err(DataGap::InsufficientHistory {
                found: returns.len(),
                required: min_samples.max(2),
            });
        }

        let estimate = match self {
            VolatilityEstimator::Sample => stats::annualized_volatility(&returns, periods_per_year),
            VolatilityEstimator::Ewma { half_life } => {
                stats::ewma_volatility(&returns, *half_life, periods_per_year)
            }
        };

        let vol = match estimate {
            Some(vol) if vol > 0.0 => vol,
            _ => return Err(DataGap::NoVolatility),
        };
        debug!(
            "Volatility estimate for {}: {:.4} from {} returns",
            series.ticker,
            vol,
            returns.len()
        );
        Ok(vol)
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedVolatility {
    value: f64,
    stored_at: Instant,
}

/// Per-ticker volatility estimates with a time-to-live (a day by default)
#[derive(Debug)]
pub struct VolatilityCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedVolatility>>,
}

impl VolatilityCache {
    pub fn new(ttl: Duration) -> Self {
        info!("Initializing volatility cache with ttl {}s", ttl.as_secs());
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, ticker: &str) -> Option<f64> {
        let entries = self.entries.read().await;
        entries
            .get(&ticker.to_ascii_uppercase())
            .filter(|cached| cached.stored_at.elapsed() < self.ttl)
            .map(|cached| cached.value)
    }

    /// Store an estimate, dropping any that have expired
    pub async fn insert(&self, ticker: &str, value: f64) {
        let mut entries = self.entries.write().await;
        let evicted = Self::retain_live(&mut entries, self.ttl);
        if evicted > 0 {
            debug!("Evicted {} expired volatility estimates", evicted);
        }
        entries.insert(
            ticker.to_ascii_uppercase(),
            CachedVolatility {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop expired estimates
    pub async fn evict_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        Self::retain_live(&mut entries, self.ttl)
    }

    fn retain_live(entries: &mut HashMap<String, CachedVolatility>, ttl: Duration) -> usize {
        let before = entries.len();
        entries.retain(|_, cached| cached.stored_at.elapsed() < ttl);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zigzag(n: usize) -> PriceSeries {
        let closes: Vec<f64> = (0..n)
            .map(|i| if i % 2 == 0 { 100.0 } else { 101.0 })
            .collect();
        PriceSeries::from_closes("ZIG", &closes)
    }

    #[test]
    fn test_sample_estimate() {
        let vol = VolatilityEstimator::Sample
            .estimate(&zigzag(61), 30, 252.0)
            .unwrap();
        // alternating +/- ln(1.01) returns, std dev close to ln(1.01)
        let expected = (1.01f64).ln() * 252f64.sqrt();
        assert!((vol - expected).abs() / expected < 0.02, "vol {}", vol);
    }

    #[test]
    fn test_ewma_estimate_positive() {
        let vol = VolatilityEstimator::Ewma { half_life: 32.0 }
            .estimate(&zigzag(61), 30, 252.0)
            .unwrap();
        assert!(vol > 0.0);
    }

    #[test]
    fn test_insufficient_history() {
        let err = VolatilityEstimator::Sample
            .estimate(&zigzag(10), 30, 252.0)
            .unwrap_err();
        assert_eq!(
            err,
            DataGap::InsufficientHistory {
                found: 9,
                required: 30
            }
        );
    }

    #[test]
    fn test_non_positive_price_rejected() {
        let series = PriceSeries::from_closes("BAD", &[10.0, 0.0, 11.0]);
        assert_eq!(
            VolatilityEstimator::Sample.estimate(&series, 1, 252.0),
            Err(DataGap::NonPositivePrice)
        );
    }

    #[tokio::test]
    async fn test_cache_ttl() {
        let cache = VolatilityCache::new(Duration::from_secs(86_400));
        cache.insert("aapl", 0.25).await;
        assert_eq!(cache.get("AAPL").await, Some(0.25));

        let expired = VolatilityCache::new(Duration::ZERO);
        expired.insert("AAPL", 0.25).await;
        assert_eq!(expired.get("AAPL").await, None);
        assert_eq!(expired.evict_expired().await, 1);
        assert_eq!(expired.len().await, 0);
    }

    #[tokio::test]
    async fn test_insert_drops_expired_estimates() {
        let cache = VolatilityCache::new(Duration::ZERO);
        for ticker in ["AAPL", "MSFT", "VTI"] {
            cache.insert(ticker, 0.2).await;
        }
        // only the estimate just written survives
        assert_eq!(cache.len().await, 1);
    }

    #[test]
    fn test_flat_history_has_no_volatility() {
        let flat = PriceSeries::from_closes("STALE", &[42.0; 60]);
        for estimator in [
            VolatilityEstimator::Sample,
            VolatilityEstimator::Ewma { half_life: 32.0 },
        ] {
            assert_eq!(
                estimator.estimate(&flat, 30, 252.0),
                Err(DataGap::NoVolatility)
            );
        }
    }
}
