use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Chronological daily closes for one instrument
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSeries {
    pub ticker: String,
    pub prices: Vec<(DateTime<Utc>, f64)>,
}

impl PriceSeries {
    pub fn new(ticker: &str, mut prices: Vec<(DateTime<Utc>, f64)>) -> Self {
        // Keep prices sorted by time
        prices.sort_by_key(|(dt, _)| *dt);
        Self {
            ticker: ticker.to_string(),
            prices,
        }
    }

    /// Build a series from closes only, one per day ending today
    pub fn from_closes(ticker: &str, closes: &[f64]) -> Self {
        let now = Utc::now();
        let n = closes.len() as i64;
        let prices = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| (now - chrono::Duration::days(n - 1 - i as i64), close))
            .collect();
        Self::new(ticker, prices)
    }

    pub fn closes(&self) -> Vec<f64> {
        self.prices.iter().map(|(_, p)| *p).collect()
    }

    pub fn last_price(&self) -> Option<f64> {
        self.prices.last().map(|(_, p)| *p)
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Keep only the most recent `lookback` observations
    pub fn truncated(mut self, lookback: usize) -> Self {
        if self.prices.len() > lookback {
            let excess = self.prices.len() - lookback;
            self.prices.drain(0..excess);
        }
        self
    }
}

/// Historical price collaborator. Implemented outside the engine in production.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch(&self, ticker: &str, lookback_days: usize) -> Result<PriceSeries>;
}

/// Price source backed by series held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryPriceSource {
    series: HashMap<String, PriceSeries>,
}

impl InMemoryPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, series: PriceSeries) -> Self {
        self.insert(series);
        self
    }

    pub fn insert(&mut self, series: PriceSeries) {
        self.series.insert(series.ticker.to_ascii_uppercase(), series);
    }
}

#[async_trait]
impl PriceSource for InMemoryPriceSource {
    async fn fetch(&self, ticker: &str, lookback_days: usize) -> Result<PriceSeries> {
        self.series
            .get(&ticker.to_ascii_uppercase())
            .cloned()
            .map(|s| s.truncated(lookback_days))
            .ok_or_else(|| anyhow!("no price history for {}", ticker))
    }
}

#[derive(Debug, Deserialize)]
struct PriceFile {
    #[serde(default)]
    ticker: Option<String>,
    prices: Vec<PriceFileRow>,
}

#[derive(Debug, Deserialize)]
struct PriceFileRow {
    date: DateTime<Utc>,
    close: f64,
}

/// Reads `<dir>/<TICKER>.json` files of the form
/// `{"ticker": "AAPL", "prices": [{"date": "2024-01-02T00:00:00Z", "close": 185.6}, ...]}`
#[derive(Debug, Clone)]
pub struct JsonDirPriceSource {
    dir: PathBuf,
}

impl JsonDirPriceSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        info!("Reading price history from {}", dir.display());
        Self { dir }
    }

    fn path_for(&self, ticker: &str) -> PathBuf {
        self.dir.join(format!("{}.json", ticker.to_ascii_uppercase()))
    }
}

#[async_trait]
impl PriceSource for JsonDirPriceSource {
    async fn fetch(&self, ticker: &str, lookback_days: usize) -> Result<PriceSeries> {
        let path = self.path_for(ticker);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let file: PriceFile = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", path.display()))?;

        if let Some(file_ticker) = &file.ticker {
            if !file_ticker.eq_ignore_ascii_case(ticker) {
                return Err(anyhow!(
                    "{} holds prices for {}, expected {}",
                    path.display(),
                    file_ticker,
                    ticker
                ));
            }
        }

        let prices = file.prices.into_iter().map(|row| (row.date, row.close)).collect();
        let series = PriceSeries::new(ticker, prices).truncated(lookback_days);
        debug!("Loaded {} prices for {}", series.len(), ticker);
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_sorted_and_truncated() {
        let now = Utc::now();
        let series = PriceSeries::new(
            "TEST",
            vec![
                (now, 103.0),
                (now - chrono::Duration::days(2), 101.0),
                (now - chrono::Duration::days(1), 102.0),
            ],
        );
        assert_eq!(series.closes(), vec![101.0, 102.0, 103.0]);
        assert_eq!(series.last_price(), Some(103.0));

        let short = series.truncated(2);
        assert_eq!(short.closes(), vec![102.0, 103.0]);
    }

    #[tokio::test]
    async fn test_in_memory_source_is_case_insensitive() {
        let source = InMemoryPriceSource::new()
            .with_series(PriceSeries::from_closes("aapl", &[1.0, 2.0, 3.0]));
        let series = source.fetch("AAPL", 2).await.unwrap();
        assert_eq!(series.closes(), vec![2.0, 3.0]);
        assert!(source.fetch("MSFT", 10).await.is_err());
    }

    #[tokio::test]
    async fn test_json_dir_source_reads_price_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let body = r#"{"ticker": "VTI", "prices": [
            {"date": "2024-01-03T00:00:00Z", "close": 221.0},
            {"date": "2024-01-02T00:00:00Z", "close": 220.0}
        ]}"#;
        std::fs::write(dir.path().join("VTI.json"), body)?;

        let source = JsonDirPriceSource::new(dir.path());
        let series = source.fetch("vti", 252).await?;
        assert_eq!(series.closes(), vec![220.0, 221.0]);
        assert!(source.fetch("BND", 252).await.is_err());
        Ok(())
    }
}
