use statrs::statistics::{Data, OrderStatistics, Statistics};

/// Lowest growth factor accepted when annualizing; a -100% (or worse) total return
/// would otherwise need the root of a non-positive base.
pub const MIN_GROWTH_FACTOR: f64 = 1e-6;

/// Convert a total return over `years` into an equivalent annual return.
///
/// `(1 + total)^(1/years) - 1`, with the growth factor clamped at `MIN_GROWTH_FACTOR`.
/// A one-year horizon returns `total` unchanged.
pub fn annualize_return(total_return: f64, years: f64) -> f64 {
    if years == 1.0 {
        return total_return;
    }
    let growth = (1.0 + total_return).max(MIN_GROWTH_FACTOR);
    growth.powf(1.0 / years) - 1.0
}

/// Compound an annual return over `years`
pub fn compound_return(annual_return: f64, years: f64) -> f64 {
    (1.0 + annual_return).max(MIN_GROWTH_FACTOR).powf(years) - 1.0
}

/// Daily log returns from a chronological price series
pub fn log_returns(prices: &[f64]) -> Vec<f64> {
    prices.windows(2).map(|w| (w[1] / w[0]).ln()).collect()
}

/// Annualized sample standard deviation of periodic returns
pub fn annualized_volatility(returns: &[f64], periods_per_year: f64) -> Option<f64> {
    if returns.len() < 2 {
        return None;
    }
    let std_dev = returns.std_dev();
    if std_dev.is_finite() {
        Some(std_dev * periods_per_year.sqrt())
    } else {
        None
    }
}

/// EWMA annualized volatility, seeded with the first squared return
pub fn ewma_volatility(returns: &[f64], half_life: f64, periods_per_year: f64) -> Option<f64> {
    let first = returns.first()?;
    let lambda = (-1.0 / half_life).exp();

    let mut variance = first * first;
    for r in &returns[1..] {
        // new_variance = lambda * old_variance + (1 - lambda) * r^2
        variance = lambda * variance + (1.0 - lambda) * r * r;
    }

    let vol = (variance * periods_per_year).sqrt();
    vol.is_finite().then_some(vol)
}

/// Tail and centre of a sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentileSummary {
    pub p5: f64,
    pub median: f64,
    pub p95: f64,
}

pub fn percentile_summary(values: Vec<f64>) -> Option<PercentileSummary> {
    if values.is_empty() || values.iter().any(|v| v.is_nan()) {
        return None;
    }
    let mut data = Data::new(values);
    Some(PercentileSummary {
        p5: data.percentile(5),
        median: data.median(),
        p95: data.percentile(95),
    })
}

pub fn median(values: Vec<f64>) -> Option<f64> {
    if values.is_empty() || values.iter().any(|v| v.is_nan()) {
        return None;
    }
    Some(Data::new(values).median())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annualize_single_year_is_identity() {
        assert_eq!(annualize_return(-0.22, 1.0), -0.22);
        assert_eq!(annualize_return(0.137, 1.0), 0.137);
    }

    #[test]
    fn test_annualize_compound_round_trip() {
        let total = 0.6105; // 10% a year for 5 years
        let annual = annualize_return(total, 5.0);
        assert!((annual - 0.10).abs() < 1e-4);
        assert!((compound_return(annual, 5.0) - total).abs() < 1e-12);
    }

    #[test]
    fn test_annualize_clamps_total_loss() {
        let annual = annualize_return(-1.5, 3.0);
        assert!(annual.is_finite());
        assert!(annual > -1.0);
        assert!((annual - (MIN_GROWTH_FACTOR.powf(1.0 / 3.0) - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_log_returns() {
        let returns = log_returns(&[100.0, 110.0, 99.0]);
        assert_eq!(returns.len(), 2);
        assert!((returns[0] - (1.1f64).ln()).abs() < 1e-12);
        assert!((returns[1] - (0.9f64).ln()).abs() < 1e-12);
    }

    #[test]
    fn test_volatility_estimators() {
        let returns = vec![0.01, -0.02, 0.015, -0.005, 0.02, -0.01];
        let sample = annualized_volatility(&returns, 252.0).unwrap();
        let ewma = ewma_volatility(&returns, 32.0, 252.0).unwrap();
        assert!(sample > 0.0);
        assert!(ewma > 0.0);
        assert!(annualized_volatility(&[0.01], 252.0).is_none());
        assert!(ewma_volatility(&[], 32.0, 252.0).is_none());
    }

    #[test]
    fn test_percentile_summary_ordering() {
        let values: Vec<f64> = (0..=100).map(|i| i as f64 / 100.0).collect();
        let summary = percentile_summary(values).unwrap();
        assert!(summary.p5 < summary.median);
        assert!(summary.median < summary.p95);
        assert!((summary.median - 0.5).abs() < 1e-9);
        assert!(percentile_summary(vec![]).is_none());
        assert!(percentile_summary(vec![0.1, f64::NAN]).is_none());
    }
}
