use anyhow::Result;
use cycle_projection::AssetClass;
use cycle_projection::config::{BenchmarkHolding, ScoringConfig};
use cycle_projection::scenarios::{AnalogCatalog, ScenarioOutcome, ScenarioScorer, ScoreLabel};
use proptest::prelude::*;
use std::collections::BTreeMap;

#[cfg(test)]
mod scenario_tests {
    use super::*;

    fn outcome(expected_return: f64, max_drawdown: f64) -> ScenarioOutcome {
        ScenarioOutcome {
            expected_return,
            max_drawdown,
        }
    }

    #[test]
    fn test_free_text_queries_resolve() -> Result<()> {
        let cases = [
            ("what if 2008 happens again", "global-financial-crisis"),
            ("Lehman", "global-financial-crisis"),
            ("another pandemic", "covid-crash"),
            ("the 1970s oil embargo", "stagflation-1970s"),
            ("repeat of the tech bubble", "dotcom-bust"),
            ("1929", "great-depression"),
            ("Volcker era tightening", "volcker-1980"),
        ];
        for (query, expected) in cases {
            let analog = AnalogCatalog::resolve(query)?;
            assert_eq!(analog.id, expected, "query '{}'", query);
        }
        Ok(())
    }

    #[test]
    fn test_custom_benchmark() -> Result<()> {
        let config = ScoringConfig {
            benchmark: vec![
                BenchmarkHolding {
                    asset_class: AssetClass::Stocks,
                    weight: 80.0,
                },
                BenchmarkHolding {
                    asset_class: AssetClass::Cash,
                    weight: 20.0,
                },
            ],
            ..ScoringConfig::default()
        };
        let scorer = ScenarioScorer::new(config)?;
        let weights = scorer.benchmark_weights();
        assert!((weights[&AssetClass::Stocks] - 0.8).abs() < 1e-12);
        assert!((weights[&AssetClass::Cash] - 0.2).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_inflation_2022_punishes_bond_heavy_portfolio() -> Result<()> {
        let analog = AnalogCatalog::resolve("inflation-2022")?;
        let scorer = ScenarioScorer::default();
        let benchmark = ScenarioOutcome::from_analog(analog, &scorer.benchmark_weights());

        let commodities = BTreeMap::from([(AssetClass::Commodities, 0.5), (AssetClass::Cash, 0.5)]);
        let long_bonds = BTreeMap::from([(AssetClass::Bonds, 1.0)]);

        let hedged = scorer.score(
            analog.id,
            &ScenarioOutcome::from_analog(analog, &commodities),
            &benchmark,
        );
        let bonds = scorer.score(
            analog.id,
            &ScenarioOutcome::from_analog(analog, &long_bonds),
            &benchmark,
        );
        assert_eq!(hedged.label, ScoreLabel::Outperforms);
        assert!(hedged.score > bonds.score);
        Ok(())
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let scorer = ScenarioScorer::default();
        let a = scorer.score("x", &outcome(-0.05, 0.2), &outcome(-0.08, 0.3));
        let b = scorer.score("x", &outcome(-0.05, 0.2), &outcome(-0.08, 0.3));
        assert_eq!(a, b);
    }

    proptest! {
        #[test]
        fn prop_dominating_portfolio_scores_at_least_as_high(
            ret_b in -0.6f64..0.6,
            dd_b in 0.0f64..0.9,
            ret_gain in 0.0f64..0.3,
            dd_gain in 0.0f64..0.3,
            bench_ret in -0.6f64..0.6,
            bench_dd in 0.0f64..0.9,
        ) {
            let scorer = ScenarioScorer::default();
            let benchmark = outcome(bench_ret, bench_dd);
            let b = outcome(ret_b, dd_b);
            let a = outcome(ret_b + ret_gain, (dd_b - dd_gain).max(0.0));

            let score_a = scorer.score("s", &a, &benchmark);
            let score_b = scorer.score("s", &b, &benchmark);
            prop_assert!(
                score_a.score >= score_b.score,
                "dominating portfolio scored {} < {}",
                score_a.score,
                score_b.score
            );
        }
    }
}
