use std::collections::HashMap;

use signal_core::{EngineConfig, Rejection, RejectionStage, Setup};

/// Deterministic ranking plus the two assembly-order adjustments: the
/// per-sector cap and the minimum-position floor. Sorting ends on the
/// ticker, so the output is reproducible whatever order candidates
/// arrive in.
pub fn rank_and_assemble(
    mut candidates: Vec<Setup>,
    config: &EngineConfig,
) -> (Vec<Setup>, Vec<Rejection>) {
    candidates.sort_by(|a, b| {
        b.tier
            .rank()
            .cmp(&a.tier.rank())
            .then_with(|| b.robust_score.total_cmp(&a.robust_score))
            .then_with(|| b.expected_value.total_cmp(&a.expected_value))
            .then_with(|| a.ticker.cmp(&b.ticker))
    });

    let mut setups = Vec::new();
    let mut rejections = Vec::new();
    let mut sector_used: HashMap<String, f64> = HashMap::new();

    for mut setup in candidates {
        if setups.len() >= config.top_n {
            rejections.push(Rejection::new(
                &setup.ticker,
                RejectionStage::Ranking,
                "ranked_below_top_n",
                format!("top {} already filled", config.top_n),
            ));
            continue;
        }

        // 5. Sector cap: overflow is truncated, never rescaled across
        // the remaining candidates.
        let used = sector_used.get(&setup.sector).copied().unwrap_or(0.0);
        let remaining = (config.sector_cap - used).max(0.0);
        if setup.position_pct > remaining {
            setup
                .notes
                .push(format!("sector cap truncated allocation to {remaining:.4}"));
            setup.position_pct = remaining;
            setup.position_currency = remaining * config.portfolio_currency_amount;
        }

        // 6. Minimum position floor
        if setup.position_currency < config.min_position_currency {
            rejections.push(Rejection::new(
                &setup.ticker,
                RejectionStage::MinPosition,
                "below_min_position",
                format!(
                    "{:.0} below the {:.0} minimum",
                    setup.position_currency, config.min_position_currency
                ),
            ));
            continue;
        }

        *sector_used.entry(setup.sector.clone()).or_insert(0.0) += setup.position_pct;
        setups.push(setup);
    }

    (setups, rejections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use signal_core::Tier;

    fn setup(ticker: &str, tier: Tier, robust: f64, ev: f64, position_pct: f64) -> Setup {
        Setup {
            ticker: ticker.into(),
            pattern_name: "double_bottom".into(),
            tier,
            score: 70.0,
            horizon_edges: vec![],
            win_rate: 0.65,
            win_rate_ci_lower: 0.55,
            win_rate_ci_upper: 0.74,
            expected_value: ev,
            net_edge: ev - 0.002,
            risk_reward: 4.0,
            robust_score: robust,
            confidence_score: 75.0,
            sample_size: 100,
            stop_loss_pct: 0.03,
            position_pct,
            position_currency: position_pct * 250_000.0,
            sector: "Industrials".into(),
            notes: vec![],
        }
    }

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    #[test]
    fn tier_dominates_robust_score() {
        let (setups, _) = rank_and_assemble(
            vec![
                setup("LOW.ST", Tier::Secondary, 95.0, 0.10, 0.02),
                setup("HIGH.ST", Tier::Core, 60.0, 0.02, 0.02),
            ],
            &config(),
        );
        assert_eq!(setups[0].ticker, "HIGH.ST");
    }

    #[test]
    fn ticker_breaks_exact_ties() {
        let (setups, _) = rank_and_assemble(
            vec![
                setup("BBB.ST", Tier::Core, 70.0, 0.05, 0.02),
                setup("AAA.ST", Tier::Core, 70.0, 0.05, 0.02),
            ],
            &config(),
        );
        assert_eq!(setups[0].ticker, "AAA.ST");
        assert_eq!(setups[1].ticker, "BBB.ST");
    }

    #[test]
    fn overflow_beyond_top_n_is_materialized() {
        let candidates: Vec<Setup> = (0..8)
            .map(|i| setup(&format!("T{i}.ST"), Tier::Core, 70.0 - i as f64, 0.05, 0.02))
            .collect();
        let (setups, rejections) = rank_and_assemble(candidates, &config());

        assert_eq!(setups.len(), 5);
        assert_eq!(rejections.len(), 3);
        assert!(rejections
            .iter()
            .all(|r| r.reason_code == "ranked_below_top_n"));
    }

    #[test]
    fn sector_cap_truncates_in_rank_order() {
        let mut cfg = config();
        cfg.sector_cap = 0.05;
        // Three 2% positions in one sector: 2% + 2% + truncated 1%
        let candidates: Vec<Setup> = (0..3)
            .map(|i| setup(&format!("S{i}.ST"), Tier::Core, 70.0 - i as f64, 0.05, 0.02))
            .collect();
        let (setups, rejections) = rank_and_assemble(candidates, &cfg);

        assert_eq!(setups.len(), 3);
        assert!((setups[2].position_pct - 0.01).abs() < 1e-9);
        assert!(rejections.is_empty());

        let sector_total: f64 = setups.iter().map(|s| s.position_pct).sum();
        assert!(sector_total <= cfg.sector_cap + 1e-9);
    }

    #[test]
    fn exhausted_sector_falls_to_the_floor() {
        let mut cfg = config();
        cfg.sector_cap = 0.04;
        let candidates: Vec<Setup> = (0..3)
            .map(|i| setup(&format!("S{i}.ST"), Tier::Core, 70.0 - i as f64, 0.05, 0.02))
            .collect();
        let (setups, rejections) = rank_and_assemble(candidates, &cfg);

        // Third candidate truncates to zero and fails the floor
        assert_eq!(setups.len(), 2);
        assert_eq!(rejections.len(), 1);
        assert_eq!(rejections[0].stage, RejectionStage::MinPosition);
        assert_eq!(rejections[0].reason_code, "below_min_position");
    }

    #[test]
    fn tiny_positions_are_floored_out() {
        // 0.4% of 250k = 1000, under the 1500 minimum
        let (setups, rejections) =
            rank_and_assemble(vec![setup("TINY.ST", Tier::Core, 70.0, 0.05, 0.004)], &config());

        assert!(setups.is_empty());
        assert_eq!(rejections[0].reason_code, "below_min_position");
    }

    #[test]
    fn output_is_independent_of_input_order() {
        let a = vec![
            setup("AAA.ST", Tier::Core, 70.0, 0.05, 0.02),
            setup("BBB.ST", Tier::Primary, 80.0, 0.06, 0.02),
            setup("CCC.ST", Tier::Core, 65.0, 0.04, 0.02),
        ];
        let mut b = a.clone();
        b.reverse();

        let (setups_a, _) = rank_and_assemble(a, &config());
        let (setups_b, _) = rank_and_assemble(b, &config());

        let tickers_a: Vec<&str> = setups_a.iter().map(|s| s.ticker.as_str()).collect();
        let tickers_b: Vec<&str> = setups_b.iter().map(|s| s.ticker.as_str()).collect();
        assert_eq!(tickers_a, tickers_b);
    }
}
