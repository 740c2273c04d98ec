use signal_core::{OutcomeStatistics, RobustStatistics};
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Sample-size discount: 0.20 below 5 observations, ramping linearly to
/// 0.60 at 15, to 1.00 at 30, flat above.
pub fn sample_size_factor(n: usize) -> f64 {
    let nf = n as f64;
    if n < 5 {
        0.20
    } else if n < 15 {
        0.20 + (nf - 5.0) / 10.0 * 0.40
    } else if n < 30 {
        0.60 + (nf - 15.0) / 15.0 * 0.40
    } else {
        1.0
    }
}

/// One-sample t-test of the mean against zero, one-sided (the question is
/// always "is this edge positive", never "is it merely different").
/// Returns (t, p); degenerate samples get t = 0, p = 1.
fn t_test_vs_zero(mean: f64, std: f64, n: usize) -> (f64, f64) {
    if n < 2 || std <= 0.0 {
        return (0.0, 1.0);
    }
    let t = mean / (std / (n as f64).sqrt());
    let p = match StudentsT::new(0.0, 1.0, (n - 1) as f64) {
        Ok(dist) => 1.0 - dist.cdf(t),
        Err(_) => 1.0,
    };
    (t, p.clamp(0.0, 1.0))
}

/// Robustness adjustments on the evaluation horizon's sample.
///
/// `stats` must be the OutcomeStatistics computed from `returns`.
pub fn robust_statistics(stats: &OutcomeStatistics, returns: &[f64]) -> RobustStatistics {
    let n = returns.len();
    if n == 0 {
        return RobustStatistics {
            sample_size: 0,
            raw_win_rate: 0.0,
            adjusted_win_rate: 0.5,
            sample_size_factor: sample_size_factor(0),
            return_consistency: 0.0,
            t_statistic: 0.0,
            p_value: 1.0,
            is_significant: false,
            pessimistic_ev: 0.0,
            confidence_score: 0.0,
            robust_score: 0.0,
        };
    }

    let wins = returns.iter().filter(|&&r| r > 0.0).count();
    let raw_win_rate = wins as f64 / n as f64;
    // Laplace smoothing, Beta(1,1) prior: keeps the estimate inside (0,1)
    // and converges to the raw rate as n grows.
    let adjusted_win_rate = (wins as f64 + 1.0) / (n as f64 + 2.0);

    let ssf = sample_size_factor(n);
    let return_consistency = if stats.std > 0.0 {
        stats.mean / stats.std
    } else {
        0.0
    };

    let (t_statistic, p_value) = t_test_vs_zero(stats.mean, stats.std, n);
    let is_significant = p_value < 0.05;

    let worst_loss = stats.worst_drawdown_proxy.abs();
    let avg_loss = stats.avg_loss.abs();
    let pessimistic_ev = adjusted_win_rate * stats.avg_win
        - (1.0 - adjusted_win_rate) * (0.5 * avg_loss + 0.5 * worst_loss);

    let significance_credit = if is_significant {
        1.0
    } else if p_value < 0.10 {
        0.5
    } else {
        0.0
    };
    let confidence_score = (40.0 * ssf
        + 30.0 * (return_consistency / 3.0).min(1.0)
        + 20.0 * significance_credit
        + 10.0 * (adjusted_win_rate / 0.7).min(1.0))
    .clamp(0.0, 100.0);

    let robust_score = (0.40 * confidence_score
        + 0.30 * (pessimistic_ev / 0.10).clamp(0.0, 1.0) * 100.0
        + 0.20 * (return_consistency / 3.0).min(1.0) * 100.0
        + 0.10 * if is_significant { 100.0 } else { 50.0 })
    .clamp(0.0, 100.0);

    RobustStatistics {
        sample_size: n,
        raw_win_rate,
        adjusted_win_rate,
        sample_size_factor: ssf,
        return_consistency,
        t_statistic,
        p_value,
        is_significant,
        pessimistic_ev,
        confidence_score,
        robust_score,
    }
}
