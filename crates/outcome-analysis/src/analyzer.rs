use signal_core::OutcomeStatistics;
use statrs::distribution::{ContinuousCDF, Normal};

/// Forward returns for a set of fire indices at one horizon:
/// r_h(i) = close[i + h] / close[i] - 1. Fires whose forward window runs
/// past the end of the series are excluded from this horizon only.
pub fn forward_returns(closes: &[f64], indices: &[usize], horizon: usize) -> Vec<f64> {
    indices
        .iter()
        .filter(|&&i| i + horizon <= closes.len().saturating_sub(1))
        .filter(|&&i| closes[i] > 0.0)
        .map(|&i| closes[i + horizon] / closes[i] - 1.0)
        .collect()
}

/// Wilson 95% score interval for a binomial proportion. Well-defined at
/// small n, unlike the normal approximation.
pub fn wilson_interval(wins: usize, n: usize) -> (f64, f64, f64) {
    if n == 0 {
        return (0.0, 0.0, 0.0);
    }
    let z = Normal::new(0.0, 1.0)
        .expect("unit normal")
        .inverse_cdf(0.975);
    let nf = n as f64;
    let p = wins as f64 / nf;
    let z2 = z * z;

    let denom = 1.0 + z2 / nf;
    let center = (p + z2 / (2.0 * nf)) / denom;
    let margin = z * (p * (1.0 - p) / nf + z2 / (4.0 * nf * nf)).sqrt() / denom;

    (
        (center - margin).max(0.0),
        (center + margin).min(1.0),
        margin,
    )
}

/// Basic distribution statistics for one horizon's forward returns.
/// Everything is 0 on an empty sample.
pub fn outcome_statistics(returns: &[f64], horizon: usize) -> OutcomeStatistics {
    let n = returns.len();
    if n == 0 {
        return OutcomeStatistics {
            horizon,
            n: 0,
            mean: 0.0,
            median: 0.0,
            std: 0.0,
            win_rate: 0.0,
            avg_win: 0.0,
            avg_loss: 0.0,
            sharpe_like: 0.0,
            skewness: 0.0,
            kurtosis: 0.0,
            worst_drawdown_proxy: 0.0,
            win_rate_ci_lower: 0.0,
            win_rate_ci_upper: 0.0,
            win_rate_ci_margin: 0.0,
        };
    }

    let nf = n as f64;
    let mean = returns.iter().sum::<f64>() / nf;

    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median = if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    };

    let std = if n > 1 {
        let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (nf - 1.0);
        var.sqrt()
    } else {
        0.0
    };

    let wins: Vec<f64> = returns.iter().cloned().filter(|&r| r > 0.0).collect();
    let losses: Vec<f64> = returns.iter().cloned().filter(|&r| r < 0.0).collect();
    let win_rate = wins.len() as f64 / nf;
    let avg_win = if wins.is_empty() {
        0.0
    } else {
        wins.iter().sum::<f64>() / wins.len() as f64
    };
    let avg_loss = if losses.is_empty() {
        0.0
    } else {
        losses.iter().sum::<f64>() / losses.len() as f64
    };

    let sharpe_like = if std > 0.0 { mean / std } else { 0.0 };

    // Population moments for shape; degenerate spread collapses to 0.
    let m2 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / nf;
    let (skewness, kurtosis) = if m2 > 0.0 {
        let m3 = returns.iter().map(|r| (r - mean).powi(3)).sum::<f64>() / nf;
        let m4 = returns.iter().map(|r| (r - mean).powi(4)).sum::<f64>() / nf;
        (m3 / m2.powf(1.5), m4 / (m2 * m2) - 3.0)
    } else {
        (0.0, 0.0)
    };

    let worst_drawdown_proxy = sorted[0].min(0.0);

    let (ci_lower, ci_upper, ci_margin) = wilson_interval(wins.len(), n);

    OutcomeStatistics {
        horizon,
        n,
        mean,
        median,
        std,
        win_rate,
        avg_win,
        avg_loss,
        sharpe_like,
        skewness,
        kurtosis,
        worst_drawdown_proxy,
        win_rate_ci_lower: ci_lower,
        win_rate_ci_upper: ci_upper,
        win_rate_ci_margin: ci_margin,
    }
}
