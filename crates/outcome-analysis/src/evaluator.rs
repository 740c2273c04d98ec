use signal_core::{
    derive_seed, EngineConfig, EvaluatedPattern, MinSampleSizes, Priority, Situation, Tier,
    RRR_NO_LOSS_SENTINEL,
};

use crate::analyzer::{forward_returns, outcome_statistics};
use crate::permutation::sign_permutation_test;
use crate::robust::robust_statistics;

/// Statistical quality gate for detected situations.
pub struct PatternEvaluator {
    horizons: Vec<usize>,
    eval_horizon: usize,
    min_sample_sizes: MinSampleSizes,
    ev_floor: f64,
    rrr_floor: f64,
    permutation_iterations: usize,
}

impl PatternEvaluator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            horizons: config.horizons.clone(),
            eval_horizon: config.eval_horizon,
            min_sample_sizes: config.min_sample_sizes.clone(),
            ev_floor: config.ev_floor,
            rrr_floor: config.rrr_floor,
            permutation_iterations: config.permutation_iterations,
        }
    }

    fn tier_for(&self, n: usize, priority: Priority) -> Tier {
        let sizes = &self.min_sample_sizes;
        if n < sizes.secondary {
            Tier::Insufficient
        } else if priority == Priority::Primary && n >= sizes.core {
            Tier::Core
        } else if priority == Priority::Primary && n >= sizes.primary {
            Tier::Primary
        } else {
            Tier::Secondary
        }
    }

    /// Evaluate one situation against the full close series. The
    /// instrument seed keeps the permutation test deterministic per
    /// (master seed, ticker).
    pub fn evaluate(
        &self,
        situation: &Situation,
        closes: &[f64],
        instrument_seed: u64,
    ) -> EvaluatedPattern {
        let stats_by_horizon: Vec<_> = self
            .horizons
            .iter()
            .map(|&h| {
                let returns = forward_returns(closes, &situation.indices, h);
                outcome_statistics(&returns, h)
            })
            .collect();

        let eval_returns = forward_returns(closes, &situation.indices, self.eval_horizon);
        let eval_stats = stats_by_horizon
            .iter()
            .find(|s| s.horizon == self.eval_horizon)
            .cloned()
            .unwrap_or_else(|| outcome_statistics(&eval_returns, self.eval_horizon));

        let robust = robust_statistics(&eval_stats, &eval_returns);
        let tier = self.tier_for(eval_returns.len(), situation.meta.priority);

        let expected_value = eval_stats.win_rate * eval_stats.avg_win
            - (1.0 - eval_stats.win_rate) * eval_stats.avg_loss.abs();

        let risk_reward_ratio = if eval_stats.avg_loss == 0.0 {
            RRR_NO_LOSS_SENTINEL
        } else {
            eval_stats.avg_win / eval_stats.avg_loss.abs()
        };

        let mut gate_failures = Vec::new();
        if tier != Tier::Insufficient {
            if expected_value <= self.ev_floor {
                gate_failures.push("expected_value_floor".to_string());
            }
            if risk_reward_ratio < self.rrr_floor {
                gate_failures.push("risk_reward_floor".to_string());
            }

            let seed = derive_seed(instrument_seed, &situation.id);
            let permutation =
                sign_permutation_test(&eval_returns, self.permutation_iterations, seed);
            if !permutation.passes {
                gate_failures.push("permutation_test".to_string());
            }

            if !regime_stable(&eval_returns) {
                gate_failures.push("regime_stability".to_string());
            }
        }

        EvaluatedPattern {
            situation: situation.clone(),
            stats_by_horizon,
            robust,
            tier,
            expected_value,
            risk_reward_ratio,
            gate_failures,
        }
    }
}

/// Split the sample into a first and second half (fires are in bar order)
/// and require the worse half's win rate to hold at least half of the
/// overall one. Catches patterns whose edge lived in a single regime.
fn regime_stable(returns: &[f64]) -> bool {
    let n = returns.len();
    if n < 2 {
        return false;
    }
    let win_rate = |slice: &[f64]| -> f64 {
        slice.iter().filter(|&&r| r > 0.0).count() as f64 / slice.len() as f64
    };
    let overall = win_rate(returns);
    let mid = n / 2;
    let worse = win_rate(&returns[..mid]).min(win_rate(&returns[mid..]));
    worse >= 0.5 * overall
}
