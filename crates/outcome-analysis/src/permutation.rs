use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use signal_core::derive_seed;

/// Result of the sign-flip permutation test.
#[derive(Debug, Clone, Copy)]
pub struct PermutationOutcome {
    pub observed_mean: f64,
    pub threshold_95: f64,
    pub passes: bool,
}

/// Sign-flip permutation test of the observed mean return.
///
/// Each iteration randomly flips the sign of every return and records the
/// permuted mean; the observed mean must exceed the 95th percentile of
/// that null distribution. Iterations get independently derived seeds so
/// the result is identical regardless of rayon's scheduling.
pub fn sign_permutation_test(returns: &[f64], iterations: usize, seed: u64) -> PermutationOutcome {
    if returns.is_empty() || iterations == 0 {
        return PermutationOutcome {
            observed_mean: 0.0,
            threshold_95: 0.0,
            passes: false,
        };
    }

    let observed_mean = returns.iter().sum::<f64>() / returns.len() as f64;

    let mut permuted: Vec<f64> = (0..iterations)
        .into_par_iter()
        .map(|iter| {
            let mut rng = StdRng::seed_from_u64(derive_seed(seed, &format!("perm:{iter}")));
            let sum: f64 = returns
                .iter()
                .map(|&r| if rng.gen_bool(0.5) { r } else { -r })
                .sum();
            sum / returns.len() as f64
        })
        .collect();

    permuted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let threshold_95 = percentile_sorted(&permuted, 95.0);

    PermutationOutcome {
        observed_mean,
        threshold_95,
        passes: observed_mean > threshold_95,
    }
}

pub(crate) fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}
