use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use signal_core::derive_seed;

use crate::permutation::percentile_sorted;

/// Seeded bootstrap 95% confidence interval on the mean return.
///
/// Resamples with replacement `iterations` times; returns (lower, upper)
/// at the 2.5th and 97.5th percentiles, or None when the sample is too
/// small to resample meaningfully.
pub fn bootstrap_mean_ci(returns: &[f64], iterations: usize, seed: u64) -> Option<(f64, f64)> {
    if returns.len() < 5 || iterations == 0 {
        return None;
    }

    let n = returns.len();
    let mut means: Vec<f64> = (0..iterations)
        .into_par_iter()
        .map(|iter| {
            let mut rng = StdRng::seed_from_u64(derive_seed(seed, &format!("boot:{iter}")));
            let sum: f64 = (0..n).map(|_| returns[rng.gen_range(0..n)]).sum();
            sum / n as f64
        })
        .collect();

    means.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    Some((
        percentile_sorted(&means, 2.5),
        percentile_sorted(&means, 97.5),
    ))
}
