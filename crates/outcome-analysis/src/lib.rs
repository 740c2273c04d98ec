pub mod analyzer;
pub mod bootstrap;
pub mod evaluator;
pub mod permutation;
pub mod robust;

pub use analyzer::{forward_returns, outcome_statistics, wilson_interval};
pub use bootstrap::bootstrap_mean_ci;
pub use evaluator::PatternEvaluator;
pub use permutation::{sign_permutation_test, PermutationOutcome};
pub use robust::{robust_statistics, sample_size_factor};
