use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::EngineError;

/// Minimum sample sizes for the pattern tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinSampleSizes {
    pub core: usize,
    pub primary: usize,
    pub secondary: usize,
}

impl Default for MinSampleSizes {
    fn default() -> Self {
        Self {
            core: 150,
            primary: 75,
            secondary: 30,
        }
    }
}

/// Allocation multipliers per market regime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeMultipliers {
    pub healthy: f64,
    pub cautious: f64,
    pub stressed: f64,
    pub crisis: f64,
}

impl Default for RegimeMultipliers {
    fn default() -> Self {
        Self {
            healthy: 1.0,
            cautious: 0.7,
            stressed: 0.4,
            crisis: 0.2,
        }
    }
}

/// Round-trip FX conversion cost per geography tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FxCostByGeography {
    pub sweden: f64,
    pub nordic: f64,
    pub other: f64,
}

impl Default for FxCostByGeography {
    fn default() -> Self {
        Self {
            sweden: 0.0,
            nordic: 0.0025,
            other: 0.005,
        }
    }
}

/// One courtage band: applies up to `notional_limit`, charging
/// max(min_fee, notional * rate) per trade leg.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CourtageBand {
    pub notional_limit: f64,
    pub min_fee: f64,
    pub rate: f64,
}

/// Brokerage fee schedule, smallest band first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourtageTiers {
    pub mini: CourtageBand,
    pub small: CourtageBand,
    pub medium: CourtageBand,
}

impl Default for CourtageTiers {
    fn default() -> Self {
        Self {
            mini: CourtageBand {
                notional_limit: 100_000.0,
                min_fee: 1.0,
                rate: 0.00015,
            },
            small: CourtageBand {
                notional_limit: 250_000.0,
                min_fee: 7.0,
                rate: 0.00035,
            },
            medium: CourtageBand {
                notional_limit: 1_000_000.0,
                min_fee: 15.0,
                rate: 0.00056,
            },
        }
    }
}

/// The single immutable configuration value threaded through the run.
/// No process-wide singletons; the orchestrator receives this explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Forward horizons in bars, ascending.
    pub horizons: Vec<usize>,
    /// Horizon the robustness statistics and tiering are computed on.
    pub eval_horizon: usize,
    /// Required decline from the trailing 90-bar high for eligibility.
    pub min_decline_pct: f64,
    pub min_sample_sizes: MinSampleSizes,
    pub ev_floor: f64,
    pub rrr_floor: f64,
    pub net_edge_floor: f64,
    pub portfolio_currency_amount: f64,
    pub min_position_currency: f64,
    pub regime_multipliers: RegimeMultipliers,
    pub fx_cost_by_geography: FxCostByGeography,
    pub courtage_tier: CourtageTiers,
    pub sector_cap: f64,
    pub top_n: usize,
    /// 0 means "use available cores".
    pub worker_count: usize,
    pub instrument_timeout_secs: u64,
    pub permutation_iterations: usize,
    /// 0 disables the optional bootstrap confidence intervals.
    pub bootstrap_iterations: usize,
    /// Master seed; per-instrument seeds derive from hash(seed, ticker).
    pub seed: u64,
    pub lookback_years: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_log_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indicator_cache_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            horizons: vec![21, 42, 63],
            eval_horizon: 63,
            min_decline_pct: 0.10,
            min_sample_sizes: MinSampleSizes::default(),
            ev_floor: 0.0,
            rrr_floor: 3.0,
            net_edge_floor: 0.003,
            portfolio_currency_amount: 250_000.0,
            min_position_currency: 1_500.0,
            regime_multipliers: RegimeMultipliers::default(),
            fx_cost_by_geography: FxCostByGeography::default(),
            courtage_tier: CourtageTiers::default(),
            sector_cap: 0.40,
            top_n: 5,
            worker_count: 0,
            instrument_timeout_secs: 30,
            permutation_iterations: 1000,
            bootstrap_iterations: 0,
            seed: 42,
            lookback_years: 10,
            run_log_dir: None,
            indicator_cache_dir: None,
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file, then apply environment overrides.
    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::config(format!("cannot read {}: {e}", path.display())))?;
        let mut config: EngineConfig = toml::from_str(&raw)
            .map_err(|e| EngineError::config(format!("cannot parse {}: {e}", path.display())))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Operational knobs may be overridden from the environment without
    /// editing the config file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("ENGINE_SEED") {
            if let Ok(seed) = v.parse() {
                self.seed = seed;
            }
        }
        if let Ok(v) = std::env::var("ENGINE_WORKERS") {
            if let Ok(n) = v.parse() {
                self.worker_count = n;
            }
        }
        if let Ok(v) = std::env::var("ENGINE_TOP_N") {
            if let Ok(n) = v.parse() {
                self.top_n = n;
            }
        }
        if let Ok(v) = std::env::var("ENGINE_RUN_LOG_DIR") {
            self.run_log_dir = Some(PathBuf::from(v));
        }
    }

    /// Fail fast before any work starts.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.horizons.is_empty() {
            return Err(EngineError::config("horizons must not be empty"));
        }
        if !self.horizons.windows(2).all(|w| w[0] < w[1]) {
            return Err(EngineError::config("horizons must be strictly ascending"));
        }
        if !self.horizons.contains(&self.eval_horizon) {
            return Err(EngineError::config(format!(
                "eval_horizon {} is not one of the configured horizons",
                self.eval_horizon
            )));
        }
        if self.min_decline_pct <= 0.0 || self.min_decline_pct >= 1.0 {
            return Err(EngineError::config("min_decline_pct must be in (0, 1)"));
        }
        let sizes = &self.min_sample_sizes;
        if !(sizes.core > sizes.primary && sizes.primary > sizes.secondary && sizes.secondary > 0) {
            return Err(EngineError::config(
                "min_sample_sizes must satisfy core > primary > secondary > 0",
            ));
        }
        if self.rrr_floor <= 0.0 {
            return Err(EngineError::config("rrr_floor must be positive"));
        }
        if self.net_edge_floor < 0.0 {
            return Err(EngineError::config("net_edge_floor must be non-negative"));
        }
        if self.portfolio_currency_amount <= 0.0 {
            return Err(EngineError::config(
                "portfolio_currency_amount must be positive",
            ));
        }
        if self.min_position_currency < 0.0 {
            return Err(EngineError::config(
                "min_position_currency must be non-negative",
            ));
        }
        let m = &self.regime_multipliers;
        for (name, v) in [
            ("healthy", m.healthy),
            ("cautious", m.cautious),
            ("stressed", m.stressed),
            ("crisis", m.crisis),
        ] {
            if v <= 0.0 || v > 1.0 {
                return Err(EngineError::config(format!(
                    "regime multiplier {name} must be in (0, 1]"
                )));
            }
        }
        if self.sector_cap <= 0.0 || self.sector_cap > 1.0 {
            return Err(EngineError::config("sector_cap must be in (0, 1]"));
        }
        if self.top_n == 0 {
            return Err(EngineError::config("top_n must be positive"));
        }
        if self.permutation_iterations < 100 {
            return Err(EngineError::config(
                "permutation_iterations must be at least 100",
            ));
        }
        if self.instrument_timeout_secs == 0 {
            return Err(EngineError::config(
                "instrument_timeout_secs must be positive",
            ));
        }
        if self.lookback_years == 0 {
            return Err(EngineError::config("lookback_years must be positive"));
        }
        Ok(())
    }

    /// Number of workers after resolving the "use available cores" default.
    pub fn effective_worker_count(&self) -> usize {
        if self.worker_count > 0 {
            self.worker_count
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }

    /// SHA-256 of the canonical serialized config, recorded in run snapshots.
    pub fn digest(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&canonical))
    }
}

/// Deterministic seed for one unit of work, derived from the master seed
/// and a stable label (ticker, pattern id, iteration). Keeps results
/// independent of worker scheduling.
pub fn derive_seed(master_seed: u64, label: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    master_seed.hash(&mut hasher);
    label.hash(&mut hasher);
    hasher.finish()
}
