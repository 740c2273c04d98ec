use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// OHLCV bar data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Validated, immutable price series for one instrument.
///
/// Bars are strictly increasing in time, prices are positive and volume is
/// non-negative. Everything downstream indexes by bar ordinal, never by
/// timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceHistory {
    ticker: String,
    bars: Vec<Bar>,
}

impl PriceHistory {
    pub fn new(ticker: impl Into<String>, bars: Vec<Bar>) -> Result<Self, EngineError> {
        let ticker = ticker.into();
        if bars.is_empty() {
            return Err(EngineError::data(format!("{ticker}: empty bar series")));
        }
        for (i, bar) in bars.iter().enumerate() {
            if bar.open <= 0.0 || bar.high <= 0.0 || bar.low <= 0.0 || bar.close <= 0.0 {
                return Err(EngineError::data(format!(
                    "{ticker}: non-positive price at bar {i}"
                )));
            }
            if !(bar.open.is_finite()
                && bar.high.is_finite()
                && bar.low.is_finite()
                && bar.close.is_finite()
                && bar.volume.is_finite())
            {
                return Err(EngineError::data(format!(
                    "{ticker}: non-finite value at bar {i}"
                )));
            }
            if bar.volume < 0.0 {
                return Err(EngineError::data(format!(
                    "{ticker}: negative volume at bar {i}"
                )));
            }
            if bar.low > bar.high {
                return Err(EngineError::data(format!(
                    "{ticker}: low above high at bar {i}"
                )));
            }
            if i > 0 && bar.timestamp <= bars[i - 1].timestamp {
                return Err(EngineError::data(format!(
                    "{ticker}: non-monotonic timestamp at bar {i}"
                )));
            }
        }
        Ok(Self { ticker, bars })
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last_close(&self) -> f64 {
        self.bars[self.bars.len() - 1].close
    }
}

/// Detector priority. Only PRIMARY patterns may drive a final buy;
/// SECONDARY patterns appear as supporting diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Primary,
    Secondary,
}

/// Metadata a detector attaches to its situations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SituationMeta {
    pub priority: Priority,
    pub signal_type: String,
    /// True when the detector observed the volume confirmation it looks for.
    #[serde(default)]
    pub volume_confirmed: bool,
}

/// A named, mechanically detectable market condition and the bar indices
/// where it fired. Indices refer into the MarketData this was detected on
/// and are never valid against a different series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Situation {
    pub id: String,
    pub description: String,
    pub indices: Vec<usize>,
    pub confidence: f64,
    pub meta: SituationMeta,
}

impl Situation {
    /// Every fire index must lie inside the series it was detected on.
    pub fn validate_against(&self, series_len: usize) -> Result<(), EngineError> {
        match self.indices.iter().find(|&&i| i >= series_len) {
            Some(&bad) => Err(EngineError::Detection(format!(
                "{}: fire index {bad} outside series of length {series_len}",
                self.id
            ))),
            None => Ok(()),
        }
    }
}

/// Sample-size quality class for an evaluated pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Core,
    Primary,
    Secondary,
    Insufficient,
}

impl Tier {
    /// Higher rank sorts first.
    pub fn rank(&self) -> u8 {
        match self {
            Tier::Core => 3,
            Tier::Primary => 2,
            Tier::Secondary => 1,
            Tier::Insufficient => 0,
        }
    }

    /// Additive score bonus in the instrument screener.
    pub fn score_bonus(&self) -> f64 {
        match self {
            Tier::Core => 10.0,
            Tier::Primary => 7.0,
            Tier::Secondary => 3.0,
            Tier::Insufficient => 0.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Tier::Core => "CORE",
            Tier::Primary => "PRIMARY",
            Tier::Secondary => "SECONDARY",
            Tier::Insufficient => "INSUFFICIENT",
        }
    }
}

/// Per-horizon distribution of forward returns following a situation's fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeStatistics {
    pub horizon: usize,
    pub n: usize,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub win_rate: f64,
    /// Mean of positive returns, 0 when none.
    pub avg_win: f64,
    /// Mean of negative returns (signed, <= 0), 0 when none.
    pub avg_loss: f64,
    pub sharpe_like: f64,
    pub skewness: f64,
    pub kurtosis: f64,
    /// Minimum observed return across fires at this horizon (<= 0, 0 when
    /// no negative return was observed).
    pub worst_drawdown_proxy: f64,
    pub win_rate_ci_lower: f64,
    pub win_rate_ci_upper: f64,
    pub win_rate_ci_margin: f64,
}

/// Robustness adjustments computed on the evaluation horizon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobustStatistics {
    pub sample_size: usize,
    pub raw_win_rate: f64,
    /// Laplace-smoothed win rate, (w + 1) / (n + 2).
    pub adjusted_win_rate: f64,
    pub sample_size_factor: f64,
    pub return_consistency: f64,
    pub t_statistic: f64,
    pub p_value: f64,
    pub is_significant: bool,
    pub pessimistic_ev: f64,
    pub confidence_score: f64,
    pub robust_score: f64,
}

/// Sentinel stored in `risk_reward_ratio` when no losing trade was observed.
/// Propagated to reports so a human can verify the degenerate sample.
pub const RRR_NO_LOSS_SENTINEL: f64 = 999.0;

/// A situation together with its measured outcomes and quality verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatedPattern {
    pub situation: Situation,
    /// One entry per configured horizon, ascending.
    pub stats_by_horizon: Vec<OutcomeStatistics>,
    pub robust: RobustStatistics,
    pub tier: Tier,
    pub expected_value: f64,
    pub risk_reward_ratio: f64,
    /// Names of quality gates the pattern failed; empty means it survived.
    pub gate_failures: Vec<String>,
}

impl EvaluatedPattern {
    pub fn stats_at(&self, horizon: usize) -> Option<&OutcomeStatistics> {
        self.stats_by_horizon.iter().find(|s| s.horizon == horizon)
    }

    pub fn survives(&self) -> bool {
        self.tier != Tier::Insufficient && self.gate_failures.is_empty()
    }
}

/// Edge at one measurement horizon, kept explicit for a stable schema.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HorizonEdge {
    pub horizon: usize,
    pub edge: f64,
}

/// Screening result for one instrument before post-processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionTradingScore {
    pub ticker: String,
    pub best_pattern: EvaluatedPattern,
    pub context_valid: bool,
    pub decline_from_high: f64,
    pub score: f64,
    pub edges: Vec<HorizonEdge>,
    pub eval_horizon: usize,
    pub win_rate_eval: f64,
    pub win_rate_ci_lower: f64,
    pub win_rate_ci_upper: f64,
    pub sample_size: usize,
    pub raw_allocation: f64,
    /// Multiplicative penalties that fired during scoring, for reporting.
    pub penalties: Vec<String>,
}

/// Final, self-contained trade candidate. Serializable on its own; holds
/// no references into the market data it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setup {
    pub ticker: String,
    pub pattern_name: String,
    pub tier: Tier,
    pub score: f64,
    pub horizon_edges: Vec<HorizonEdge>,
    pub win_rate: f64,
    pub win_rate_ci_lower: f64,
    pub win_rate_ci_upper: f64,
    pub expected_value: f64,
    /// Cost-adjusted edge after the round-trip execution cost deduction.
    pub net_edge: f64,
    /// May carry the no-loss sentinel (999.0).
    pub risk_reward: f64,
    pub robust_score: f64,
    pub confidence_score: f64,
    pub sample_size: usize,
    pub stop_loss_pct: f64,
    pub position_pct: f64,
    pub position_currency: f64,
    pub sector: String,
    pub notes: Vec<String>,
}

/// Pipeline stage at which an instrument was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionStage {
    Data,
    Context,
    Detection,
    Evaluation,
    Screening,
    Trend,
    Cost,
    Regime,
    SectorCap,
    MinPosition,
    Ranking,
    Timeout,
    Cancelled,
}

impl RejectionStage {
    pub fn name(&self) -> &'static str {
        match self {
            RejectionStage::Data => "data",
            RejectionStage::Context => "context",
            RejectionStage::Detection => "detection",
            RejectionStage::Evaluation => "evaluation",
            RejectionStage::Screening => "screening",
            RejectionStage::Trend => "trend",
            RejectionStage::Cost => "cost",
            RejectionStage::Regime => "regime",
            RejectionStage::SectorCap => "sector_cap",
            RejectionStage::MinPosition => "min_position",
            RejectionStage::Ranking => "ranking",
            RejectionStage::Timeout => "timeout",
            RejectionStage::Cancelled => "cancelled",
        }
    }
}

/// Materialized rejection. Every instrument that does not survive produces
/// exactly one of these; nothing is silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rejection {
    pub ticker: String,
    pub stage: RejectionStage,
    pub reason_code: String,
    pub detail: String,
}

impl Rejection {
    pub fn new(
        ticker: impl Into<String>,
        stage: RejectionStage,
        reason_code: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            stage,
            reason_code: reason_code.into(),
            detail: detail.into(),
        }
    }
}

/// Market regime derived from universe breadth and macro signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketRegime {
    Healthy,
    Cautious,
    Stressed,
    Crisis,
}

impl MarketRegime {
    pub fn name(&self) -> &'static str {
        match self {
            MarketRegime::Healthy => "HEALTHY",
            MarketRegime::Cautious => "CAUTIOUS",
            MarketRegime::Stressed => "STRESSED",
            MarketRegime::Crisis => "CRISIS",
        }
    }
}

/// Short-term volatility regime driving the slippage multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VolatilityRegime {
    Stable,
    Expanding,
    Explosive,
    Contracting,
}

impl VolatilityRegime {
    pub fn slippage_multiplier(&self) -> f64 {
        match self {
            VolatilityRegime::Stable => 1.0,
            VolatilityRegime::Expanding => 2.0,
            VolatilityRegime::Explosive => 4.0,
            VolatilityRegime::Contracting => 0.5,
        }
    }
}

/// Geography tier used for FX cost classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Geography {
    Sweden,
    Nordic,
    Other,
}

/// Liquidity class used for the spread heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiquidityTier {
    LargeCap,
    MidCap,
    SmallCap,
}

/// Earnings-event risk flag supplied by the universe file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EarningsRisk {
    #[default]
    None,
    Warning,
    High,
}

/// One tradable instrument as declared in the universe file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub ticker: String,
    pub name: String,
    pub sector: String,
    pub geography: Geography,
    #[serde(default)]
    pub is_all_weather: bool,
    pub liquidity_tier: LiquidityTier,
    #[serde(default)]
    pub earnings_risk: EarningsRisk,
}

const DEFENSIVE_SECTORS: &[&str] = &["Utilities", "Consumer Staples", "Healthcare", "Telecom"];

impl Instrument {
    /// Defensive sectors keep half their allocation under a CRISIS regime.
    pub fn is_defensive(&self) -> bool {
        DEFENSIVE_SECTORS
            .iter()
            .any(|s| s.eq_ignore_ascii_case(&self.sector))
    }

    /// FX tier from the declared geography, falling back to the ticker
    /// suffix when the universe file left geography at the default.
    pub fn fx_geography(&self) -> Geography {
        match self.geography {
            Geography::Other if self.ticker.ends_with(".ST") => Geography::Sweden,
            Geography::Other
                if [".OL", ".CO", ".HE", ".IC"]
                    .iter()
                    .any(|s| self.ticker.ends_with(s)) =>
            {
                Geography::Nordic
            }
            g => g,
        }
    }
}
