use market_data::MarketData;
use signal_core::{
    EngineConfig, Instrument, MarketRegime, PositionTradingScore, Rejection, RejectionStage,
    Setup, VolatilityRegime, RRR_NO_LOSS_SENTINEL,
};

use crate::costs::ExecutionCostModel;
use crate::kelly::{atr_pct, clamp_allocation, volatility_factor};
use crate::trend::{trend_filter, TrendVerdict};

/// Stop distance as a multiple of the pattern's average loss.
const STOP_LOSS_FACTOR: f64 = 1.5;

/// Per-instrument post-processing: trend filter, V-Kelly sizing,
/// execution cost deduction and the regime multiplier, in that fixed
/// order. The sector cap and the minimum-position floor run later, over
/// the ranked assembly, because they depend on the other candidates.
pub struct PostProcessor {
    regime_multipliers: signal_core::RegimeMultipliers,
    net_edge_floor: f64,
    portfolio_currency_amount: f64,
    eval_horizon: usize,
    cost_model: ExecutionCostModel,
}

impl PostProcessor {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            regime_multipliers: config.regime_multipliers.clone(),
            net_edge_floor: config.net_edge_floor,
            portfolio_currency_amount: config.portfolio_currency_amount,
            eval_horizon: config.eval_horizon,
            cost_model: ExecutionCostModel::new(
                config.fx_cost_by_geography.clone(),
                config.courtage_tier.clone(),
            ),
        }
    }

    fn regime_multiplier(&self, regime: MarketRegime, instrument: &Instrument) -> f64 {
        let m = &self.regime_multipliers;
        match regime {
            MarketRegime::Healthy => m.healthy,
            MarketRegime::Cautious => m.cautious,
            MarketRegime::Stressed => m.stressed,
            MarketRegime::Crisis => {
                if instrument.is_all_weather {
                    1.0
                } else if instrument.is_defensive() {
                    0.5
                } else {
                    m.crisis
                }
            }
        }
    }

    pub fn process(
        &self,
        score: &PositionTradingScore,
        instrument: &Instrument,
        data: &MarketData,
        market_regime: MarketRegime,
        volatility_regime: VolatilityRegime,
    ) -> Result<Setup, Rejection> {
        let mut notes: Vec<String> = score.penalties.clone();

        // 1. Trend filter
        let trend = trend_filter(data);
        let trend_factor = match trend.verdict {
            TrendVerdict::Pass => 1.0,
            TrendVerdict::Reduced(factor) => {
                notes.push(format!(
                    "below EMA200 ({:.1}%), allocation reduced 30%",
                    trend.distance * 100.0
                ));
                factor
            }
            TrendVerdict::Reject => {
                return Err(Rejection::new(
                    &score.ticker,
                    RejectionStage::Trend,
                    "strong_downtrend",
                    format!("{:.1}% below EMA200", trend.distance.abs() * 100.0),
                ));
            }
            TrendVerdict::Undefined => {
                return Err(Rejection::new(
                    &score.ticker,
                    RejectionStage::Trend,
                    "ema200_undefined",
                    "not enough history for the long trend average",
                ));
            }
        };

        // 2. V-Kelly volatility sizing
        let instrument_atr = atr_pct(data);
        let vol_factor = volatility_factor(instrument_atr);
        let mut alloc = score.raw_allocation * trend_factor * vol_factor;

        // 3. Execution cost deduction
        let notional = alloc * self.portfolio_currency_amount;
        let costs = self
            .cost_model
            .total_cost(notional, instrument, volatility_regime);
        let expected_value = score.best_pattern.expected_value;
        let net_edge = expected_value - costs.total;
        if net_edge < self.net_edge_floor {
            return Err(Rejection::new(
                &score.ticker,
                RejectionStage::Cost,
                "net_edge_below_floor",
                format!(
                    "edge {:.4} minus costs {:.4} leaves {:.4}, floor {:.4}",
                    expected_value, costs.total, net_edge, self.net_edge_floor
                ),
            ));
        }

        // 4. Regime multiplier
        let multiplier = self.regime_multiplier(market_regime, instrument);
        if multiplier < 1.0 {
            notes.push(format!(
                "{} regime, allocation x{multiplier:.1}",
                market_regime.name()
            ));
        } else if market_regime == MarketRegime::Crisis && instrument.is_all_weather {
            notes.push("all-weather instrument retains full allocation in CRISIS".to_string());
        }
        alloc = clamp_allocation(alloc * multiplier);

        let eval_stats = score.best_pattern.stats_at(self.eval_horizon);
        let stop_loss_pct = eval_stats
            .map(|s| STOP_LOSS_FACTOR * s.avg_loss.abs())
            .unwrap_or(0.0);

        if score.best_pattern.risk_reward_ratio == RRR_NO_LOSS_SENTINEL {
            notes.push("no losing observation in sample; risk/reward is a sentinel".to_string());
        }

        Ok(Setup {
            ticker: score.ticker.clone(),
            pattern_name: score.best_pattern.situation.id.clone(),
            tier: score.best_pattern.tier,
            score: score.score,
            horizon_edges: score.edges.clone(),
            win_rate: score.win_rate_eval,
            win_rate_ci_lower: score.win_rate_ci_lower,
            win_rate_ci_upper: score.win_rate_ci_upper,
            expected_value,
            net_edge,
            risk_reward: score.best_pattern.risk_reward_ratio,
            robust_score: score.best_pattern.robust.robust_score,
            confidence_score: score.best_pattern.robust.confidence_score,
            sample_size: score.sample_size,
            stop_loss_pct,
            position_pct: alloc,
            position_currency: alloc * self.portfolio_currency_amount,
            sector: instrument.sector.clone(),
            notes,
        })
    }
}
