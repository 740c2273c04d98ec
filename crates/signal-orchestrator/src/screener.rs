use market_context::ContextCheck;
use position_sizing::base_allocation;
use signal_core::{
    EarningsRisk, EngineConfig, EvaluatedPattern, HorizonEdge, Instrument, PositionTradingScore,
    Priority, Rejection, RejectionStage, Tier,
};

/// Per-instrument screening: best-pattern selection, composite scoring
/// and the initial win-rate-based allocation.
pub struct InstrumentScreener {
    eval_horizon: usize,
}

const CONTEXT_BONUS: f64 = 30.0;
const VOLUME_BONUS: f64 = 3.0;

impl InstrumentScreener {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            eval_horizon: config.eval_horizon,
        }
    }

    /// Highest tier with at least one member wins; expected value breaks
    /// ties inside the tier. Supporting-evidence (SECONDARY priority)
    /// patterns are diagnostics only and never selected.
    fn best_pattern<'a>(&self, evaluated: &'a [EvaluatedPattern]) -> Option<&'a EvaluatedPattern> {
        let candidates: Vec<&EvaluatedPattern> = evaluated
            .iter()
            .filter(|p| p.survives() && p.situation.meta.priority == Priority::Primary)
            .collect();

        for tier in [Tier::Core, Tier::Primary, Tier::Secondary] {
            let best = candidates
                .iter()
                .filter(|p| p.tier == tier)
                .max_by(|a, b| {
                    a.expected_value
                        .total_cmp(&b.expected_value)
                        .then_with(|| b.situation.id.cmp(&a.situation.id))
                })
                .copied();
            if let Some(best) = best {
                return Some(best);
            }
        }
        None
    }

    pub fn screen(
        &self,
        instrument: &Instrument,
        evaluated: &[EvaluatedPattern],
        context: ContextCheck,
    ) -> Result<PositionTradingScore, Rejection> {
        let best = self.best_pattern(evaluated).ok_or_else(|| {
            Rejection::new(
                &instrument.ticker,
                RejectionStage::Screening,
                "no_qualifying_pattern",
                format!(
                    "{} evaluated, none survived tiering and quality gates",
                    evaluated.len()
                ),
            )
        })?;

        let volume_confirmed = best.situation.meta.volume_confirmed;

        let mut score = 0.50 * best.robust.robust_score
            + if context.context_valid { CONTEXT_BONUS } else { 0.0 }
            + best.tier.score_bonus()
            + if volume_confirmed { VOLUME_BONUS } else { 0.0 };

        let mut penalties = Vec::new();
        match instrument.earnings_risk {
            EarningsRisk::High => {
                score *= 0.5;
                penalties.push("earnings risk HIGH, score halved".to_string());
            }
            EarningsRisk::Warning => {
                score *= 0.8;
                penalties.push("earnings risk WARNING, score x0.8".to_string());
            }
            EarningsRisk::None => {}
        }
        if !volume_confirmed {
            score *= 0.9;
            penalties.push("volume not confirmed, score x0.9".to_string());
        }
        let score = score.clamp(0.0, 100.0);

        let eval_stats = best.stats_at(self.eval_horizon).cloned().ok_or_else(|| {
            Rejection::new(
                &instrument.ticker,
                RejectionStage::Screening,
                "missing_eval_horizon",
                format!("no statistics at the {}-bar horizon", self.eval_horizon),
            )
        })?;

        let edges: Vec<HorizonEdge> = best
            .stats_by_horizon
            .iter()
            .map(|s| HorizonEdge {
                horizon: s.horizon,
                edge: s.mean,
            })
            .collect();

        Ok(PositionTradingScore {
            ticker: instrument.ticker.clone(),
            best_pattern: best.clone(),
            context_valid: context.context_valid,
            decline_from_high: context.decline_from_high,
            score,
            edges,
            eval_horizon: self.eval_horizon,
            win_rate_eval: eval_stats.win_rate,
            win_rate_ci_lower: eval_stats.win_rate_ci_lower,
            win_rate_ci_upper: eval_stats.win_rate_ci_upper,
            sample_size: eval_stats.n,
            raw_allocation: base_allocation(eval_stats.win_rate),
            penalties,
        })
    }
}
