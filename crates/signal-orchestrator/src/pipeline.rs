use market_context::{check_context, classify_volatility_regime};
use market_data::MarketData;
use outcome_analysis::PatternEvaluator;
use pattern_detection::DetectorRegistry;
use position_sizing::PostProcessor;
use signal_core::{
    derive_seed, EngineConfig, Instrument, MarketRegime, PriceHistory, Rejection, RejectionStage,
    Setup,
};

use crate::screener::InstrumentScreener;

/// Everything one instrument's analysis needs, shared read-only across
/// the worker pool.
pub struct PipelineContext {
    pub config: EngineConfig,
    pub registry: DetectorRegistry,
    pub evaluator: PatternEvaluator,
    pub screener: InstrumentScreener,
    pub post_processor: PostProcessor,
}

impl PipelineContext {
    pub fn new(config: EngineConfig) -> Self {
        let registry = DetectorRegistry::standard();
        let evaluator = PatternEvaluator::new(&config);
        let screener = InstrumentScreener::new(&config);
        let post_processor = PostProcessor::new(&config);
        Self {
            config,
            registry,
            evaluator,
            screener,
            post_processor,
        }
    }
}

/// The pure per-instrument pipeline. No shared mutable state, no
/// suspension; a deterministic function of its inputs.
pub fn analyze_instrument(
    ctx: &PipelineContext,
    instrument: &Instrument,
    data: &MarketData,
    market_regime: MarketRegime,
) -> Result<Setup, Rejection> {
    // Context gate first: an instrument near its high is ineligible
    // before any pattern work happens.
    let context = check_context(data, ctx.config.min_decline_pct);
    if !context.context_valid {
        return Err(Rejection::new(
            &instrument.ticker,
            RejectionStage::Context,
            "not_declined",
            format!(
                "{:.1}% from the 90-bar high, needs -{:.0}%",
                context.decline_from_high * 100.0,
                ctx.config.min_decline_pct * 100.0
            ),
        ));
    }

    let situations = ctx.registry.detect_all(data);
    if situations.is_empty() {
        return Err(Rejection::new(
            &instrument.ticker,
            RejectionStage::Detection,
            "no_situations",
            "no detector fired on this series",
        ));
    }

    let instrument_seed = derive_seed(ctx.config.seed, &instrument.ticker);
    let evaluated: Vec<_> = situations
        .iter()
        .map(|s| ctx.evaluator.evaluate(s, data.closes(), instrument_seed))
        .collect();

    let score = ctx.screener.screen(instrument, &evaluated, context)?;

    let volatility_regime = classify_volatility_regime(data);
    let mut setup =
        ctx.post_processor
            .process(&score, instrument, data, market_regime, volatility_regime)?;

    // Optional seeded bootstrap CI on the evaluation-horizon mean,
    // reported as a diagnostic alongside the setup.
    if ctx.config.bootstrap_iterations > 0 {
        let returns = outcome_analysis::forward_returns(
            data.closes(),
            &score.best_pattern.situation.indices,
            ctx.config.eval_horizon,
        );
        if let Some((lower, upper)) = outcome_analysis::bootstrap_mean_ci(
            &returns,
            ctx.config.bootstrap_iterations,
            derive_seed(instrument_seed, "bootstrap"),
        ) {
            setup.notes.push(format!(
                "bootstrap mean-return CI [{:.2}%, {:.2}%]",
                lower * 100.0,
                upper * 100.0
            ));
        }
    }

    Ok(setup)
}

/// Wrap a fetch failure as the data-stage rejection it becomes.
pub fn data_rejection(instrument: &Instrument, detail: impl Into<String>) -> Rejection {
    Rejection::new(
        &instrument.ticker,
        RejectionStage::Data,
        "fetch_failed",
        detail,
    )
}

/// Validate a fetched history before it enters the pipeline.
pub fn market_data_for(
    instrument: &Instrument,
    history: PriceHistory,
    min_bars: usize,
) -> Result<MarketData, Rejection> {
    if history.len() < min_bars {
        return Err(Rejection::new(
            &instrument.ticker,
            RejectionStage::Data,
            "too_short_history",
            format!("{} bars, need {min_bars}", history.len()),
        ));
    }
    Ok(MarketData::new(history))
}
