pub mod pipeline;
pub mod ranker;
pub mod screener;
pub mod snapshot;
pub mod universe;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use market_context::{classify_market_regime, universe_breadth, MacroSignals, RegimeAssessment};
use market_data::{IndicatorDiskCache, MarketData, SeriesKind};
use signal_core::{
    EngineConfig, EngineError, Instrument, PriceSource, Rejection, RejectionStage, Setup,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::pipeline::{analyze_instrument, data_rejection, market_data_for, PipelineContext};
use crate::snapshot::{RunSnapshot, StageCounts};
use crate::universe::Universe;

/// Bars an instrument needs before the pipeline will look at it: enough
/// for EMA(200) plus a full evaluation horizon.
const MIN_BARS: usize = 260;

/// Everything one run produced. Setups are ranked; every instrument that
/// did not survive is present in `rejections` exactly once.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub setups: Vec<Setup>,
    pub rejections: Vec<Rejection>,
    pub partial: bool,
    pub regime: RegimeAssessment,
    pub analyzed: usize,
    pub universe_size: usize,
}

impl RunOutcome {
    pub fn to_snapshot(
        &self,
        timestamp: DateTime<Utc>,
        config_digest: String,
        universe_digest: String,
    ) -> RunSnapshot {
        RunSnapshot {
            timestamp,
            config_digest,
            universe_digest,
            regime: self.regime.regime,
            breadth: self.regime.breadth,
            partial: self.partial,
            universe_size: self.universe_size,
            analyzed: self.analyzed,
            rejections_by_stage: RunSnapshot::stage_counts(&self.rejections),
            setups: self.setups.clone(),
            rejections: self.rejections.clone(),
        }
    }

    pub fn stage_counts(&self) -> StageCounts {
        RunSnapshot::stage_counts(&self.rejections)
    }
}

enum Fetched {
    Data(Arc<MarketData>),
    Rejected(Rejection),
    Cancelled,
}

enum Analyzed {
    Done(Result<Setup, Rejection>),
    Timeout,
    Cancelled,
    Panicked(String),
}

/// The run orchestrator: owns the configuration, universe and price
/// source, fans instruments out over a worker pool and assembles the
/// deterministic ranked result.
pub struct Orchestrator {
    context: Arc<PipelineContext>,
    universe: Universe,
    source: Arc<dyn PriceSource>,
    macro_signals: MacroSignals,
    disk_cache: Option<Arc<IndicatorDiskCache>>,
}

/// Series worth persisting between runs: the ones every instrument
/// computes regardless of which detectors fire.
const PERSISTED_SERIES: [SeriesKind; 3] =
    [SeriesKind::Ema(200), SeriesKind::Atr(14), SeriesKind::Rsi(14)];

impl Orchestrator {
    pub fn new(
        config: EngineConfig,
        universe: Universe,
        source: Arc<dyn PriceSource>,
        macro_signals: MacroSignals,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        if universe.is_empty() {
            return Err(EngineError::config("universe is empty"));
        }
        let disk_cache = match &config.indicator_cache_dir {
            Some(dir) => match IndicatorDiskCache::open(dir) {
                Ok(cache) => Some(Arc::new(cache)),
                Err(e) => {
                    tracing::warn!("indicator cache disabled: {e}");
                    None
                }
            },
            None => None,
        };
        Ok(Self {
            context: Arc::new(PipelineContext::new(config)),
            universe,
            source,
            macro_signals,
            disk_cache,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.context.config
    }

    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    /// Execute one full run. Cancellation is cooperative: in-flight
    /// instruments finish, nothing new starts, and ranking covers the
    /// completed subset with `partial` set.
    pub async fn run(
        &self,
        as_of: DateTime<Utc>,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, EngineError> {
        let config = &self.context.config;
        let workers = config.effective_worker_count();
        let budget = Duration::from_secs(config.instrument_timeout_secs);
        let instruments = self.universe.instruments();

        tracing::info!(
            universe = instruments.len(),
            workers,
            "starting signal run as of {as_of}"
        );

        let mut rejections: Vec<Rejection> = Vec::new();
        let mut partial = false;

        // Phase 1: fetch and validate histories.
        let fetched = self.fetch_phase(as_of, workers, budget, &cancel).await?;

        let mut prepared: Vec<(usize, Arc<MarketData>)> = Vec::new();
        for (idx, outcome) in fetched.into_iter().enumerate() {
            match outcome {
                Fetched::Data(data) => prepared.push((idx, data)),
                Fetched::Rejected(rejection) => rejections.push(rejection),
                Fetched::Cancelled => {
                    partial = true;
                    rejections.push(Rejection::new(
                        &instruments[idx].ticker,
                        RejectionStage::Cancelled,
                        "cancelled",
                        "run cancelled before this instrument started",
                    ));
                }
            }
        }
        let analyzed = prepared.len();

        // Phase 2: market regime, once per run, from breadth over the
        // fetched universe plus the supplied macro signals.
        let breadth = universe_breadth(prepared.iter().map(|(_, d)| d.as_ref()));
        let regime = classify_market_regime(breadth, self.macro_signals);
        tracing::info!("market regime: {}", regime.reasoning);

        // Phase 3: per-instrument analysis over the worker pool.
        let cache_view: Vec<(String, Arc<MarketData>)> = prepared
            .iter()
            .map(|(idx, data)| (instruments[*idx].ticker.clone(), Arc::clone(data)))
            .collect();
        let analyzed_results = self
            .analysis_phase(prepared, workers, budget, &cancel, regime.regime)
            .await?;

        // Persist the standard derived series for re-runs. Last write
        // wins; a failed write never fails the run.
        if let Some(cache) = &self.disk_cache {
            for (ticker, data) in &cache_view {
                write_back_to_disk(cache, ticker, as_of.date_naive(), data);
            }
        }

        let mut candidates: Vec<Setup> = Vec::new();
        for (idx, outcome) in analyzed_results {
            let ticker = &instruments[idx].ticker;
            match outcome {
                Analyzed::Done(Ok(setup)) => candidates.push(setup),
                Analyzed::Done(Err(rejection)) => rejections.push(rejection),
                Analyzed::Timeout => rejections.push(Rejection::new(
                    ticker,
                    RejectionStage::Timeout,
                    "timeout",
                    format!("exceeded the {}s instrument budget", budget.as_secs()),
                )),
                Analyzed::Cancelled => {
                    partial = true;
                    rejections.push(Rejection::new(
                        ticker,
                        RejectionStage::Cancelled,
                        "cancelled",
                        "run cancelled before this instrument started",
                    ));
                }
                Analyzed::Panicked(detail) => {
                    return Err(EngineError::internal(format!(
                        "analysis of {ticker} panicked: {detail}"
                    )));
                }
            }
        }

        // Phase 4: deterministic ranking and assembly.
        let (setups, assembly_rejections) = ranker::rank_and_assemble(candidates, config);
        rejections.extend(assembly_rejections);
        rejections.sort_by(|a, b| {
            a.ticker
                .cmp(&b.ticker)
                .then_with(|| a.stage.name().cmp(b.stage.name()))
        });

        tracing::info!(
            setups = setups.len(),
            rejections = rejections.len(),
            partial,
            "run complete"
        );

        Ok(RunOutcome {
            setups,
            rejections,
            partial,
            regime,
            analyzed,
            universe_size: instruments.len(),
        })
    }

    async fn fetch_phase(
        &self,
        as_of: DateTime<Utc>,
        workers: usize,
        budget: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<Fetched>, EngineError> {
        let instruments = self.universe.instruments();
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut join = JoinSet::new();

        for (idx, instrument) in instruments.iter().enumerate() {
            let instrument = instrument.clone();
            let source = Arc::clone(&self.source);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let lookback = self.context.config.lookback_years;
            let disk_cache = self.disk_cache.clone();

            join.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                if cancel.is_cancelled() {
                    return (idx, Fetched::Cancelled);
                }
                let fetch = source.fetch(&instrument.ticker, as_of, lookback);
                match tokio::time::timeout(budget, fetch).await {
                    Ok(Ok(history)) => match market_data_for(&instrument, history, MIN_BARS) {
                        Ok(data) => {
                            if let Some(cache) = &disk_cache {
                                prime_from_disk(
                                    cache,
                                    &instrument.ticker,
                                    as_of.date_naive(),
                                    &data,
                                );
                            }
                            (idx, Fetched::Data(Arc::new(data)))
                        }
                        Err(rejection) => (idx, Fetched::Rejected(rejection)),
                    },
                    Ok(Err(e)) => (idx, Fetched::Rejected(data_rejection(&instrument, e.to_string()))),
                    Err(_) => (
                        idx,
                        Fetched::Rejected(Rejection::new(
                            &instrument.ticker,
                            RejectionStage::Timeout,
                            "timeout",
                            "price fetch exceeded the instrument budget",
                        )),
                    ),
                }
            });
        }

        let mut slots: Vec<Option<Fetched>> = (0..instruments.len()).map(|_| None).collect();
        while let Some(result) = join.join_next().await {
            let (idx, outcome) =
                result.map_err(|e| EngineError::internal(format!("fetch task failed: {e}")))?;
            slots[idx] = Some(outcome);
        }
        Ok(slots.into_iter().map(|s| s.expect("fetch slot filled")).collect())
    }

    async fn analysis_phase(
        &self,
        prepared: Vec<(usize, Arc<MarketData>)>,
        workers: usize,
        budget: Duration,
        cancel: &CancellationToken,
        regime: signal_core::MarketRegime,
    ) -> Result<Vec<(usize, Analyzed)>, EngineError> {
        let instruments = self.universe.instruments();
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut join = JoinSet::new();

        for (idx, data) in prepared {
            let instrument: Instrument = instruments[idx].clone();
            let context = Arc::clone(&self.context);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();

            join.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                if cancel.is_cancelled() {
                    return (idx, Analyzed::Cancelled);
                }
                let work = tokio::task::spawn_blocking(move || {
                    analyze_instrument(&context, &instrument, &data, regime)
                });
                match tokio::time::timeout(budget, work).await {
                    Ok(Ok(result)) => (idx, Analyzed::Done(result)),
                    Ok(Err(join_err)) => (idx, Analyzed::Panicked(join_err.to_string())),
                    Err(_) => (idx, Analyzed::Timeout),
                }
            });
        }

        let mut results = Vec::new();
        while let Some(result) = join.join_next().await {
            let entry =
                result.map_err(|e| EngineError::internal(format!("analysis task failed: {e}")))?;
            results.push(entry);
        }
        results.sort_by_key(|(idx, _)| *idx);
        Ok(results)
    }
}

fn prime_from_disk(cache: &IndicatorDiskCache, ticker: &str, date: NaiveDate, data: &MarketData) {
    for kind in PERSISTED_SERIES {
        let (indicator, window) = kind.cache_parts();
        if let Some(series) = cache.get(ticker, date, indicator, window) {
            data.prime(kind, series);
        }
    }
}

fn write_back_to_disk(
    cache: &IndicatorDiskCache,
    ticker: &str,
    date: NaiveDate,
    data: &MarketData,
) {
    for kind in PERSISTED_SERIES {
        let (indicator, window) = kind.cache_parts();
        let series = match kind {
            SeriesKind::Ema(n) => data.ema(n),
            SeriesKind::Atr(n) => data.atr(n),
            SeriesKind::Rsi(n) => data.rsi(n),
            _ => continue,
        };
        if let Err(e) = cache.put(ticker, date, indicator, window, &series) {
            tracing::warn!("indicator cache write failed for {ticker}: {e}");
        }
    }
}
