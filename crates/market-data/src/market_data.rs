use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use signal_core::{Bar, PriceHistory};

use crate::indicators;

/// Cache key for a derived series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeriesKind {
    Returns,
    LogReturns,
    RollingMean(usize),
    RollingStd(usize),
    Ema(usize),
    Rsi(usize),
    Atr(usize),
}

impl SeriesKind {
    /// Stable (indicator, window) pair for the persistent cache.
    pub fn cache_parts(&self) -> (&'static str, usize) {
        match self {
            SeriesKind::Returns => ("returns", 0),
            SeriesKind::LogReturns => ("log_returns", 0),
            SeriesKind::RollingMean(n) => ("rolling_mean", *n),
            SeriesKind::RollingStd(n) => ("rolling_std", *n),
            SeriesKind::Ema(n) => ("ema", *n),
            SeriesKind::Rsi(n) => ("rsi", *n),
            SeriesKind::Atr(n) => ("atr", *n),
        }
    }
}

/// Price series plus lazily computed, memoized derived series.
///
/// The cache is an arena confined to one pipeline worker for the lifetime
/// of the instrument's run; it is never shared across instruments. Every
/// derived series has the same length as the raw series, with leading NaN
/// where the window is not yet full.
pub struct MarketData {
    history: PriceHistory,
    closes: Vec<f64>,
    cache: Mutex<HashMap<SeriesKind, Arc<Vec<f64>>>>,
}

impl MarketData {
    pub fn new(history: PriceHistory) -> Self {
        let closes = history.bars().iter().map(|b| b.close).collect();
        Self {
            history,
            closes,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn ticker(&self) -> &str {
        self.history.ticker()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn bars(&self) -> &[Bar] {
        self.history.bars()
    }

    pub fn closes(&self) -> &[f64] {
        &self.closes
    }

    pub fn last_close(&self) -> f64 {
        self.history.last_close()
    }

    /// Seed the memo cache with a series computed in an earlier run
    /// (from the persistent indicator cache). Ignored when the length
    /// does not match this history or the slot is already filled.
    pub fn prime(&self, kind: SeriesKind, series: Vec<f64>) -> bool {
        if series.len() != self.len() {
            return false;
        }
        let mut cache = self.cache.lock().expect("indicator cache poisoned");
        if cache.contains_key(&kind) {
            return false;
        }
        cache.insert(kind, Arc::new(series));
        true
    }

    /// The series for `kind` if it has been computed (or primed) already.
    pub fn cached(&self, kind: SeriesKind) -> Option<Arc<Vec<f64>>> {
        self.cache
            .lock()
            .expect("indicator cache poisoned")
            .get(&kind)
            .map(Arc::clone)
    }

    fn series(&self, kind: SeriesKind) -> Arc<Vec<f64>> {
        let mut cache = self.cache.lock().expect("indicator cache poisoned");
        if let Some(series) = cache.get(&kind) {
            return Arc::clone(series);
        }
        let computed = Arc::new(self.compute(kind));
        debug_assert_eq!(computed.len(), self.len());
        cache.insert(kind, Arc::clone(&computed));
        computed
    }

    fn compute(&self, kind: SeriesKind) -> Vec<f64> {
        match kind {
            SeriesKind::Returns => indicators::simple_returns(&self.closes),
            SeriesKind::LogReturns => indicators::log_returns(&self.closes),
            SeriesKind::RollingMean(n) => indicators::rolling_mean(&self.closes, n),
            SeriesKind::RollingStd(n) => indicators::rolling_std(&self.closes, n),
            SeriesKind::Ema(n) => indicators::ema(&self.closes, n),
            SeriesKind::Rsi(n) => indicators::rsi(&self.closes, n),
            SeriesKind::Atr(n) => indicators::atr(self.history.bars(), n),
        }
    }

    pub fn returns(&self) -> Arc<Vec<f64>> {
        self.series(SeriesKind::Returns)
    }

    pub fn log_returns(&self) -> Arc<Vec<f64>> {
        self.series(SeriesKind::LogReturns)
    }

    pub fn rolling_mean(&self, period: usize) -> Arc<Vec<f64>> {
        self.series(SeriesKind::RollingMean(period))
    }

    pub fn rolling_std(&self, period: usize) -> Arc<Vec<f64>> {
        self.series(SeriesKind::RollingStd(period))
    }

    pub fn ema(&self, period: usize) -> Arc<Vec<f64>> {
        self.series(SeriesKind::Ema(period))
    }

    pub fn rsi(&self, period: usize) -> Arc<Vec<f64>> {
        self.series(SeriesKind::Rsi(period))
    }

    pub fn atr(&self, period: usize) -> Arc<Vec<f64>> {
        self.series(SeriesKind::Atr(period))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn history(closes: &[f64]) -> PriceHistory {
        let bars: Vec<Bar> = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                timestamp: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
                    + chrono::Duration::days(i as i64),
                open: close,
                high: close * 1.01,
                low: close * 0.99,
                close,
                volume: 10_000.0,
            })
            .collect();
        PriceHistory::new("TEST.ST", bars).unwrap()
    }

    #[test]
    fn all_series_share_the_raw_length() {
        let data = MarketData::new(history(&[
            100.0, 101.0, 99.0, 102.0, 103.0, 101.5, 104.0, 105.0, 103.0, 106.0, 107.0, 106.5,
            108.0, 109.0, 110.0, 108.5, 111.0, 112.0, 110.0, 113.0, 114.0, 112.0, 115.0, 116.0,
        ]));
        let n = data.len();
        assert_eq!(data.returns().len(), n);
        assert_eq!(data.log_returns().len(), n);
        assert_eq!(data.rolling_mean(5).len(), n);
        assert_eq!(data.rolling_std(5).len(), n);
        assert_eq!(data.ema(20).len(), n);
        assert_eq!(data.rsi(14).len(), n);
        assert_eq!(data.atr(14).len(), n);
    }

    #[test]
    fn leading_slots_are_nan_for_windowed_series() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let data = MarketData::new(history(&closes));

        let mean = data.rolling_mean(10);
        assert!(mean[..9].iter().all(|v| v.is_nan()));
        assert!(mean[9..].iter().all(|v| v.is_finite()));

        let e = data.ema(20);
        assert!(e[..19].iter().all(|v| v.is_nan()));
        assert!(e[19..].iter().all(|v| v.is_finite()));
    }

    #[test]
    fn repeated_lookups_hit_the_cache() {
        let closes: Vec<f64> = (0..50).map(|i| 100.0 + (i as f64).sin()).collect();
        let data = MarketData::new(history(&closes));
        let first = data.ema(20);
        let second = data.ema(20);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn primed_series_are_served_instead_of_computed() {
        let closes: Vec<f64> = (0..50).map(|i| 100.0 + i as f64).collect();
        let data = MarketData::new(history(&closes));

        let canned = vec![42.0; 50];
        assert!(data.prime(SeriesKind::Ema(20), canned.clone()));
        assert_eq!(*data.ema(20), canned);

        // A second prime of the same slot is refused
        assert!(!data.prime(SeriesKind::Ema(20), vec![0.0; 50]));
    }

    #[test]
    fn prime_rejects_mismatched_lengths() {
        let closes: Vec<f64> = (0..50).map(|i| 100.0 + i as f64).collect();
        let data = MarketData::new(history(&closes));
        assert!(!data.prime(SeriesKind::Atr(14), vec![1.0; 10]));
        assert!(data.cached(SeriesKind::Atr(14)).is_none());
    }
}
