use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use signal_core::{Bar, EngineError, PriceHistory, PriceSource};

/// Price source backed by per-ticker JSON bar files in a data directory,
/// `<dir>/<ticker>.json`, each holding an array of bars. Lets the whole
/// engine run offline against exported or fixture data.
pub struct FilePriceSource {
    dir: PathBuf,
}

impl FilePriceSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl PriceSource for FilePriceSource {
    async fn fetch(
        &self,
        ticker: &str,
        as_of: DateTime<Utc>,
        lookback_years: u32,
    ) -> Result<PriceHistory, EngineError> {
        let path = self.dir.join(format!("{ticker}.json"));
        let raw = tokio::fs::read(&path)
            .await
            .map_err(|e| EngineError::data(format!("{ticker}: cannot read {}: {e}", path.display())))?;
        let bars: Vec<Bar> = serde_json::from_slice(&raw)
            .map_err(|e| EngineError::data(format!("{ticker}: cannot parse {}: {e}", path.display())))?;

        let from = as_of - Duration::days(365 * lookback_years as i64);
        let window: Vec<Bar> = bars
            .into_iter()
            .filter(|b| b.timestamp >= from && b.timestamp <= as_of)
            .collect();

        PriceHistory::new(ticker, window)
    }
}
