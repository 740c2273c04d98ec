use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::NaiveDate;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use signal_core::EngineError;

/// On-disk cache of derived indicator series for re-runs.
///
/// One JSON file per (ticker, as_of_date) holding every cached
/// (indicator, window) series for that snapshot of the instrument. Writes
/// go to a temp file followed by an atomic rename, so a crashed run never
/// leaves a torn file. Concurrent writers are serialized by a mutex with
/// last-write-wins semantics.
pub struct IndicatorDiskCache {
    dir: PathBuf,
    loaded: DashMap<String, CacheFile>,
    write_lock: Mutex<()>,
}

/// JSON has no NaN, so the not-yet-full window slots are stored as null.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CacheFile {
    series: HashMap<String, Vec<Option<f64>>>,
}

fn file_key(ticker: &str, as_of: NaiveDate) -> String {
    // Tickers like "VOLV-B.ST" are path-safe apart from the separator dot,
    // which is fine inside a file stem.
    format!("{ticker}_{as_of}")
}

impl IndicatorDiskCache {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            EngineError::data(format!("cannot create cache dir {}: {e}", dir.display()))
        })?;
        Ok(Self {
            dir,
            loaded: DashMap::new(),
            write_lock: Mutex::new(()),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn load(&self, key: &str) -> CacheFile {
        if let Some(entry) = self.loaded.get(key) {
            return entry.clone();
        }
        let file = match std::fs::read(self.path_for(key)) {
            Ok(raw) => serde_json::from_slice(&raw).unwrap_or_else(|e| {
                tracing::warn!("discarding corrupt indicator cache {key}: {e}");
                CacheFile::default()
            }),
            Err(_) => CacheFile::default(),
        };
        self.loaded.insert(key.to_string(), file.clone());
        file
    }

    pub fn get(
        &self,
        ticker: &str,
        as_of: NaiveDate,
        indicator: &str,
        window: usize,
    ) -> Option<Vec<f64>> {
        let file = self.load(&file_key(ticker, as_of));
        file.series.get(&format!("{indicator}:{window}")).map(|s| {
            s.iter()
                .map(|v| v.unwrap_or(f64::NAN))
                .collect()
        })
    }

    pub fn put(
        &self,
        ticker: &str,
        as_of: NaiveDate,
        indicator: &str,
        window: usize,
        values: &[f64],
    ) -> Result<(), EngineError> {
        let key = file_key(ticker, as_of);
        let _guard = self.write_lock.lock().expect("cache write lock poisoned");

        let mut file = self.load(&key);
        let stored: Vec<Option<f64>> = values
            .iter()
            .map(|&v| if v.is_finite() { Some(v) } else { None })
            .collect();
        file.series.insert(format!("{indicator}:{window}"), stored);

        let path = self.path_for(&key);
        write_atomic(&path, &file)?;
        self.loaded.insert(key, file);
        Ok(())
    }
}

fn write_atomic(path: &Path, file: &CacheFile) -> Result<(), EngineError> {
    let tmp = path.with_extension("json.tmp");
    let raw = serde_json::to_vec(file)
        .map_err(|e| EngineError::data(format!("cannot serialize indicator cache: {e}")))?;
    std::fs::write(&tmp, raw)
        .map_err(|e| EngineError::data(format!("cannot write {}: {e}", tmp.display())))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| EngineError::data(format!("cannot rename into {}: {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 28).unwrap()
    }

    #[test]
    fn round_trips_a_series() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IndicatorDiskCache::open(dir.path()).unwrap();

        let values = vec![f64::NAN, 1.5, 2.5, 3.5];
        cache.put("VOLV-B.ST", date(), "ema", 20, &values).unwrap();

        let read = cache.get("VOLV-B.ST", date(), "ema", 20).unwrap();
        assert!(read[0].is_nan());
        assert_eq!(&read[1..], &values[1..]);
    }

    #[test]
    fn missing_entries_return_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IndicatorDiskCache::open(dir.path()).unwrap();
        assert!(cache.get("NOVO-B.CO", date(), "rsi", 14).is_none());
    }

    #[test]
    fn last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IndicatorDiskCache::open(dir.path()).unwrap();

        cache.put("ERIC-B.ST", date(), "atr", 14, &[1.0]).unwrap();
        cache.put("ERIC-B.ST", date(), "atr", 14, &[2.0]).unwrap();

        assert_eq!(cache.get("ERIC-B.ST", date(), "atr", 14).unwrap(), vec![2.0]);
    }

    #[test]
    fn corrupt_file_is_discarded_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("{}_{}.json", "TEL2-B.ST", date()));
        std::fs::write(&path, b"{not json").unwrap();

        let cache = IndicatorDiskCache::open(dir.path()).unwrap();
        assert!(cache.get("TEL2-B.ST", date(), "ema", 50).is_none());
    }
}
