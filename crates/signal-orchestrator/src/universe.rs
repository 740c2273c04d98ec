use std::collections::HashSet;
use std::path::Path;

use sha2::{Digest, Sha256};
use signal_core::{EngineError, Instrument};

/// The declarative instrument universe for one run.
#[derive(Debug, Clone)]
pub struct Universe {
    instruments: Vec<Instrument>,
}

impl Universe {
    pub fn new(instruments: Vec<Instrument>) -> Result<Self, EngineError> {
        let mut seen = HashSet::new();
        for instrument in &instruments {
            if instrument.ticker.trim().is_empty() {
                return Err(EngineError::config("universe contains an empty ticker"));
            }
            if !seen.insert(instrument.ticker.clone()) {
                return Err(EngineError::config(format!(
                    "duplicate ticker in universe: {}",
                    instrument.ticker
                )));
            }
        }
        Ok(Self { instruments })
    }

    /// Load from a JSON file holding an array of instrument records.
    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::config(format!("cannot read {}: {e}", path.display())))?;
        let instruments: Vec<Instrument> = serde_json::from_str(&raw)
            .map_err(|e| EngineError::config(format!("cannot parse {}: {e}", path.display())))?;
        Self::new(instruments)
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    /// SHA-256 of the canonical serialized universe, recorded in snapshots.
    pub fn digest(&self) -> String {
        let canonical = serde_json::to_vec(&self.instruments).unwrap_or_default();
        hex::encode(Sha256::digest(&canonical))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signal_core::{EarningsRisk, Geography, LiquidityTier};

    fn instrument(ticker: &str) -> Instrument {
        Instrument {
            ticker: ticker.into(),
            name: ticker.into(),
            sector: "Industrials".into(),
            geography: Geography::Sweden,
            is_all_weather: false,
            liquidity_tier: LiquidityTier::LargeCap,
            earnings_risk: EarningsRisk::None,
        }
    }

    #[test]
    fn duplicate_tickers_are_refused() {
        let result = Universe::new(vec![instrument("VOLV-B.ST"), instrument("VOLV-B.ST")]);
        assert!(result.is_err());
    }

    #[test]
    fn digest_tracks_content() {
        let a = Universe::new(vec![instrument("A.ST"), instrument("B.ST")]).unwrap();
        let b = Universe::new(vec![instrument("A.ST"), instrument("B.ST")]).unwrap();
        let c = Universe::new(vec![instrument("A.ST")]).unwrap();

        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
    }

    #[test]
    fn json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("universe.json");
        let universe = Universe::new(vec![instrument("ERIC-B.ST")]).unwrap();
        std::fs::write(
            &path,
            serde_json::to_string_pretty(universe.instruments()).unwrap(),
        )
        .unwrap();

        let loaded = Universe::from_file(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.digest(), universe.digest());
    }
}
