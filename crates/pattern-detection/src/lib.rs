pub mod extrema;
pub mod primary;
pub mod secondary;

use market_data::MarketData;
use signal_core::{EngineError, Situation};

pub use primary::{
    BullFlagDetector, DoubleBottomDetector, HigherLowsDetector, InverseHeadShouldersDetector,
    LowReclaimDetector,
};
pub use secondary::{GapDetector, GoldenCrossDetector, RsiOversoldDetector, TurnOfMonthDetector};

/// A pattern detector: a pure read-side function from market data to the
/// bar indices where its condition holds. Detectors never look at forward
/// bars relative to a fire.
pub trait PatternDetector: Send + Sync {
    fn id(&self) -> &'static str;
    fn detect(&self, data: &MarketData) -> Result<Vec<Situation>, EngineError>;
}

/// Registry of detectors. Adding a pattern is one entry here plus its
/// detect function; there is no inheritance hierarchy to extend.
pub struct DetectorRegistry {
    detectors: Vec<Box<dyn PatternDetector>>,
}

impl DetectorRegistry {
    /// The standard detector library: five structural-reversal detectors
    /// and the supporting-evidence set.
    pub fn standard() -> Self {
        Self {
            detectors: vec![
                Box::new(DoubleBottomDetector),
                Box::new(InverseHeadShouldersDetector),
                Box::new(BullFlagDetector),
                Box::new(HigherLowsDetector),
                Box::new(LowReclaimDetector),
                Box::new(RsiOversoldDetector),
                Box::new(GoldenCrossDetector),
                Box::new(GapDetector),
                Box::new(TurnOfMonthDetector),
            ],
        }
    }

    pub fn get(&self, id: &str) -> Option<&dyn PatternDetector> {
        self.detectors
            .iter()
            .find(|d| d.id() == id)
            .map(|d| d.as_ref())
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Run every detector. A failing detector is logged and contributes
    /// no situations; a detector emitting an out-of-range fire index is
    /// treated the same way.
    pub fn detect_all(&self, data: &MarketData) -> Vec<Situation> {
        let mut situations = Vec::new();
        for detector in &self.detectors {
            match detector.detect(data) {
                Ok(found) => {
                    for situation in found {
                        match situation.validate_against(data.len()) {
                            Ok(()) => situations.push(situation),
                            Err(e) => {
                                tracing::warn!(
                                    ticker = data.ticker(),
                                    detector = detector.id(),
                                    "dropping situation with invalid indices: {e}"
                                );
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        ticker = data.ticker(),
                        detector = detector.id(),
                        "detector failed: {e}"
                    );
                }
            }
        }
        situations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use signal_core::{Bar, PriceHistory};

    fn flat_data(len: usize) -> MarketData {
        let bars: Vec<Bar> = (0..len)
            .map(|i| Bar {
                timestamp: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
                    + chrono::Duration::days(i as i64),
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                volume: 1_000.0,
            })
            .collect();
        MarketData::new(PriceHistory::new("FLAT.ST", bars).unwrap())
    }

    #[test]
    fn registry_contains_the_standard_library() {
        let registry = DetectorRegistry::standard();
        assert_eq!(registry.len(), 9);
        assert!(registry.get("double_bottom").is_some());
        assert!(registry.get("turn_of_month").is_some());
        assert!(registry.get("no_such_detector").is_none());
    }

    #[test]
    fn flat_series_produces_only_calendar_fires() {
        let registry = DetectorRegistry::standard();
        let situations = registry.detect_all(&flat_data(300));

        // Nothing structural in a flat series; the calendar detector
        // still marks month boundaries.
        assert!(situations.iter().all(|s| s.id == "turn_of_month"));
    }

    #[test]
    fn all_fire_indices_are_in_range() {
        let registry = DetectorRegistry::standard();
        let data = flat_data(120);
        for situation in registry.detect_all(&data) {
            assert!(situation.indices.iter().all(|&i| i < data.len()));
        }
    }
}
