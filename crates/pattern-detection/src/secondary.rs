use chrono::Datelike;
use market_data::MarketData;
use signal_core::{EngineError, Priority, Situation, SituationMeta};

use crate::PatternDetector;

fn secondary_situation(
    id: &str,
    description: &str,
    indices: Vec<usize>,
    confidence: f64,
    signal_type: &str,
) -> Situation {
    Situation {
        id: id.to_string(),
        description: description.to_string(),
        indices,
        confidence,
        meta: SituationMeta {
            priority: Priority::Secondary,
            signal_type: signal_type.to_string(),
            volume_confirmed: false,
        },
    }
}

/// RSI(14) below 30.
pub struct RsiOversoldDetector;

impl RsiOversoldDetector {
    const PERIOD: usize = 14;
    const THRESHOLD: f64 = 30.0;
}

impl PatternDetector for RsiOversoldDetector {
    fn id(&self) -> &'static str {
        "rsi_oversold"
    }

    fn detect(&self, data: &MarketData) -> Result<Vec<Situation>, EngineError> {
        let rsi = data.rsi(Self::PERIOD);
        let indices: Vec<usize> = rsi
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_finite() && **v < Self::THRESHOLD)
            .map(|(i, _)| i)
            .collect();

        if indices.is_empty() {
            return Ok(vec![]);
        }
        Ok(vec![secondary_situation(
            self.id(),
            "RSI(14) oversold below 30",
            indices,
            0.45,
            "oversold",
        )])
    }
}

/// EMA(50) crossing above EMA(200).
pub struct GoldenCrossDetector;

impl PatternDetector for GoldenCrossDetector {
    fn id(&self) -> &'static str {
        "golden_cross"
    }

    fn detect(&self, data: &MarketData) -> Result<Vec<Situation>, EngineError> {
        let fast = data.ema(50);
        let slow = data.ema(200);

        let mut indices = Vec::new();
        for i in 1..data.len() {
            let ready = fast[i - 1].is_finite()
                && slow[i - 1].is_finite()
                && fast[i].is_finite()
                && slow[i].is_finite();
            if ready && fast[i - 1] <= slow[i - 1] && fast[i] > slow[i] {
                indices.push(i);
            }
        }

        if indices.is_empty() {
            return Ok(vec![]);
        }
        Ok(vec![secondary_situation(
            self.id(),
            "EMA(50) crossed above EMA(200)",
            indices,
            0.50,
            "trend_shift",
        )])
    }
}

/// Overnight gap larger than 2% in either direction. Emits one situation
/// per direction so the gap sign stays visible in diagnostics.
pub struct GapDetector;

impl GapDetector {
    const THRESHOLD: f64 = 0.02;
}

impl PatternDetector for GapDetector {
    fn id(&self) -> &'static str {
        "gap_move"
    }

    fn detect(&self, data: &MarketData) -> Result<Vec<Situation>, EngineError> {
        let bars = data.bars();
        let mut up = Vec::new();
        let mut down = Vec::new();

        for i in 1..bars.len() {
            let prev_close = bars[i - 1].close;
            if prev_close <= 0.0 {
                continue;
            }
            let gap = bars[i].open / prev_close - 1.0;
            if gap > Self::THRESHOLD {
                up.push(i);
            } else if gap < -Self::THRESHOLD {
                down.push(i);
            }
        }

        let mut situations = Vec::new();
        if !up.is_empty() {
            situations.push(secondary_situation(
                "gap_up",
                "Opening gap up above 2%",
                up,
                0.40,
                "gap",
            ));
        }
        if !down.is_empty() {
            situations.push(secondary_situation(
                "gap_down",
                "Opening gap down below -2%",
                down,
                0.40,
                "gap",
            ));
        }
        Ok(situations)
    }
}

/// Turn-of-month regularity: the first trading day of each month.
pub struct TurnOfMonthDetector;

impl PatternDetector for TurnOfMonthDetector {
    fn id(&self) -> &'static str {
        "turn_of_month"
    }

    fn detect(&self, data: &MarketData) -> Result<Vec<Situation>, EngineError> {
        let bars = data.bars();
        let mut indices = Vec::new();
        for i in 1..bars.len() {
            let prev = bars[i - 1].timestamp;
            let curr = bars[i].timestamp;
            if curr.month() != prev.month() || curr.year() != prev.year() {
                indices.push(i);
            }
        }

        if indices.is_empty() {
            return Ok(vec![]);
        }
        Ok(vec![secondary_situation(
            self.id(),
            "First trading day of the month",
            indices,
            0.35,
            "calendar",
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use signal_core::Bar;
    use signal_core::PriceHistory;

    fn data_from_bars(bars: Vec<Bar>) -> MarketData {
        MarketData::new(PriceHistory::new("TEST.ST", bars).unwrap())
    }

    fn bar(day_offset: i64, open: f64, close: f64) -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
                + chrono::Duration::days(day_offset),
            open,
            high: open.max(close) * 1.01,
            low: open.min(close) * 0.99,
            close,
            volume: 100_000.0,
        }
    }

    #[test]
    fn rsi_oversold_fires_in_persistent_downtrend() {
        let bars: Vec<Bar> = (0..40)
            .map(|i| {
                let close = 100.0 - 1.5 * i as f64;
                bar(i, close + 0.5, close)
            })
            .collect();
        let data = data_from_bars(bars);

        let result = RsiOversoldDetector.detect(&data).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].meta.priority, Priority::Secondary);
        assert!(!result[0].indices.is_empty());
    }

    #[test]
    fn gap_detector_separates_directions() {
        let mut bars = vec![bar(0, 100.0, 100.0)];
        bars.push(bar(1, 103.0, 103.0)); // +3% gap
        bars.push(bar(2, 103.5, 103.5)); // within threshold
        bars.push(bar(3, 100.0, 100.0)); // -3.4% gap
        let data = data_from_bars(bars);

        let result = GapDetector.detect(&data).unwrap();
        assert_eq!(result.len(), 2);

        let up = result.iter().find(|s| s.id == "gap_up").unwrap();
        let down = result.iter().find(|s| s.id == "gap_down").unwrap();
        assert_eq!(up.indices, vec![1]);
        assert_eq!(down.indices, vec![3]);
    }

    #[test]
    fn turn_of_month_fires_on_month_boundary() {
        // Late January into early February
        let bars: Vec<Bar> = (28..35)
            .map(|i| bar(i, 100.0, 100.0))
            .collect();
        let data = data_from_bars(bars);

        let result = TurnOfMonthDetector.detect(&data).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].indices.len(), 1);
    }

    #[test]
    fn golden_cross_detects_upward_crossing() {
        // Long decline then strong sustained recovery pushes EMA50 up
        // through EMA200.
        let mut closes: Vec<f64> = (0..260).map(|i| 300.0 - 0.5 * i as f64).collect();
        for i in 0..200 {
            closes.push(170.0 + 1.2 * i as f64);
        }
        let bars: Vec<Bar> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| bar(i as i64, c, c))
            .collect();
        let data = data_from_bars(bars);

        let result = GoldenCrossDetector.detect(&data).unwrap();
        assert_eq!(result.len(), 1);
        assert!(!result[0].indices.is_empty());
    }
}
