use market_data::MarketData;
use serde::{Deserialize, Serialize};

/// Reject below 10% under the EMA(200); haircut anywhere under it.
const REJECT_BELOW: f64 = -0.10;
const SOFT_HAIRCUT: f64 = 0.30;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TrendVerdict {
    /// Above the long average, no adjustment.
    Pass,
    /// Below the average but within tolerance; allocation scaled by the
    /// contained factor.
    Reduced(f64),
    /// Strong downtrend, no position.
    Reject,
    /// The long average is not defined yet; too little history to size.
    Undefined,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrendCheck {
    /// Signed distance of the last close from EMA(200).
    pub distance: f64,
    pub verdict: TrendVerdict,
}

/// Distance of the last close from its EMA(200). Catching a falling
/// knife deep under the long average is the one thing the mean-reversion
/// entry is not allowed to do.
pub fn trend_filter(data: &MarketData) -> TrendCheck {
    let ema200 = data.ema(200);
    let anchor = match ema200.last() {
        Some(&v) if v.is_finite() && v > 0.0 => v,
        _ => {
            return TrendCheck {
                distance: 0.0,
                verdict: TrendVerdict::Undefined,
            }
        }
    };

    let distance = (data.last_close() - anchor) / anchor;
    let verdict = if distance < REJECT_BELOW {
        TrendVerdict::Reject
    } else if distance < 0.0 {
        TrendVerdict::Reduced(1.0 - SOFT_HAIRCUT)
    } else {
        TrendVerdict::Pass
    };

    TrendCheck { distance, verdict }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use signal_core::{Bar, PriceHistory};

    fn data_ending_at(level: f64, tail: f64) -> MarketData {
        // Long flat stretch at `level`, one final bar at `tail` so the
        // EMA(200) stays pinned at the flat level.
        let mut closes = vec![level; 260];
        closes.push(tail);
        let bars: Vec<Bar> = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                timestamp: Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap()
                    + chrono::Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
            })
            .collect();
        MarketData::new(PriceHistory::new("TRND.ST", bars).unwrap())
    }

    #[test]
    fn above_average_passes() {
        let check = trend_filter(&data_ending_at(100.0, 105.0));
        assert_eq!(check.verdict, TrendVerdict::Pass);
        assert!(check.distance > 0.0);
    }

    #[test]
    fn slightly_below_average_is_haircut() {
        let check = trend_filter(&data_ending_at(100.0, 95.0));
        match check.verdict {
            TrendVerdict::Reduced(factor) => assert!((factor - 0.7).abs() < 1e-12),
            other => panic!("expected Reduced, got {other:?}"),
        }
    }

    #[test]
    fn deep_below_average_is_rejected() {
        let check = trend_filter(&data_ending_at(100.0, 85.0));
        assert_eq!(check.verdict, TrendVerdict::Reject);
    }

    #[test]
    fn short_history_is_undefined() {
        let bars: Vec<Bar> = (0..50)
            .map(|i| Bar {
                timestamp: Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap()
                    + chrono::Duration::days(i as i64),
                open: 10.0,
                high: 10.0,
                low: 10.0,
                close: 10.0,
                volume: 1.0,
            })
            .collect();
        let data = MarketData::new(PriceHistory::new("SHRT.ST", bars).unwrap());
        assert_eq!(trend_filter(&data).verdict, TrendVerdict::Undefined);
    }
}
