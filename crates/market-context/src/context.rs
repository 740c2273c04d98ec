use market_data::MarketData;
use serde::{Deserialize, Serialize};

/// Result of the mean-reversion eligibility gate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ContextCheck {
    /// Signed distance of the last close from the trailing high; a valid
    /// context is at least `min_decline_pct` below it.
    pub decline_from_high: f64,
    pub context_valid: bool,
}

const HIGH_LOOKBACK: usize = 90;

/// The bottom-fishing discipline: no entry at or near a 90-bar high.
/// An instrument is only eligible when its last close has declined at
/// least `min_decline_pct` from the trailing 90-bar closing high.
pub fn check_context(data: &MarketData, min_decline_pct: f64) -> ContextCheck {
    let closes = data.closes();
    let from = closes.len().saturating_sub(HIGH_LOOKBACK);
    let trailing_high = closes[from..].iter().cloned().fold(f64::MIN, f64::max);

    let last = data.last_close();
    let decline_from_high = if trailing_high > 0.0 {
        (last - trailing_high) / trailing_high
    } else {
        0.0
    };

    ContextCheck {
        decline_from_high,
        context_valid: decline_from_high <= -min_decline_pct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};
    use signal_core::{Bar, PriceHistory};

    fn data_from(closes: Vec<f64>) -> MarketData {
        let bars: Vec<Bar> = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                timestamp: Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap()
                    + chrono::Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
            })
            .collect();
        MarketData::new(PriceHistory::new("CTX.ST", bars).unwrap())
    }

    #[test]
    fn declined_instrument_is_eligible() {
        let mut closes = vec![100.0; 80];
        closes.extend(vec![85.0; 20]); // 15% below the trailing high
        let check = check_context(&data_from(closes), 0.10);

        assert!(check.context_valid);
        assert_relative_eq!(check.decline_from_high, -0.15, epsilon = 1e-12);
    }

    #[test]
    fn instrument_at_its_high_is_rejected() {
        let closes: Vec<f64> = (0..120).map(|i| 100.0 + i as f64).collect();
        let check = check_context(&data_from(closes), 0.10);

        assert!(!check.context_valid);
        assert_relative_eq!(check.decline_from_high, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn boundary_decline_counts() {
        let mut closes = vec![100.0; 89];
        closes.push(90.0); // exactly -10%
        let check = check_context(&data_from(closes), 0.10);

        assert!(check.context_valid);
    }

    #[test]
    fn old_highs_outside_the_window_are_ignored() {
        // A high 150 bars ago followed by a flat stretch near the bottom:
        // within the last 90 bars there is no decline left.
        let mut closes = vec![200.0; 30];
        closes.extend(vec![100.0; 120]);
        let check = check_context(&data_from(closes), 0.10);

        assert!(!check.context_valid);
    }
}
