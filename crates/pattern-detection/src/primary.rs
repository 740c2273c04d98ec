use std::collections::BTreeSet;

use market_data::MarketData;
use signal_core::{EngineError, Priority, Situation, SituationMeta};

use crate::extrema::{argmax, local_minima};
use crate::PatternDetector;

/// Bars a local extremum needs on each side before it counts.
const CONFIRM_ORDER: usize = 3;

fn situation(
    id: &str,
    description: &str,
    indices: Vec<usize>,
    confidence: f64,
    signal_type: &str,
    volume_confirmed: bool,
) -> Situation {
    Situation {
        id: id.to_string(),
        description: description.to_string(),
        indices,
        confidence: confidence.clamp(0.0, 1.0),
        meta: SituationMeta {
            priority: Priority::Primary,
            signal_type: signal_type.to_string(),
            volume_confirmed,
        },
    }
}

/// Double bottom in a declined context.
///
/// Two local minima at most one scan window apart, within 5% of each
/// other, a reaction high of at least 2% between them, drying volume at
/// the second bottom, and a prior 90-bar high at least 10% above it.
/// Fires at the second bottom.
pub struct DoubleBottomDetector;

impl DoubleBottomDetector {
    const SCAN_WINDOWS: [usize; 5] = [40, 60, 80, 100, 120];
    const MIN_SEPARATION: usize = 10;
    const BOTTOM_TOLERANCE: f64 = 0.05;
    const REACTION_MIN: f64 = 0.02;
    const PRIOR_HIGH_LOOKBACK: usize = 90;
    const PRIOR_HIGH_MARGIN: f64 = 0.10;
}

impl PatternDetector for DoubleBottomDetector {
    fn id(&self) -> &'static str {
        "double_bottom"
    }

    fn detect(&self, data: &MarketData) -> Result<Vec<Situation>, EngineError> {
        let closes = data.closes();
        let volumes: Vec<f64> = data.bars().iter().map(|b| b.volume).collect();
        let minima = local_minima(closes, CONFIRM_ORDER);

        let mut fires = BTreeSet::new();
        let mut reaction_sum = 0.0;

        for (pos, &second) in minima.iter().enumerate() {
            for &first in &minima[..pos] {
                if second - first < Self::MIN_SEPARATION {
                    continue;
                }
                let fits_a_window = Self::SCAN_WINDOWS.iter().any(|&w| {
                    // Both bottoms inside a window ending at the second,
                    // with the prior-high context fully before it.
                    second + 1 >= w && first + w > second && second + 1 - w > 0
                });
                if !fits_a_window {
                    continue;
                }

                let l1 = closes[first];
                let l2 = closes[second];
                if ((l2 - l1) / l1).abs() >= Self::BOTTOM_TOLERANCE {
                    continue;
                }

                let reaction_idx = match argmax(closes, first + 1, second) {
                    Some(idx) => idx,
                    None => continue,
                };
                let reaction = (closes[reaction_idx] - l1) / l1;
                if reaction < Self::REACTION_MIN {
                    continue;
                }

                if volumes[second] >= volumes[first] {
                    continue;
                }

                let window_start = Self::SCAN_WINDOWS
                    .iter()
                    .filter(|&&w| second + 1 >= w && first + w > second)
                    .map(|&w| second + 1 - w)
                    .max()
                    .unwrap_or(0);
                let prior_from = window_start.saturating_sub(Self::PRIOR_HIGH_LOOKBACK);
                if prior_from >= window_start {
                    continue;
                }
                let prior_high = closes[prior_from..window_start]
                    .iter()
                    .cloned()
                    .fold(f64::MIN, f64::max);
                if prior_high < l2 * (1.0 + Self::PRIOR_HIGH_MARGIN) {
                    continue;
                }

                if fires.insert(second) {
                    reaction_sum += reaction;
                }
                break;
            }
        }

        if fires.is_empty() {
            return Ok(vec![]);
        }

        let avg_reaction = reaction_sum / fires.len() as f64;
        let confidence = 0.55 + (avg_reaction / 0.08).min(1.0) * 0.30;
        Ok(vec![situation(
            self.id(),
            "Double bottom after decline with drying volume",
            fires.into_iter().collect(),
            confidence,
            "structural_reversal",
            true,
        )])
    }
}

/// Inverse head and shoulders.
///
/// Three local minima with the middle one lowest and the shoulders within
/// 10% of each other. Fires at the right shoulder; a close above the
/// neckline within ten bars fires again as confirmation.
pub struct InverseHeadShouldersDetector;

impl InverseHeadShouldersDetector {
    const SHOULDER_TOLERANCE: f64 = 0.10;
    const MIN_LIMB_SEPARATION: usize = 5;
    const MAX_SPAN: usize = 120;
    const CONFIRM_WITHIN: usize = 10;
}

impl PatternDetector for InverseHeadShouldersDetector {
    fn id(&self) -> &'static str {
        "inverse_head_shoulders"
    }

    fn detect(&self, data: &MarketData) -> Result<Vec<Situation>, EngineError> {
        let closes = data.closes();
        let highs: Vec<f64> = data.bars().iter().map(|b| b.high).collect();
        let minima = local_minima(closes, CONFIRM_ORDER);

        let mut fires = BTreeSet::new();
        let mut confirmed_any = false;

        for triple in minima.windows(3) {
            let (ls, head, rs) = (triple[0], triple[1], triple[2]);
            if head - ls < Self::MIN_LIMB_SEPARATION || rs - head < Self::MIN_LIMB_SEPARATION {
                continue;
            }
            if rs - ls > Self::MAX_SPAN {
                continue;
            }
            if closes[head] >= closes[ls] || closes[head] >= closes[rs] {
                continue;
            }
            if ((closes[ls] - closes[rs]) / closes[ls]).abs() >= Self::SHOULDER_TOLERANCE {
                continue;
            }

            let left_peak = argmax(&highs, ls + 1, head).map(|i| highs[i]).unwrap_or(0.0);
            let right_peak = argmax(&highs, head + 1, rs).map(|i| highs[i]).unwrap_or(0.0);
            let neckline = left_peak.max(right_peak);
            if neckline <= 0.0 {
                continue;
            }

            fires.insert(rs);

            // The confirmation fire waits the same number of bars as a
            // minimum does, so fires always appear in index order as the
            // series grows.
            let confirm_to = (rs + 1 + Self::CONFIRM_WITHIN)
                .min(closes.len().saturating_sub(CONFIRM_ORDER));
            if let Some(j) = (rs + 1..confirm_to).find(|&j| closes[j] > neckline) {
                fires.insert(j);
                confirmed_any = true;
            }
        }

        if fires.is_empty() {
            return Ok(vec![]);
        }

        let confidence = if confirmed_any { 0.80 } else { 0.60 };
        Ok(vec![situation(
            self.id(),
            "Inverse head and shoulders",
            fires.into_iter().collect(),
            confidence,
            "structural_reversal",
            false,
        )])
    }
}

/// Bull flag after a decline.
///
/// A decline of at least 15% from a recent peak followed by a tight
/// sideways channel of 10 to 30 bars whose realized volatility is below
/// the decline leg's. Fires at the end of the channel.
pub struct BullFlagDetector;

impl BullFlagDetector {
    const MIN_DECLINE: f64 = 0.15;
    const MIN_CHANNEL: usize = 10;
    const MAX_CHANNEL: usize = 30;
    const PEAK_LOOKBACK: usize = 60;
    const MAX_CHANNEL_RANGE: f64 = 0.10;
}

impl PatternDetector for BullFlagDetector {
    fn id(&self) -> &'static str {
        "bull_flag"
    }

    fn detect(&self, data: &MarketData) -> Result<Vec<Situation>, EngineError> {
        let closes = data.closes();
        let returns = data.returns();
        let mut fires = BTreeSet::new();

        for end in (Self::MIN_CHANNEL + Self::PEAK_LOOKBACK)..closes.len() {
            for len in Self::MIN_CHANNEL..=Self::MAX_CHANNEL {
                if end + 1 < len + Self::PEAK_LOOKBACK {
                    continue;
                }
                let flag_start = end + 1 - len;

                let peak_from = flag_start - Self::PEAK_LOOKBACK;
                let peak_idx = match argmax(closes, peak_from, flag_start) {
                    Some(i) => i,
                    None => continue,
                };
                let peak = closes[peak_idx];
                let decline = (closes[flag_start] - peak) / peak;
                if decline > -Self::MIN_DECLINE {
                    continue;
                }

                let channel = &closes[flag_start..=end];
                let low = channel.iter().cloned().fold(f64::MAX, f64::min);
                let high = channel.iter().cloned().fold(f64::MIN, f64::max);
                if low <= 0.0 || (high - low) / low > Self::MAX_CHANNEL_RANGE {
                    continue;
                }

                let channel_vol = realized_vol(&returns[flag_start..=end]);
                let decline_vol = realized_vol(&returns[peak_idx.max(1)..flag_start]);
                if channel_vol <= 0.0 || decline_vol <= 0.0 || channel_vol >= decline_vol {
                    continue;
                }

                fires.insert(end);
                break;
            }
        }

        if fires.is_empty() {
            return Ok(vec![]);
        }

        Ok(vec![situation(
            self.id(),
            "Bull flag consolidation after a 15% decline",
            fires.into_iter().collect(),
            0.60,
            "consolidation_reversal",
            false,
        )])
    }
}

fn realized_vol(returns: &[f64]) -> f64 {
    let finite: Vec<f64> = returns.iter().cloned().filter(|r| r.is_finite()).collect();
    if finite.len() < 2 {
        return 0.0;
    }
    let mean = finite.iter().sum::<f64>() / finite.len() as f64;
    let var =
        finite.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (finite.len() as f64 - 1.0);
    var.sqrt()
}

/// Three or more successive local minima, each strictly higher than the
/// previous. Fires at every minimum from the third of a run onward.
pub struct HigherLowsDetector;

impl PatternDetector for HigherLowsDetector {
    fn id(&self) -> &'static str {
        "higher_lows"
    }

    fn detect(&self, data: &MarketData) -> Result<Vec<Situation>, EngineError> {
        let closes = data.closes();
        let minima = local_minima(closes, CONFIRM_ORDER);

        let mut fires = Vec::new();
        let mut run = 1usize;
        for w in minima.windows(2) {
            if closes[w[1]] > closes[w[0]] {
                run += 1;
                if run >= 3 {
                    fires.push(w[1]);
                }
            } else {
                run = 1;
            }
        }

        if fires.is_empty() {
            return Ok(vec![]);
        }

        Ok(vec![situation(
            self.id(),
            "Sequence of rising local lows",
            fires,
            0.55,
            "structural_reversal",
            false,
        )])
    }
}

/// New 252-bar low reclaimed: price sets a multi-period low, then closes
/// back above EMA(20) within five bars. Fires at the reclaim close.
pub struct LowReclaimDetector;

impl LowReclaimDetector {
    const LOW_LOOKBACK: usize = 252;
    const RECLAIM_WITHIN: usize = 5;
    const EMA_PERIOD: usize = 20;
}

impl PatternDetector for LowReclaimDetector {
    fn id(&self) -> &'static str {
        "low_reclaim"
    }

    fn detect(&self, data: &MarketData) -> Result<Vec<Situation>, EngineError> {
        let closes = data.closes();
        if closes.len() <= Self::LOW_LOOKBACK {
            return Ok(vec![]);
        }
        let ema20 = data.ema(Self::EMA_PERIOD);

        let mut fires = BTreeSet::new();
        for j in Self::LOW_LOOKBACK..closes.len() {
            let window_low = closes[j + 1 - Self::LOW_LOOKBACK..=j]
                .iter()
                .cloned()
                .fold(f64::MAX, f64::min);
            if closes[j] > window_low {
                continue;
            }

            let reclaim_to = (j + 1 + Self::RECLAIM_WITHIN).min(closes.len());
            if let Some(k) = (j + 1..reclaim_to)
                .find(|&k| ema20[k].is_finite() && closes[k] > ema20[k])
            {
                fires.insert(k);
            }
        }

        if fires.is_empty() {
            return Ok(vec![]);
        }

        Ok(vec![situation(
            self.id(),
            "252-bar low reclaimed above EMA(20)",
            fires.into_iter().collect(),
            0.60,
            "capitulation_reversal",
            false,
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use signal_core::{Bar, PriceHistory};

    fn data_from(closes: Vec<f64>, volumes: Vec<f64>) -> MarketData {
        let bars: Vec<Bar> = closes
            .iter()
            .zip(volumes.iter())
            .enumerate()
            .map(|(i, (&close, &volume))| Bar {
                timestamp: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
                    + chrono::Duration::days(i as i64),
                open: close,
                high: close * 1.005,
                low: close * 0.995,
                close,
                volume,
            })
            .collect();
        MarketData::new(PriceHistory::new("TEST.ST", bars).unwrap())
    }

    /// 90 flat bars at a high level, a slide down, two bottoms with a
    /// reaction between them, volume drying at the second.
    fn double_bottom_fixture() -> MarketData {
        let mut closes = vec![100.0; 95];
        // Decline into the first bottom
        for i in 0..20 {
            closes.push(100.0 - 2.0 * (i + 1) as f64); // down to 60
        }
        // First bottom around 60 (v-shape)
        closes.extend([59.0, 58.0, 59.0, 60.5]);
        // Reaction up
        closes.extend([62.0, 64.0, 65.0, 64.0, 63.0, 62.0, 61.5, 61.0, 60.5, 60.0]);
        // Second bottom slightly below first, then recovery
        closes.extend([59.5, 58.5, 59.5, 61.0, 62.0, 63.0, 64.0, 65.0]);

        let mut volumes = vec![1_000_000.0; closes.len()];
        // Second bottom on lower volume than the first
        let n = closes.len();
        for v in volumes.iter_mut().take(n).skip(n - 10) {
            *v = 400_000.0;
        }
        data_from(closes, volumes)
    }

    #[test]
    fn double_bottom_fires_at_second_bottom() {
        let data = double_bottom_fixture();
        let result = DoubleBottomDetector.detect(&data).unwrap();

        assert_eq!(result.len(), 1);
        let situation = &result[0];
        assert!(!situation.indices.is_empty());
        assert_eq!(situation.meta.priority, Priority::Primary);
        assert!(situation.meta.volume_confirmed);
        // The fire must land on the second bottom, not the first
        let fire = situation.indices[0];
        assert!(fire > 120, "fire index {fire} should be in the second bottom");
    }

    #[test]
    fn double_bottom_requires_volume_dry_up() {
        let data = double_bottom_fixture();
        // Same shape but second-bottom volume higher than the first
        let closes: Vec<f64> = data.closes().to_vec();
        let volumes = vec![2_000_000.0; closes.len()];
        let data = data_from(closes, volumes);

        // Uniform volume means volume[l2] == volume[l1]; no fire
        let result = DoubleBottomDetector.detect(&data).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn double_bottom_ignores_flat_series() {
        let data = data_from(vec![50.0; 300], vec![1_000.0; 300]);
        assert!(DoubleBottomDetector.detect(&data).unwrap().is_empty());
    }

    fn inverse_hs_fixture() -> MarketData {
        let mut closes = vec![80.0; 10];
        // Left shoulder down to 70
        closes.extend([78.0, 75.0, 72.0, 70.0, 72.0, 75.0, 77.0]);
        // Head down to 62
        closes.extend([74.0, 70.0, 66.0, 62.0, 65.0, 70.0, 76.0]);
        // Right shoulder down to 71
        closes.extend([75.0, 73.0, 71.0, 73.0, 75.0, 76.0]);
        // Breakout above the neckline
        closes.extend([78.0, 80.0, 82.0, 83.0, 84.0]);
        let volumes = vec![500_000.0; closes.len()];
        data_from(closes, volumes)
    }

    #[test]
    fn inverse_hs_fires_and_confirms() {
        let data = inverse_hs_fixture();
        let result = InverseHeadShouldersDetector.detect(&data).unwrap();

        assert_eq!(result.len(), 1);
        let situation = &result[0];
        // Formation fire plus a confirmation fire
        assert!(situation.indices.len() >= 2);
        assert!(situation.confidence >= 0.75);
    }

    #[test]
    fn bull_flag_fires_at_channel_end() {
        let mut closes = vec![100.0; 70];
        // Sharp decline to 80
        for i in 0..10 {
            closes.push(100.0 - 2.0 * (i + 1) as f64);
        }
        // Tight channel around 80
        for i in 0..14 {
            closes.push(if i % 2 == 0 { 80.3 } else { 79.9 });
        }
        let data = data_from(closes.clone(), vec![1_000.0; closes.len()]);

        let result = BullFlagDetector.detect(&data).unwrap();
        assert_eq!(result.len(), 1);
        assert!(result[0].indices.iter().all(|&i| i >= 80));
    }

    #[test]
    fn bull_flag_needs_a_real_decline() {
        // Same channel but only a 5% dip before it
        let mut closes = vec![100.0; 70];
        for i in 0..10 {
            closes.push(100.0 - 0.5 * (i + 1) as f64);
        }
        for i in 0..14 {
            closes.push(if i % 2 == 0 { 95.2 } else { 94.8 });
        }
        let data = data_from(closes.clone(), vec![1_000.0; closes.len()]);

        assert!(BullFlagDetector.detect(&data).unwrap().is_empty());
    }

    #[test]
    fn higher_lows_needs_three_rising_minima() {
        // Three v-bottoms at rising levels, padded so the first is confirmable
        let mut closes = vec![60.0, 59.0];
        for base in [50.0, 53.0, 56.0] {
            closes.extend([base + 6.0, base + 3.0, base, base + 3.0, base + 6.0, base + 7.0]);
        }
        closes.extend([64.0, 65.0, 66.0, 67.0]);
        let data = data_from(closes.clone(), vec![1_000.0; closes.len()]);

        let result = HigherLowsDetector.detect(&data).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].indices.len(), 1); // only the third minimum qualifies
    }

    #[test]
    fn low_reclaim_fires_after_new_low() {
        // Long drift down to a fresh 252-bar low, then a sharp reclaim
        let mut closes: Vec<f64> = (0..260).map(|i| 200.0 - 0.5 * i as f64).collect();
        let bottom = *closes.last().unwrap();
        closes.extend([bottom + 8.0, bottom + 12.0, bottom + 15.0, bottom + 16.0]);
        let data = data_from(closes.clone(), vec![1_000.0; closes.len()]);

        let result = LowReclaimDetector.detect(&data).unwrap();
        assert_eq!(result.len(), 1);
        assert!(result[0].indices.iter().all(|&i| i >= 260));
    }

    #[test]
    fn detectors_are_prefix_stable() {
        let data = double_bottom_fixture();
        let full = DoubleBottomDetector.detect(&data).unwrap();

        let closes = data.closes();
        let truncated = data_from(
            closes[..closes.len() - 4].to_vec(),
            data.bars()[..closes.len() - 4]
                .iter()
                .map(|b| b.volume)
                .collect(),
        );
        let partial = DoubleBottomDetector.detect(&truncated).unwrap();

        if let (Some(full), Some(partial)) = (full.first(), partial.first()) {
            assert!(full.indices.starts_with(&partial.indices));
        }
    }
}
