use market_data::MarketData;
use serde::{Deserialize, Serialize};
use signal_core::{MarketRegime, VolatilityRegime};

/// Macro inputs supplied to the regime classifier alongside breadth.
/// Both are spreads in percentage points.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MacroSignals {
    /// 10y minus 2y government yield. Negative = inverted curve.
    pub yield_curve_spread: f64,
    /// High-yield credit spread over the risk-free curve.
    pub credit_spread: f64,
}

impl Default for MacroSignals {
    fn default() -> Self {
        Self {
            yield_curve_spread: 1.0,
            credit_spread: 3.5,
        }
    }
}

/// Classification result with the inputs that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeAssessment {
    pub regime: MarketRegime,
    /// Fraction of the universe trading above its EMA(200).
    pub breadth: f64,
    pub macro_signals: MacroSignals,
    pub reasoning: String,
}

/// Rule-based market regime from universe breadth and macro signals.
///
/// Breadth carries most of the weight; the macro signals can only pull
/// the classification down, never up.
pub fn classify_market_regime(breadth: f64, macro_signals: MacroSignals) -> RegimeAssessment {
    let breadth = breadth.clamp(0.0, 1.0);

    let mut regime = if breadth >= 0.55 {
        MarketRegime::Healthy
    } else if breadth >= 0.40 {
        MarketRegime::Cautious
    } else if breadth >= 0.25 {
        MarketRegime::Stressed
    } else {
        MarketRegime::Crisis
    };

    let curve_inverted = macro_signals.yield_curve_spread < 0.0;
    let credit_blown_out = macro_signals.credit_spread > 6.0;

    // Each stressed macro signal downgrades one notch.
    let downgrades = curve_inverted as usize + credit_blown_out as usize;
    for _ in 0..downgrades {
        regime = match regime {
            MarketRegime::Healthy => MarketRegime::Cautious,
            MarketRegime::Cautious => MarketRegime::Stressed,
            MarketRegime::Stressed | MarketRegime::Crisis => MarketRegime::Crisis,
        };
    }

    let reasoning = format!(
        "{} (breadth {:.0}%, curve {:+.2}, credit {:.2})",
        regime.name(),
        breadth * 100.0,
        macro_signals.yield_curve_spread,
        macro_signals.credit_spread
    );

    RegimeAssessment {
        regime,
        breadth,
        macro_signals,
        reasoning,
    }
}

/// Fraction of instruments whose last close sits above their EMA(200).
/// Instruments whose EMA(200) is not yet defined are skipped.
pub fn universe_breadth<'a, I>(universe_data: I) -> f64
where
    I: IntoIterator<Item = &'a MarketData>,
{
    let mut counted = 0usize;
    let mut above = 0usize;
    for data in universe_data {
        let ema200 = data.ema(200);
        match ema200.last() {
            Some(&v) if v.is_finite() => {
                counted += 1;
                if data.last_close() > v {
                    above += 1;
                }
            }
            _ => {}
        }
    }
    if counted == 0 {
        0.0
    } else {
        above as f64 / counted as f64
    }
}

const RECENT_VOL_BARS: usize = 10;
const FULL_VOL_BARS: usize = 120;

/// Volatility regime from the ratio of recent to full-period realized
/// volatility of an index proxy. Drives the slippage multiplier.
pub fn classify_volatility_regime(index: &MarketData) -> VolatilityRegime {
    let returns = index.returns();
    let finite: Vec<f64> = returns.iter().cloned().filter(|r| r.is_finite()).collect();
    if finite.len() < RECENT_VOL_BARS * 2 {
        return VolatilityRegime::Stable;
    }

    let full_from = finite.len().saturating_sub(FULL_VOL_BARS);
    let full = std_dev(&finite[full_from..]);
    let recent = std_dev(&finite[finite.len() - RECENT_VOL_BARS..]);

    if full <= 0.0 {
        return VolatilityRegime::Stable;
    }

    let ratio = recent / full;
    if ratio < 0.6 {
        VolatilityRegime::Contracting
    } else if ratio < 1.5 {
        VolatilityRegime::Stable
    } else if ratio < 2.5 {
        VolatilityRegime::Expanding
    } else {
        VolatilityRegime::Explosive
    }
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() as f64 - 1.0);
    var.sqrt()
}
