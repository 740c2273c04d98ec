use market_data::MarketData;

/// Base allocation anchor: 1.5% of the portfolio, growing by 3.75 bps per
/// win-rate point above 60%, hard-clamped to [0.1%, 5%].
const BASE_ALLOC: f64 = 0.015;
const WIN_RATE_ANCHOR: f64 = 0.60;
const WIN_RATE_SLOPE: f64 = 0.0375;
const ALLOC_MIN: f64 = 0.001;
const ALLOC_MAX: f64 = 0.05;

/// Volatility target for the V-Kelly scaling: a position is sized as if
/// the instrument ran at 2% ATR.
const TARGET_ATR_PCT: f64 = 0.02;

/// Win-rate-anchored base allocation as a portfolio fraction.
pub fn base_allocation(win_rate: f64) -> f64 {
    (BASE_ALLOC + (win_rate - WIN_RATE_ANCHOR).max(0.0) * WIN_RATE_SLOPE).clamp(ALLOC_MIN, ALLOC_MAX)
}

/// V-Kelly volatility factor: target volatility over realized ATR%,
/// clamped to [0, 1]. Calm instruments keep their full base allocation;
/// volatile ones are scaled down proportionally.
pub fn volatility_factor(atr_pct: f64) -> f64 {
    if atr_pct <= 0.0 {
        return 1.0;
    }
    (TARGET_ATR_PCT / atr_pct).clamp(0.0, 1.0)
}

/// Last ATR(14) as a fraction of the last close. 0 when the ATR window
/// is not filled yet.
pub fn atr_pct(data: &MarketData) -> f64 {
    let atr = data.atr(14);
    match atr.last() {
        Some(&v) if v.is_finite() && data.last_close() > 0.0 => v / data.last_close(),
        _ => 0.0,
    }
}

/// Hard bounds every allocation must respect, whatever path produced it.
pub fn clamp_allocation(alloc: f64) -> f64 {
    alloc.clamp(0.0, ALLOC_MAX)
}
