use signal_core::Bar;

/// Return val if it is finite, otherwise return default.
#[inline]
pub fn finite_or(val: f64, default: f64) -> f64 {
    if val.is_finite() {
        val
    } else {
        default
    }
}

/// Every series below is emitted at the full length of its input, with NaN
/// in the slots where the window is not yet filled. Value at index `i`
/// depends only on bars `<= i`.

/// Simple per-bar returns, close-over-close. Index 0 is NaN.
pub fn simple_returns(closes: &[f64]) -> Vec<f64> {
    let mut result = Vec::with_capacity(closes.len());
    result.push(f64::NAN);
    for i in 1..closes.len() {
        let prev = closes[i - 1];
        if prev > 0.0 {
            result.push(finite_or(closes[i] / prev - 1.0, 0.0));
        } else {
            result.push(0.0);
        }
    }
    result
}

/// Log returns, ln(close / prev_close). Index 0 is NaN.
pub fn log_returns(closes: &[f64]) -> Vec<f64> {
    let mut result = Vec::with_capacity(closes.len());
    result.push(f64::NAN);
    for i in 1..closes.len() {
        let prev = closes[i - 1];
        if prev > 0.0 && closes[i] > 0.0 {
            result.push(finite_or((closes[i] / prev).ln(), 0.0));
        } else {
            result.push(0.0);
        }
    }
    result
}

/// Rolling mean over `period` bars. The first `period - 1` slots are NaN.
pub fn rolling_mean(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 {
        return vec![f64::NAN; data.len()];
    }
    let mut result = vec![f64::NAN; data.len()];
    for i in (period - 1)..data.len() {
        let window = &data[i + 1 - period..=i];
        let sum: f64 = window.iter().sum();
        result[i] = finite_or(sum / period as f64, 0.0);
    }
    result
}

/// Rolling sample standard deviation (n - 1) over `period` bars.
/// The first `period - 1` slots are NaN.
pub fn rolling_std(data: &[f64], period: usize) -> Vec<f64> {
    if period < 2 {
        return vec![f64::NAN; data.len()];
    }
    let mut result = vec![f64::NAN; data.len()];
    for i in (period - 1)..data.len() {
        let window = &data[i + 1 - period..=i];
        let mean: f64 = window.iter().sum::<f64>() / period as f64;
        let var: f64 =
            window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (period as f64 - 1.0);
        result[i] = finite_or(var.sqrt(), 0.0);
    }
    result
}

/// Exponential Moving Average, seeded with the SMA over the first `period`
/// elements. Slots before index `period - 1` are NaN.
pub fn ema(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return vec![f64::NAN; data.len()];
    }

    let mut result = vec![f64::NAN; data.len()];
    let multiplier = 2.0 / (period as f64 + 1.0);

    let sma_seed: f64 = data[..period].iter().sum::<f64>() / period as f64;
    result[period - 1] = finite_or(sma_seed, 0.0);

    for i in period..data.len() {
        let prev = result[i - 1];
        result[i] = finite_or((data[i] - prev) * multiplier + prev, prev);
    }

    result
}

/// Relative Strength Index with Wilder smoothing. The first `period` slots
/// are NaN (one bar is consumed by the first price change).
pub fn rsi(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period + 1 {
        return vec![f64::NAN; data.len()];
    }

    let mut gains = Vec::with_capacity(data.len() - 1);
    let mut losses = Vec::with_capacity(data.len() - 1);
    for i in 1..data.len() {
        let change = data[i] - data[i - 1];
        if change > 0.0 {
            gains.push(change);
            losses.push(0.0);
        } else {
            gains.push(0.0);
            losses.push(change.abs());
        }
    }

    let mut result = vec![f64::NAN; data.len()];
    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;

    let rsi_from = |avg_gain: f64, avg_loss: f64| -> f64 {
        if avg_loss == 0.0 {
            return 100.0;
        }
        let rs = avg_gain / avg_loss;
        finite_or(100.0 - (100.0 / (1.0 + rs)), 50.0)
    };

    result[period] = rsi_from(avg_gain, avg_loss);
    for i in period..gains.len() {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;
        result[i + 1] = rsi_from(avg_gain, avg_loss);
    }

    result
}

/// Average True Range with Wilder smoothing. The first `period` slots are
/// NaN (one bar is consumed by the first true range).
pub fn atr(bars: &[Bar], period: usize) -> Vec<f64> {
    if period == 0 || bars.len() < period + 1 {
        return vec![f64::NAN; bars.len()];
    }

    let mut true_ranges = Vec::with_capacity(bars.len() - 1);
    for i in 1..bars.len() {
        let high_low = bars[i].high - bars[i].low;
        let high_close = (bars[i].high - bars[i - 1].close).abs();
        let low_close = (bars[i].low - bars[i - 1].close).abs();
        true_ranges.push(high_low.max(high_close).max(low_close));
    }

    let mut result = vec![f64::NAN; bars.len()];
    let mut value = true_ranges[..period].iter().sum::<f64>() / period as f64;
    value = finite_or(value, 0.0);
    result[period] = value;

    for (i, tr) in true_ranges.iter().enumerate().skip(period) {
        value = (value * (period - 1) as f64 + tr) / period as f64;
        result[i + 1] = finite_or(value, 0.0);
    }

    result
}

#[cfg(test)]
#[path = "indicators_tests.rs"]
mod indicators_tests;
