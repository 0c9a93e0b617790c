//! Simple and exponential moving averages.
//!
//! The `*_values` variants work on a plain scalar series so MACD and the
//! stochastic %D line can reuse them over already-computed lines. Window sums
//! are accumulated oldest-first for every index, never as a rolling sum, so
//! results do not drift with series length.

use crate::types::Bar;

use super::{IndicatorError, check_period, closes, ensure_len};

/// Simple moving average of closing prices.
///
/// `out[i]` is the mean of `close[i+1-period..=i]` for `i >= period - 1`;
/// earlier positions hold `0.0`.
pub fn sma(bars: &[Bar], period: usize) -> Result<Vec<f64>, IndicatorError> {
    check_period("sma", "period", period)?;
    sma_values(&closes(bars), period)
}

/// Exponential moving average of closing prices.
///
/// Seeded at `period - 1` with the simple average of the first `period`
/// closes, then `close * k + prev * (1 - k)` with `k = 2 / (period + 1)`.
pub fn ema(bars: &[Bar], period: usize) -> Result<Vec<f64>, IndicatorError> {
    check_period("ema", "period", period)?;
    ema_values(&closes(bars), period)
}

/// [`sma`] over an arbitrary series.
pub fn sma_values(values: &[f64], period: usize) -> Result<Vec<f64>, IndicatorError> {
    check_period("sma", "period", period)?;
    ensure_len(period, values.len())?;

    let mut out = vec![0.0; values.len()];
    for i in period - 1..values.len() {
        out[i] = window_sum(&values[i + 1 - period..=i]) / period as f64;
    }
    Ok(out)
}

/// [`ema`] over an arbitrary series.
pub fn ema_values(values: &[f64], period: usize) -> Result<Vec<f64>, IndicatorError> {
    check_period("ema", "period", period)?;
    ensure_len(period, values.len())?;

    let mut out = vec![0.0; values.len()];
    let k = 2.0 / (period as f64 + 1.0);

    out[period - 1] = window_sum(&values[..period]) / period as f64;
    for i in period..values.len() {
        out[i] = values[i] * k + out[i - 1] * (1.0 - k);
    }
    Ok(out)
}

#[inline]
pub(crate) fn window_sum(window: &[f64]) -> f64 {
    let mut sum = 0.0;
    for v in window {
        sum += v;
    }
    sum
}
