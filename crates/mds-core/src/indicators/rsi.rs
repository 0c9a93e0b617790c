//! Relative Strength Index with Wilder smoothing.

use crate::types::Bar;

use super::{IndicatorError, check_period, closes, ensure_len};

/// RSI over closing prices.
///
/// Needs `period + 1` bars. The first value lands at index `period`, seeded
/// from the plain mean of the first `period` gains and losses; afterwards
/// `avg = (avg * (period - 1) + new) / period`. A zero average loss reads as
/// 100 rather than a division by zero.
pub fn rsi(bars: &[Bar], period: usize) -> Result<Vec<f64>, IndicatorError> {
    check_period("rsi", "period", period)?;
    ensure_len(period.saturating_add(1), bars.len())?;

    let closes = closes(bars);
    let n = closes.len();

    let mut gains = vec![0.0; n];
    let mut losses = vec![0.0; n];
    for i in 1..n {
        let change = closes[i] - closes[i - 1];
        if change > 0.0 {
            gains[i] = change;
        } else {
            losses[i] = -change;
        }
    }

    let p = period as f64;
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        avg_gain += gains[i];
        avg_loss += losses[i];
    }
    avg_gain /= p;
    avg_loss /= p;

    let mut out = vec![0.0; n];
    out[period] = strength_index(avg_gain, avg_loss);
    for i in period + 1..n {
        avg_gain = (avg_gain * (p - 1.0) + gains[i]) / p;
        avg_loss = (avg_loss * (p - 1.0) + losses[i]) / p;
        out[i] = strength_index(avg_gain, avg_loss);
    }
    Ok(out)
}

#[inline]
fn strength_index(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}
