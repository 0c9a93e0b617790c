//! Average True Range.

use crate::types::Bar;

use super::{IndicatorError, check_period, ensure_len};

/// ATR with Wilder smoothing.
///
/// True range is defined from index 1 onwards, so the first value lands at
/// index `period` (the mean of `TR[1..=period]`) and at least `period + 1`
/// bars are needed.
pub fn atr(bars: &[Bar], period: usize) -> Result<Vec<f64>, IndicatorError> {
    check_period("atr", "period", period)?;
    ensure_len(period.saturating_add(1), bars.len())?;

    let n = bars.len();
    let mut tr = vec![0.0; n];
    for i in 1..n {
        tr[i] = true_range(&bars[i], bars[i - 1].close);
    }

    let p = period as f64;
    let mut out = vec![0.0; n];

    let mut seed = 0.0;
    for v in &tr[1..=period] {
        seed += v;
    }
    out[period] = seed / p;

    for i in period + 1..n {
        out[i] = (out[i - 1] * (p - 1.0) + tr[i]) / p;
    }
    Ok(out)
}

#[inline]
fn true_range(bar: &Bar, prev_close: f64) -> f64 {
    let hl = bar.high - bar.low;
    let hc = (bar.high - prev_close).abs();
    let lc = (bar.low - prev_close).abs();
    hl.max(hc).max(lc)
}
