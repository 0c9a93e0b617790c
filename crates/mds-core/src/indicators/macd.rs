//! Moving Average Convergence Divergence.

use serde::Serialize;

use crate::types::Bar;

use super::moving_average::ema_values;
use super::{IndicatorError, check_period, closes, ensure_len};

/// MACD, signal and histogram lines, all aligned with the input bars.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MacdSeries {
    /// `EMA(fast) - EMA(slow)`, valid from `slow - 1`.
    pub macd: Vec<f64>,
    /// `EMA(signal)` of the valid MACD region, valid from `slow + signal - 2`.
    pub signal: Vec<f64>,
    /// `macd - signal` where both are valid.
    pub histogram: Vec<f64>,
}

/// MACD over closing prices.
///
/// The signal line is an EMA of the MACD line restricted to its valid region
/// (from `slow - 1`), shifted back into the input index space.
pub fn macd(
    bars: &[Bar],
    fast: usize,
    slow: usize,
    signal: usize,
) -> Result<MacdSeries, IndicatorError> {
    check_period("macd", "fastPeriod", fast)?;
    check_period("macd", "slowPeriod", slow)?;
    check_period("macd", "signalPeriod", signal)?;
    ensure_len(slow, bars.len())?;

    let closes = closes(bars);
    let n = closes.len();

    let fast_ema = ema_values(&closes, fast)?;
    let slow_ema = ema_values(&closes, slow)?;

    let offset = slow - 1;
    let mut macd_line = vec![0.0; n];
    for i in offset..n {
        macd_line[i] = fast_ema[i] - slow_ema[i];
    }

    ensure_len(offset.saturating_add(signal), n)?;
    let signal_ema = ema_values(&macd_line[offset..], signal)?;

    let mut signal_line = vec![0.0; n];
    signal_line[offset..].copy_from_slice(&signal_ema);

    let mut histogram = vec![0.0; n];
    for i in slow + signal - 2..n {
        histogram[i] = macd_line[i] - signal_line[i];
    }

    Ok(MacdSeries { macd: macd_line, signal: signal_line, histogram })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::bars_from_closes;
    use crate::indicators::moving_average::ema;

    fn wave(n: usize) -> Vec<Bar> {
        let closes: Vec<f64> =
            (0..n).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0 + i as f64 * 0.3).collect();
        bars_from_closes(&closes)
    }

    #[test]
    fn lines_are_aligned_and_warm_up_is_zero() {
        let bars = wave(40);
        let out = macd(&bars, 3, 6, 4).unwrap();

        assert_eq!(out.macd.len(), 40);
        assert_eq!(out.signal.len(), 40);
        assert_eq!(out.histogram.len(), 40);

        assert!(out.macd[..5].iter().all(|v| *v == 0.0));
        assert!(out.signal[..8].iter().all(|v| *v == 0.0));
        assert!(out.histogram[..8].iter().all(|v| *v == 0.0));
        assert!(out.signal[8] != 0.0);
    }

    #[test]
    fn macd_is_fast_minus_slow() {
        let bars = wave(30);
        let out = macd(&bars, 3, 6, 4).unwrap();
        let fast = ema(&bars, 3).unwrap();
        let slow = ema(&bars, 6).unwrap();
        for i in 5..30 {
            assert_eq!(out.macd[i], fast[i] - slow[i]);
        }
    }

    #[test]
    fn signal_matches_ema_of_valid_macd_region() {
        let bars = wave(30);
        let out = macd(&bars, 3, 6, 4).unwrap();

        // Same values as feeding the valid MACD region back in as closes.
        let region = bars_from_closes(&out.macd[5..]);
        let reference = ema(&region, 4).unwrap();
        for (i, v) in reference.iter().enumerate() {
            assert_eq!(out.signal[5 + i], *v);
        }

        let seed = out.macd[5..9].iter().sum::<f64>() / 4.0;
        assert!((out.signal[8] - seed).abs() < 1e-12);
        assert!((out.histogram[8] - (out.macd[8] - out.signal[8])).abs() < 1e-12);
    }

    #[test]
    fn shorter_than_slow_period_fails() {
        let bars = wave(5);
        let err = macd(&bars, 3, 6, 4).unwrap_err();
        assert_eq!(err, IndicatorError::InsufficientData { need: 6, got: 5 });
    }

    #[test]
    fn signal_region_too_short_fails() {
        // 7 bars: MACD valid on 2 points, signal needs 4.
        let bars = wave(7);
        let err = macd(&bars, 3, 6, 4).unwrap_err();
        assert_eq!(err, IndicatorError::InsufficientData { need: 9, got: 7 });
    }
}
