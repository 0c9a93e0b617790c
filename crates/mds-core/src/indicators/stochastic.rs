//! Stochastic oscillator (%K / %D).

use serde::Serialize;

use crate::types::Bar;

use super::moving_average::sma_values;
use super::{IndicatorError, check_period, ensure_len};

/// Value of %K when the window's high equals its low.
pub const DEGENERATE_RANGE_K: f64 = 50.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StochasticSeries {
    /// %K, valid from `k_period - 1`.
    pub k: Vec<f64>,
    /// SMA(`d_period`) of the valid %K region, valid from `k_period + d_period - 2`.
    pub d: Vec<f64>,
}

/// Stochastic oscillator over the trailing `k_period` window.
pub fn stochastic(
    bars: &[Bar],
    k_period: usize,
    d_period: usize,
) -> Result<StochasticSeries, IndicatorError> {
    check_period("stochastic", "kPeriod", k_period)?;
    check_period("stochastic", "dPeriod", d_period)?;
    ensure_len(k_period, bars.len())?;

    let n = bars.len();
    let mut k = vec![0.0; n];

    for i in k_period - 1..n {
        let window = &bars[i + 1 - k_period..=i];
        let mut highest = window[0].high;
        let mut lowest = window[0].low;
        for bar in &window[1..] {
            if bar.high > highest {
                highest = bar.high;
            }
            if bar.low < lowest {
                lowest = bar.low;
            }
        }

        k[i] = if highest == lowest {
            DEGENERATE_RANGE_K
        } else {
            (bars[i].close - lowest) / (highest - lowest) * 100.0
        };
    }

    let offset = k_period - 1;
    ensure_len(offset.saturating_add(d_period), n)?;
    let d_region = sma_values(&k[offset..], d_period)?;

    let mut d = vec![0.0; n];
    d[offset..].copy_from_slice(&d_region);

    Ok(StochasticSeries { k, d })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_bars;
    use crate::types::Timeframe;

    fn flat(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| Bar {
                timestamp: i as u64 * 60_000,
                symbol: "FLAT".into(),
                open: 50.0,
                high: 50.0,
                low: 50.0,
                close: 50.0,
                volume: 1.0,
                timeframe: Timeframe::M1,
            })
            .collect()
    }

    #[test]
    fn k_matches_window_range() {
        let bars = test_bars();
        let out = stochastic(&bars, 5, 3).unwrap();

        assert_eq!(out.k.len(), bars.len());
        // Window 0..=4: lowest low 98, highest high 115, close 113.
        let expected = (113.0 - 98.0) / (115.0 - 98.0) * 100.0;
        assert!((out.k[4] - expected).abs() < 1e-9);
        for v in &out.k[4..] {
            assert!((0.0..=100.0).contains(v));
        }
    }

    #[test]
    fn d_is_sma_of_k_realigned() {
        let bars = test_bars();
        let out = stochastic(&bars, 5, 3).unwrap();

        assert!(out.d[..6].iter().all(|v| *v == 0.0));
        let expected = (out.k[4] + out.k[5] + out.k[6]) / 3.0;
        assert!((out.d[6] - expected).abs() < 1e-9);
    }

    #[test]
    fn degenerate_range_reads_fifty() {
        let out = stochastic(&flat(6), 3, 2).unwrap();
        assert!(out.k[2..].iter().all(|v| *v == DEGENERATE_RANGE_K));
        assert!(out.d[3..].iter().all(|v| *v == DEGENERATE_RANGE_K));
    }

    #[test]
    fn d_region_too_short_fails() {
        let bars = test_bars();
        let err = stochastic(&bars[..6], 5, 3).unwrap_err();
        assert_eq!(err, IndicatorError::InsufficientData { need: 7, got: 6 });
        assert!(stochastic(&bars[..4], 5, 3).is_err());
    }
}
