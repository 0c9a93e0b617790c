//! Technical indicator engine.
//!
//! Every indicator is a pure function over a bar slice. Outputs are aligned
//! with the input (same length), with positions before the warm-up window
//! left at `0.0`. Too-short input fails with [`IndicatorError::InsufficientData`]
//! and never yields a partial series.

pub mod atr;
pub mod bollinger;
pub mod dispatch;
pub mod macd;
pub mod moving_average;
pub mod rsi;
pub mod stochastic;

pub use atr::atr;
pub use bollinger::{BollingerBands, bollinger_bands};
pub use dispatch::{
    BollingerParams, IndicatorDefaults, IndicatorKind, IndicatorOutput, IndicatorParams,
    MacdParams, StochasticParams, compute, compute_named,
};
pub use macd::{MacdSeries, macd};
pub use moving_average::{ema, ema_values, sma, sma_values};
pub use rsi::rsi;
pub use stochastic::{StochasticSeries, stochastic};

use crate::types::Bar;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IndicatorError {
    #[error("insufficient data: need {need} bars, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("unknown indicator: {0}")]
    UnknownIndicator(String),

    #[error("{indicator}: missing parameter {parameter}")]
    MissingParameter { indicator: &'static str, parameter: &'static str },

    #[error("{indicator}: invalid parameter {parameter}: {reason}")]
    InvalidParameter { indicator: &'static str, parameter: &'static str, reason: String },
}

/// Rejects a zero period before it reaches a division.
pub(crate) fn check_period(
    indicator: &'static str,
    parameter: &'static str,
    period: usize,
) -> Result<(), IndicatorError> {
    if period == 0 {
        return Err(IndicatorError::InvalidParameter {
            indicator,
            parameter,
            reason: "must be at least 1".into(),
        });
    }
    Ok(())
}

/// `need` saturates rather than wraps, so an oversized period reads as
/// missing data.
#[inline]
pub(crate) fn ensure_len(need: usize, got: usize) -> Result<(), IndicatorError> {
    if got < need {
        return Err(IndicatorError::InsufficientData { need, got });
    }
    Ok(())
}

pub(crate) fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

/// Ten rising daily bars shared by the indicator tests.
#[cfg(test)]
pub(crate) fn test_bars() -> Vec<Bar> {
    use crate::types::Timeframe;

    const OPEN: [f64; 10] = [100.0, 102.0, 106.0, 108.0, 110.0, 113.0, 115.0, 117.0, 118.0, 120.0];
    const HIGH: [f64; 10] = [105.0, 108.0, 110.0, 112.0, 115.0, 117.0, 119.0, 120.0, 122.0, 124.0];
    const LOW: [f64; 10] = [98.0, 101.0, 104.0, 106.0, 109.0, 111.0, 114.0, 116.0, 117.0, 119.0];
    const CLOSE: [f64; 10] = [102.0, 106.0, 108.0, 110.0, 113.0, 115.0, 117.0, 118.0, 120.0, 122.0];

    let base = 1_704_067_200_000u64;
    (0..10)
        .map(|i| Bar {
            timestamp: base + i as u64 * Timeframe::D1.step_ms(),
            symbol: "AAPL".into(),
            open: OPEN[i],
            high: HIGH[i],
            low: LOW[i],
            close: CLOSE[i],
            volume: 1_000_000.0 + i as f64 * 10_000.0,
            timeframe: Timeframe::D1,
        })
        .collect()
}

/// Bars whose OHLC all equal the given closes.
#[cfg(test)]
pub(crate) fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
    use crate::types::Timeframe;

    closes
        .iter()
        .enumerate()
        .map(|(i, c)| Bar {
            timestamp: i as u64 * 60_000,
            symbol: "TEST".into(),
            open: *c,
            high: *c,
            low: *c,
            close: *c,
            volume: 1.0,
            timeframe: Timeframe::M1,
        })
        .collect()
}
