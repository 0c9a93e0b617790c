//! Bollinger Bands (population standard deviation).

use serde::Serialize;

use crate::types::Bar;

use super::moving_average::sma;
use super::{IndicatorError, check_period};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Bands at `middle ± deviation * σ`, with `σ` taken over the same trailing
/// window as the middle SMA and divided by `period` (not `period - 1`).
pub fn bollinger_bands(
    bars: &[Bar],
    period: usize,
    deviation: f64,
) -> Result<BollingerBands, IndicatorError> {
    check_period("bollinger_bands", "period", period)?;
    let middle = sma(bars, period)?;

    let n = bars.len();
    let mut upper = vec![0.0; n];
    let mut lower = vec![0.0; n];

    for i in period - 1..n {
        let mut sum_squares = 0.0;
        for bar in &bars[i + 1 - period..=i] {
            let diff = bar.close - middle[i];
            sum_squares += diff * diff;
        }
        let std_dev = (sum_squares / period as f64).sqrt();

        upper[i] = middle[i] + deviation * std_dev;
        lower[i] = middle[i] - deviation * std_dev;
    }

    Ok(BollingerBands { upper, middle, lower })
}
