//! Core data types: bars, ticks, indicator values, timeframes.

pub mod market_data;
pub mod timeframe;

pub use market_data::*;
pub use timeframe::*;
