//! # mds-core
//!
//! Core crate for the market data service, providing:
//!
//! - **Types** (`types`): bars, ticks, indicator values, stocks, timeframes
//! - **Configuration** (`config`): JSON config deserialization
//! - **Error types** (`error`): umbrella `MdsError` via thiserror
//! - **Indicators** (`indicators`): SMA, EMA, RSI, MACD, Bollinger, Stochastic, ATR
//! - **Store** (`store`): persistent store contract + in-memory implementation
//! - **Cache** (`cache`): TTL cache and pub/sub contract + in-memory implementation
//! - **Time utilities** (`time_util`): epoch-millisecond helpers
//! - **Logging** (`logging`): tracing-based structured logging

pub mod cache;
pub mod config;
pub mod error;
pub mod indicators;
pub mod logging;
pub mod store;
pub mod time_util;
pub mod types;

// Re-export types at crate root for convenience.
pub use types::*;
