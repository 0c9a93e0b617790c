//! Typed error definitions for the market data service.
//!
//! Each subsystem has its own error enum next to the code that raises it
//! ([`IndicatorError`], [`StoreError`], [`CacheError`]). [`MdsError`] wraps
//! them for callers that cross subsystem boundaries. All variants implement
//! `std::error::Error` via `thiserror`, so they convert into `anyhow::Error`
//! at the binary edge.

use thiserror::Error;

use crate::cache::CacheError;
use crate::indicators::IndicatorError;
use crate::store::StoreError;

/// Umbrella error for the market data service.
#[derive(Debug, Error)]
pub enum MdsError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// Indicator computation or dispatch error.
    #[error(transparent)]
    Indicator(#[from] IndicatorError),

    /// Persistent store error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Cache / pub-sub error.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Outbound message could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
