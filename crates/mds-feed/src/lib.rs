//! # mds-feed
//!
//! Market data providers and the manager that fails over between them.
//!
//! ## Architecture
//!
//! Every source implements [`MarketDataProvider`]. The
//! [`manager::ProviderManager`] holds them by name, tracks one active
//! provider, and routes quote/history requests to the active provider or,
//! when it is disconnected, to the first connected one. New sources are
//! added through [`registry::create_provider`] without touching the manager.
//!
//! ## Modules
//!
//! - [`manager`]: registry + failover routing
//! - [`producer`]: cancellable periodic tick loops shared by providers
//! - [`mock`]: synthetic quotes, bars and ticks
//! - [`store_provider`]: quotes and history read back from a [`MarketStore`]
//! - [`registry`]: factory from provider config
//!
//! [`MarketStore`]: mds_core::store::MarketStore

pub mod manager;
pub mod mock;
pub mod producer;
pub mod registry;
pub mod store_provider;

use std::sync::Arc;

use async_trait::async_trait;
use mds_core::store::StoreError;
use mds_core::{Bar, Tick, Timeframe};
use thiserror::Error;

pub use manager::ProviderManager;
pub use mock::MockProvider;
pub use store_provider::StoreProvider;

/// Callback invoked for every produced tick.
pub type TickCallback = Arc<dyn Fn(Tick) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("provider {0} is not connected")]
    NotConnected(String),

    #[error("no connected providers available")]
    NoProviderAvailable,

    #[error("provider {0} not found")]
    NotFound(String),

    #[error("no data for {0}")]
    NoData(String),

    #[error("invalid range: from {from} is after to {to}")]
    InvalidRange { from: u64, to: u64 },

    #[error("provider {provider} source error: {reason}")]
    Source { provider: String, reason: String },
}

impl ProviderError {
    pub(crate) fn from_store(provider: &str, err: StoreError) -> Self {
        ProviderError::Source { provider: provider.to_string(), reason: err.to_string() }
    }
}

/// Capability set every market data source provides.
///
/// Methods take `&self`: providers are shared as `Arc<dyn MarketDataProvider>`
/// and keep their own connection state behind interior mutability.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Registry name.
    fn name(&self) -> &str;

    async fn connect(&self) -> Result<(), ProviderError>;

    /// Also stops every tick producer and waits for it to exit.
    async fn disconnect(&self) -> Result<(), ProviderError>;

    fn is_connected(&self) -> bool;

    /// Latest quote for `symbol`.
    async fn quote(&self, symbol: &str) -> Result<Tick, ProviderError>;

    /// Bars in `[from, to)` in ascending time order.
    async fn historical(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: u64,
        to: u64,
    ) -> Result<Vec<Bar>, ProviderError>;

    /// Start one producer that invokes `callback` for each of `symbols` on
    /// every interval until unsubscribed or disconnected.
    async fn subscribe_ticks(
        &self,
        symbols: &[String],
        callback: TickCallback,
    ) -> Result<(), ProviderError>;

    /// Stop delivering `symbols`. Returns after affected producers have exited.
    async fn unsubscribe_ticks(&self, symbols: &[String]) -> Result<(), ProviderError>;
}

pub(crate) fn check_range(from: u64, to: u64) -> Result<(), ProviderError> {
    if from > to {
        return Err(ProviderError::InvalidRange { from, to });
    }
    Ok(())
}
