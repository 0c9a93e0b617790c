//! Provider that replays what the persistent store already holds.
//!
//! Useful as a fallback behind a live source: quotes are the latest stored
//! tick, history is the stored bars, and "live" ticks re-emit the latest
//! stored tick per symbol on every interval.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mds_core::store::{MarketStore, RangeQuery};
use mds_core::{Bar, Tick, Timeframe};
use tracing::{info, warn};

use crate::producer::{TickProducers, TickSource};
use crate::{MarketDataProvider, ProviderError, TickCallback, check_range};

pub struct StoreProvider {
    name: String,
    store: Arc<dyn MarketStore>,
    connected: AtomicBool,
    tick_interval: Duration,
    producers: TickProducers,
}

impl StoreProvider {
    pub fn new(name: impl Into<String>, store: Arc<dyn MarketStore>) -> Self {
        let name = name.into();
        Self {
            producers: TickProducers::new(format!("provider:{name}")),
            name,
            store,
            connected: AtomicBool::new(false),
            tick_interval: Duration::from_secs(1),
        }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    fn ensure_connected(&self) -> Result<(), ProviderError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ProviderError::NotConnected(self.name.clone()))
        }
    }
}

struct StoredTicks {
    label: String,
    store: Arc<dyn MarketStore>,
}

#[async_trait]
impl TickSource for StoredTicks {
    async fn next_tick(&self, symbol: &str) -> Option<Tick> {
        match self.store.latest_tick(symbol).await {
            Ok(tick) => tick,
            Err(e) => {
                warn!("[{}] latest tick for {symbol} failed: {e}", self.label);
                None
            }
        }
    }
}

#[async_trait]
impl MarketDataProvider for StoreProvider {
    fn name(&self) -> &str {
        &self.name
    }

    /// Connecting succeeds only while the store answers a ping.
    async fn connect(&self) -> Result<(), ProviderError> {
        self.store.ping().await.map_err(|e| ProviderError::from_store(&self.name, e))?;
        self.connected.store(true, Ordering::Release);
        info!("[provider:{}] connected", self.name);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        self.connected.store(false, Ordering::Release);
        let stopped = self.producers.stop_all().await;
        info!("[provider:{}] disconnected ({stopped} producer(s) stopped)", self.name);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn quote(&self, symbol: &str) -> Result<Tick, ProviderError> {
        self.ensure_connected()?;
        self.store
            .latest_tick(symbol)
            .await
            .map_err(|e| ProviderError::from_store(&self.name, e))?
            .ok_or_else(|| ProviderError::NoData(symbol.to_string()))
    }

    async fn historical(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: u64,
        to: u64,
    ) -> Result<Vec<Bar>, ProviderError> {
        self.ensure_connected()?;
        check_range(from, to)?;
        if from == to {
            return Ok(Vec::new());
        }

        // Store windows are inclusive; history excludes `to`.
        let query = RangeQuery::new(from, to - 1, usize::MAX);
        let mut bars = self
            .store
            .bars(symbol, timeframe, &query)
            .await
            .map_err(|e| ProviderError::from_store(&self.name, e))?;
        bars.reverse();
        Ok(bars)
    }

    async fn subscribe_ticks(
        &self,
        symbols: &[String],
        callback: TickCallback,
    ) -> Result<(), ProviderError> {
        self.ensure_connected()?;
        let source = Arc::new(StoredTicks {
            label: format!("provider:{}", self.name),
            store: self.store.clone(),
        });
        self.producers.spawn(symbols.to_vec(), self.tick_interval, source, callback).await;
        Ok(())
    }

    async fn unsubscribe_ticks(&self, symbols: &[String]) -> Result<(), ProviderError> {
        let stopped = self.producers.unsubscribe(symbols).await;
        info!("[provider:{}] unsubscribed {symbols:?} ({stopped} producer(s) stopped)", self.name);
        Ok(())
    }
}
