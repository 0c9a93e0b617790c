//! Synthetic provider for development and tests.
//!
//! Quotes are seeded from the wall clock (`1000 + unix_secs % 100`) unless a
//! fixed price is configured; history is a flat series of identical bars.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mds_core::time_util::{now_ms, now_secs};
use mds_core::{Bar, Tick, Timeframe};
use tracing::info;

use crate::producer::{TickProducers, TickSource};
use crate::{MarketDataProvider, ProviderError, TickCallback, check_range};

const BASE_PRICE: f64 = 1000.0;
const QUOTE_BID: f64 = 999.5;
const QUOTE_ASK: f64 = 1000.5;
const QUOTE_VOLUME: f64 = 1000.0;
const TICK_VOLUME: f64 = 100.0;

pub struct MockProvider {
    name: String,
    connected: AtomicBool,
    fixed_price: Option<f64>,
    tick_interval: Duration,
    producers: TickProducers,
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            producers: TickProducers::new(format!("provider:{name}")),
            name,
            connected: AtomicBool::new(false),
            fixed_price: None,
            tick_interval: Duration::from_secs(1),
        }
    }

    /// Quote and tick at `price` instead of the clock-seeded value.
    pub fn with_fixed_price(mut self, price: f64) -> Self {
        self.fixed_price = Some(price);
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub async fn active_producers(&self) -> usize {
        self.producers.active().await
    }

    fn ensure_connected(&self) -> Result<(), ProviderError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ProviderError::NotConnected(self.name.clone()))
        }
    }
}

fn synthetic_price(fixed: Option<f64>) -> f64 {
    fixed.unwrap_or_else(|| BASE_PRICE + (now_secs() % 100) as f64)
}

struct SyntheticTicks {
    fixed_price: Option<f64>,
}

#[async_trait]
impl TickSource for SyntheticTicks {
    async fn next_tick(&self, symbol: &str) -> Option<Tick> {
        Some(Tick {
            timestamp: now_ms(),
            symbol: symbol.to_string(),
            price: synthetic_price(self.fixed_price),
            volume: TICK_VOLUME,
            bid: None,
            ask: None,
        })
    }
}

#[async_trait]
impl MarketDataProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<(), ProviderError> {
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
        Ok(Tick {
            timestamp: now_ms(),
            symbol: symbol.to_string(),
            price: synthetic_price(self.fixed_price),
            volume: QUOTE_VOLUME,
            bid: Some(QUOTE_BID),
            ask: Some(QUOTE_ASK),
        })
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

        let step = timeframe.step_ms();
        let mut bars = Vec::new();
        let mut ts = from;
        while ts < to {
            bars.push(Bar {
                timestamp: ts,
                symbol: symbol.to_string(),
                open: 1000.0,
                high: 1010.0,
                low: 990.0,
                close: 1005.0,
                volume: 50_000.0,
                timeframe,
            });
            ts += step;
        }
        Ok(bars)
    }

    async fn subscribe_ticks(
        &self,
        symbols: &[String],
        callback: TickCallback,
    ) -> Result<(), ProviderError> {
        self.ensure_connected()?;
        let source = Arc::new(SyntheticTicks { fixed_price: self.fixed_price });
        self.producers.spawn(symbols.to_vec(), self.tick_interval, source, callback).await;
        Ok(())
    }

    async fn unsubscribe_ticks(&self, symbols: &[String]) -> Result<(), ProviderError> {
        let stopped = self.producers.unsubscribe(symbols).await;
        info!("[provider:{}] unsubscribed {symbols:?} ({stopped} producer(s) stopped)", self.name);
        Ok(())
    }
}
