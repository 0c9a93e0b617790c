//! Orchestrator wiring providers, hub, store and cache.
//!
//! Read handlers serve the transport surface (health, stocks, OHLCV and tick
//! ranges). The collection loop polls the provider manager for the configured
//! symbols and fans every result out to the store, the cache and the hub.

use std::sync::Arc;

use mds_core::cache::MarketCache;
use mds_core::config::CollectionConfig;
use mds_core::indicators::{IndicatorDefaults, compute};
use mds_core::store::{MarketStore, RangeQuery, StoreError};
use mds_core::time_util::{align_down, now_ms};
use mds_core::{Bar, IndicatorValue, Stock, Tick, Timeframe};
use mds_feed::ProviderManager;
use mds_feed::manager::ProviderStatus;
use mds_hub::{HubHandle, HubStats};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Window used by range reads that omit `from`.
pub const DEFAULT_WINDOW_MS: u64 = 24 * 60 * 60 * 1000;
pub const DEFAULT_LIMIT: usize = 1000;
pub const MAX_LIMIT: usize = 10_000;

/// Optional bounds of a range read. Missing values fall back to the last
/// [`DEFAULT_WINDOW_MS`] ending now and [`DEFAULT_LIMIT`] rows.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct HistoryQuery {
    pub from: Option<u64>,
    pub to: Option<u64>,
    pub limit: Option<usize>,
}

impl HistoryQuery {
    pub fn resolve(&self, now: u64) -> RangeQuery {
        let to = self.to.unwrap_or(now);
        let from = self.from.unwrap_or_else(|| to.saturating_sub(DEFAULT_WINDOW_MS));
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        RangeQuery::new(from, to, limit)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub store: bool,
    pub cache: bool,
    pub providers: Vec<ProviderStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hub: Option<HubStats>,
    pub timestamp: u64,
}

/// Counts from one [`MarketDataService::collect_once`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionReport {
    pub ticks: usize,
    pub bars: usize,
    pub indicators: usize,
    pub failures: usize,
}

pub struct MarketDataService {
    providers: Arc<ProviderManager>,
    hub: HubHandle,
    store: Arc<dyn MarketStore>,
    cache: MarketCache,
    collection: CollectionConfig,
    indicators: IndicatorDefaults,
}

impl MarketDataService {
    pub fn new(
        providers: Arc<ProviderManager>,
        hub: HubHandle,
        store: Arc<dyn MarketStore>,
        cache: MarketCache,
    ) -> Self {
        Self {
            providers,
            hub,
            store,
            cache,
            collection: CollectionConfig::default(),
            indicators: IndicatorDefaults::default(),
        }
    }

    pub fn with_collection(mut self, collection: CollectionConfig) -> Self {
        self.collection = collection;
        self
    }

    pub fn with_indicator_defaults(mut self, indicators: IndicatorDefaults) -> Self {
        self.indicators = indicators;
        self
    }

    /// Healthy when store and cache answer and at least one provider is
    /// connected.
    pub async fn health(&self) -> HealthReport {
        let store = match self.store.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!("[service] store ping failed: {e}");
                false
            }
        };
        let cache = match self.cache.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!("[service] cache ping failed: {e}");
                false
            }
        };
        let providers = self.providers.status().await;
        let hub = self.hub.stats().await.ok();

        HealthReport {
            healthy: store && cache && providers.iter().any(|p| p.connected),
            store,
            cache,
            providers,
            hub,
            timestamp: now_ms(),
        }
    }

    pub async fn stocks(&self) -> Result<Vec<Stock>, StoreError> {
        self.store.stocks().await
    }

    /// Stored bars, newest first.
    pub async fn ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        query: HistoryQuery,
    ) -> Result<Vec<Bar>, StoreError> {
        self.store.bars(symbol, timeframe, &query.resolve(now_ms())).await
    }

    /// Stored ticks, newest first.
    pub async fn ticks(&self, symbol: &str, query: HistoryQuery) -> Result<Vec<Tick>, StoreError> {
        self.store.ticks(symbol, &query.resolve(now_ms())).await
    }

    /// One pass over the configured symbols. Failures are logged and counted;
    /// a failing symbol does not stop the others.
    pub async fn collect_once(&self) -> CollectionReport {
        let mut report = CollectionReport::default();
        let timeframe = self.collection.effective_timeframe();

        for symbol in &self.collection.symbols {
            match self.providers.quote(symbol).await {
                Ok(tick) => {
                    self.record_tick(&tick, &mut report).await;
                    report.ticks += 1;
                }
                Err(e) => {
                    warn!("[service] quote for {symbol} failed: {e}");
                    report.failures += 1;
                    continue;
                }
            }

            let bars = match self.refresh_bars(symbol, timeframe, &mut report).await {
                Some(bars) => bars,
                None => continue,
            };
            report.bars += bars.len();
            let published = self.publish_indicators(symbol, timeframe, &bars, &mut report).await;
            report.indicators += published;
        }

        debug!("[service] collection pass: {report:?}");
        report
    }

    /// Run [`Self::collect_once`] every configured interval until `shutdown`
    /// flips to `true` or its sender is dropped.
    pub async fn run_collection(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let interval = self.collection.interval();
        info!(
            "[service] collecting {} symbol(s) every {interval:?}",
            self.collection.symbols.len()
        );
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.collect_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("[service] collection stopped");
                        return;
                    }
                }
            }
        }
    }

    async fn record_tick(&self, tick: &Tick, report: &mut CollectionReport) {
        if let Err(e) = self.store.upsert_tick(tick).await {
            warn!("[service] storing tick for {} failed: {e}", tick.symbol);
            report.failures += 1;
        }
        if let Err(e) = self.cache.cache_current_price(&tick.symbol, tick.price).await {
            warn!("[service] caching price for {} failed: {e}", tick.symbol);
            report.failures += 1;
        }
        if let Err(e) = self.cache.publish_tick(tick).await {
            warn!("[service] publishing tick for {} failed: {e}", tick.symbol);
            report.failures += 1;
        }
        self.hub.send_tick(tick);
    }

    async fn refresh_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        report: &mut CollectionReport,
    ) -> Option<Vec<Bar>> {
        let step = timeframe.step_ms();
        let to = now_ms();
        let span = step.saturating_mul(self.collection.effective_history_bars() as u64);
        let from = align_down(to.saturating_sub(span), step);

        let bars = match self.providers.historical(symbol, timeframe, from, to).await {
            Ok(bars) if !bars.is_empty() => bars,
            Ok(_) => {
                debug!("[service] no bars for {symbol} {timeframe}");
                return None;
            }
            Err(e) => {
                warn!("[service] history for {symbol} failed: {e}");
                report.failures += 1;
                return None;
            }
        };

        if let Err(e) = self.store.upsert_bars(&bars).await {
            warn!("[service] storing bars for {symbol} failed: {e}");
            report.failures += 1;
        }
        if let Some(last) = bars.last() {
            if let Err(e) = self.cache.publish_bar(last).await {
                warn!("[service] publishing bar for {symbol} failed: {e}");
                report.failures += 1;
            }
            self.hub.send_bar(last);
        }
        Some(bars)
    }

    /// Latest value of every configured indicator. Returns how many were
    /// published; indicators without enough bars are skipped.
    async fn publish_indicators(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        bars: &[Bar],
        report: &mut CollectionReport,
    ) -> usize {
        let Some(last_bar) = bars.last() else {
            return 0;
        };
        let mut published = 0;

        for kind in self.collection.effective_indicators() {
            let output = match compute(bars, &self.indicators.params(kind)) {
                Ok(output) => output,
                Err(e) => {
                    debug!("[service] {kind} for {symbol} skipped: {e}");
                    continue;
                }
            };
            let Some((value, metadata)) = output.point(output.len().saturating_sub(1)) else {
                continue;
            };

            let value = IndicatorValue {
                timestamp: last_bar.timestamp,
                symbol: symbol.to_string(),
                timeframe,
                name: kind.as_str().to_string(),
                value,
                metadata,
            };
            if let Err(e) = self.store.upsert_indicator(&value).await {
                warn!("[service] storing {kind} for {symbol} failed: {e}");
                report.failures += 1;
            }
            if let Err(e) =
                self.cache.cache_indicator(symbol, timeframe, &value.name, value.value).await
            {
                warn!("[service] caching {kind} for {symbol} failed: {e}");
                report.failures += 1;
            }
            self.hub.send_indicator(&value);
            published += 1;
        }
        published
    }
}
