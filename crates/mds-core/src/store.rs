//! Persistent store contract and an in-memory implementation.
//!
//! Rows are keyed by identity: bars by `(symbol, timeframe, timestamp)`, ticks
//! by `(symbol, timestamp)`, indicator values by
//! `(symbol, timeframe, name, timestamp)`. Writing the same key twice replaces
//! the row. Range queries are inclusive on both ends and return rows newest
//! first, truncated to the query limit.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::types::{Bar, IndicatorValue, Stock, Tick, Timeframe};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Inclusive time window with a row limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeQuery {
    pub from: u64,
    pub to: u64,
    pub limit: usize,
}

impl RangeQuery {
    pub fn new(from: u64, to: u64, limit: usize) -> Self {
        Self { from, to, limit }
    }

    fn validate(&self) -> Result<(), StoreError> {
        if self.from > self.to {
            return Err(StoreError::InvalidQuery(format!(
                "from {} is after to {}",
                self.from, self.to
            )));
        }
        Ok(())
    }
}

#[async_trait]
pub trait MarketStore: Send + Sync {
    async fn upsert_bar(&self, bar: &Bar) -> Result<(), StoreError>;

    async fn upsert_bars(&self, bars: &[Bar]) -> Result<(), StoreError> {
        for bar in bars {
            self.upsert_bar(bar).await?;
        }
        Ok(())
    }

    async fn upsert_tick(&self, tick: &Tick) -> Result<(), StoreError>;

    async fn upsert_indicator(&self, value: &IndicatorValue) -> Result<(), StoreError>;

    async fn upsert_stock(&self, stock: &Stock) -> Result<(), StoreError>;

    /// Bars for one symbol and timeframe, newest first.
    async fn bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        query: &RangeQuery,
    ) -> Result<Vec<Bar>, StoreError>;

    /// Ticks for one symbol, newest first.
    async fn ticks(&self, symbol: &str, query: &RangeQuery) -> Result<Vec<Tick>, StoreError>;

    /// Values of one named indicator, newest first.
    async fn indicator_values(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        name: &str,
        query: &RangeQuery,
    ) -> Result<Vec<IndicatorValue>, StoreError>;

    async fn latest_tick(&self, symbol: &str) -> Result<Option<Tick>, StoreError>;

    /// All listed stocks, ordered by symbol.
    async fn stocks(&self) -> Result<Vec<Stock>, StoreError>;

    async fn stock(&self, symbol: &str) -> Result<Stock, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

type BarKey = (String, Timeframe, u64);
type TickKey = (String, u64);
type IndicatorKey = (String, Timeframe, String, u64);

#[derive(Default)]
struct Tables {
    bars: BTreeMap<BarKey, Bar>,
    ticks: BTreeMap<TickKey, Tick>,
    indicators: BTreeMap<IndicatorKey, IndicatorValue>,
    stocks: BTreeMap<String, Stock>,
}

/// Process-local [`MarketStore`] backed by ordered maps.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { tables: RwLock::new(Tables::default()), available: AtomicBool::new(true) }
    }

    /// Seed the stock catalogue.
    pub fn with_stocks(stocks: impl IntoIterator<Item = Stock>) -> Self {
        let mut tables = Tables::default();
        for stock in stocks {
            tables.stocks.insert(stock.symbol.clone(), stock);
        }
        Self { tables: RwLock::new(tables), available: AtomicBool::new(true) }
    }

    /// Toggle health for failure-path tests; only `ping` consults it.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    pub async fn bar_count(&self) -> usize {
        self.tables.read().await.bars.len()
    }

    pub async fn tick_count(&self) -> usize {
        self.tables.read().await.ticks.len()
    }

    pub async fn indicator_count(&self) -> usize {
        self.tables.read().await.indicators.len()
    }
}

fn newest_first<'a, K: 'a, V: Clone + 'a>(
    rows: impl DoubleEndedIterator<Item = (&'a K, &'a V)>,
    limit: usize,
) -> Vec<V> {
    rows.rev().take(limit).map(|(_, v)| v.clone()).collect()
}

#[async_trait]
impl MarketStore for MemoryStore {
    async fn upsert_bar(&self, bar: &Bar) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.bars.insert((bar.symbol.clone(), bar.timeframe, bar.timestamp), bar.clone());
        Ok(())
    }

    async fn upsert_bars(&self, bars: &[Bar]) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        for bar in bars {
            tables.bars.insert((bar.symbol.clone(), bar.timeframe, bar.timestamp), bar.clone());
        }
        Ok(())
    }

    async fn upsert_tick(&self, tick: &Tick) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.ticks.insert((tick.symbol.clone(), tick.timestamp), tick.clone());
        Ok(())
    }

    async fn upsert_indicator(&self, value: &IndicatorValue) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.indicators.insert(
            (value.symbol.clone(), value.timeframe, value.name.clone(), value.timestamp),
            value.clone(),
        );
        Ok(())
    }

    async fn upsert_stock(&self, stock: &Stock) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.stocks.insert(stock.symbol.clone(), stock.clone());
        Ok(())
    }

    async fn bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        query: &RangeQuery,
    ) -> Result<Vec<Bar>, StoreError> {
        query.validate()?;
        let tables = self.tables.read().await;
        let lo = (symbol.to_string(), timeframe, query.from);
        let hi = (symbol.to_string(), timeframe, query.to);
        Ok(newest_first(
            tables.bars.range((Bound::Included(lo), Bound::Included(hi))),
            query.limit,
        ))
    }

    async fn ticks(&self, symbol: &str, query: &RangeQuery) -> Result<Vec<Tick>, StoreError> {
        query.validate()?;
        let tables = self.tables.read().await;
        let lo = (symbol.to_string(), query.from);
        let hi = (symbol.to_string(), query.to);
        Ok(newest_first(
            tables.ticks.range((Bound::Included(lo), Bound::Included(hi))),
            query.limit,
        ))
    }

    async fn indicator_values(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        name: &str,
        query: &RangeQuery,
    ) -> Result<Vec<IndicatorValue>, StoreError> {
        query.validate()?;
        let tables = self.tables.read().await;
        let lo = (symbol.to_string(), timeframe, name.to_string(), query.from);
        let hi = (symbol.to_string(), timeframe, name.to_string(), query.to);
        Ok(newest_first(
            tables.indicators.range((Bound::Included(lo), Bound::Included(hi))),
            query.limit,
        ))
    }

    async fn latest_tick(&self, symbol: &str) -> Result<Option<Tick>, StoreError> {
        let tables = self.tables.read().await;
        let lo = (symbol.to_string(), 0);
        let hi = (symbol.to_string(), u64::MAX);
        Ok(tables
            .ticks
            .range((Bound::Included(lo), Bound::Included(hi)))
            .next_back()
            .map(|(_, t)| t.clone()))
    }

    async fn stocks(&self) -> Result<Vec<Stock>, StoreError> {
        Ok(self.tables.read().await.stocks.values().cloned().collect())
    }

    async fn stock(&self, symbol: &str) -> Result<Stock, StoreError> {
        self.tables
            .read()
            .await
            .stocks
            .get(symbol)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("stock {symbol}")))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store marked down".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(symbol: &str, ts: u64, close: f64) -> Bar {
        Bar {
            timestamp: ts,
            symbol: symbol.into(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10.0,
            timeframe: Timeframe::M1,
        }
    }

    fn tick(symbol: &str, ts: u64, price: f64) -> Tick {
        Tick { timestamp: ts, symbol: symbol.into(), price, volume: 1.0, bid: None, ask: None }
    }

    #[tokio::test]
    async fn bars_are_newest_first_and_limited() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.upsert_bar(&bar("AAPL", i * 60_000, 100.0 + i as f64)).await.unwrap();
        }
        store.upsert_bar(&bar("MSFT", 60_000, 1.0)).await.unwrap();

        let rows = store
            .bars("AAPL", Timeframe::M1, &RangeQuery::new(60_000, 240_000, 3))
            .await
            .unwrap();
        let stamps: Vec<u64> = rows.iter().map(|b| b.timestamp).collect();
        assert_eq!(stamps, vec![240_000, 180_000, 120_000]);
        assert!(rows.iter().all(|b| b.symbol == "AAPL"));
    }

    #[tokio::test]
    async fn upsert_replaces_by_identity() {
        let store = MemoryStore::new();
        store.upsert_bar(&bar("AAPL", 0, 100.0)).await.unwrap();
        store.upsert_bar(&bar("AAPL", 0, 105.0)).await.unwrap();
        assert_eq!(store.bar_count().await, 1);

        let rows =
            store.bars("AAPL", Timeframe::M1, &RangeQuery::new(0, 0, 10)).await.unwrap();
        assert_eq!(rows[0].close, 105.0);

        // Same timestamp, different timeframe is a different row.
        let mut hourly = bar("AAPL", 0, 1.0);
        hourly.timeframe = Timeframe::H1;
        store.upsert_bar(&hourly).await.unwrap();
        assert_eq!(store.bar_count().await, 2);
    }

    #[tokio::test]
    async fn ticks_and_latest_tick() {
        let store = MemoryStore::new();
        assert!(store.latest_tick("AAPL").await.unwrap().is_none());

        store.upsert_tick(&tick("AAPL", 10, 1.0)).await.unwrap();
        store.upsert_tick(&tick("AAPL", 30, 3.0)).await.unwrap();
        store.upsert_tick(&tick("AAPL", 20, 2.0)).await.unwrap();
        store.upsert_tick(&tick("AAPLX", 40, 9.0)).await.unwrap();

        assert_eq!(store.latest_tick("AAPL").await.unwrap().unwrap().price, 3.0);
        let rows = store.ticks("AAPL", &RangeQuery::new(0, 25, 10)).await.unwrap();
        assert_eq!(rows.iter().map(|t| t.timestamp).collect::<Vec<_>>(), vec![20, 10]);
    }

    #[tokio::test]
    async fn indicator_values_filter_by_name() {
        let store = MemoryStore::new();
        for (name, ts) in [("rsi", 1), ("rsi", 2), ("sma", 2)] {
            store
                .upsert_indicator(&IndicatorValue {
                    timestamp: ts,
                    symbol: "AAPL".into(),
                    timeframe: Timeframe::M1,
                    name: name.into(),
                    value: 50.0,
                    metadata: None,
                })
                .await
                .unwrap();
        }
        let rows = store
            .indicator_values("AAPL", Timeframe::M1, "rsi", &RangeQuery::new(0, 10, 10))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].timestamp, 2);
    }

    #[tokio::test]
    async fn inverted_window_is_rejected() {
        let store = MemoryStore::new();
        let err = store.ticks("AAPL", &RangeQuery::new(10, 5, 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn stock_catalogue_is_ordered() {
        let store = MemoryStore::with_stocks([
            Stock {
                symbol: "MSFT".into(),
                company_name: "Microsoft".into(),
                sector: None,
                exchange: "NASDAQ".into(),
            },
            Stock {
                symbol: "AAPL".into(),
                company_name: "Apple".into(),
                sector: Some("Technology".into()),
                exchange: "NASDAQ".into(),
            },
        ]);
        let symbols: Vec<String> =
            store.stocks().await.unwrap().into_iter().map(|s| s.symbol).collect();
        assert_eq!(symbols, vec!["AAPL", "MSFT"]);
        assert_eq!(store.stock("AAPL").await.unwrap().company_name, "Apple");
        assert!(matches!(store.stock("TSLA").await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn ping_follows_availability() {
        let store = MemoryStore::new();
        assert!(store.ping().await.is_ok());
        store.set_available(false);
        assert!(store.ping().await.is_err());
    }
}
