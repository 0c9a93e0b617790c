//! Key/value cache with TTL and channel pub/sub.
//!
//! [`Cache`] is the raw contract (string values, string channels).
//! [`MarketCache`] layers the service's typed keys on top of it: values are
//! stored as JSON and each key family has a fixed TTL.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ahash::RandomState;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::{RwLock, broadcast};
use tokio::time::Instant;

use crate::types::{Bar, Tick, Timeframe};

pub const CURRENT_PRICE_TTL: Duration = Duration::from_secs(30);
pub const MARKET_STATUS_TTL: Duration = Duration::from_secs(60);
pub const INDICATOR_TTL: Duration = Duration::from_secs(5 * 60);
pub const WS_SESSION_TTL: Duration = Duration::from_secs(60 * 60);

const MARKET_STATUS_KEY: &str = "market_status";

/// Per-channel backlog kept for slow subscribers before they start lagging.
const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache value is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("value at {0} is not an integer")]
    NotAnInteger(String),

    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Cache: Send + Sync {
    /// Store `value` under `key`. A zero `ttl` means no expiry.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Increment an integer counter, creating it at 1. The expiry is applied
    /// only when the counter is created.
    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, CacheError>;

    /// Returns the number of subscribers that received the payload.
    async fn publish(&self, channel: &str, payload: String) -> Result<usize, CacheError>;

    async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<String>, CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// Process-local [`Cache`].
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry, RandomState>>,
    channels: RwLock<HashMap<String, broadcast::Sender<String>, RandomState>>,
    available: AtomicBool,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::default()),
            channels: RwLock::new(HashMap::default()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    /// Drop expired entries. Reads already ignore them.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        before - entries.len()
    }
}

fn expiry(ttl: Duration) -> Option<Instant> {
    if ttl.is_zero() { None } else { Some(Instant::now() + ttl) }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), Entry { value, expires_at: expiry(ttl) });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries.get(key).filter(|e| e.is_live(now)).map(|e| e.value.clone()))
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        Ok(self.entries.read().await.get(key).is_some_and(|e| e.is_live(now)))
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        if let Some(entry) = entries.get_mut(key) {
            if entry.is_live(now) {
                let count: i64 = entry
                    .value
                    .parse()
                    .map_err(|_| CacheError::NotAnInteger(key.to_string()))?;
                let count = count + 1;
                entry.value = count.to_string();
                return Ok(count);
            }
        }

        entries.insert(key.to_string(), Entry { value: "1".into(), expires_at: expiry(ttl) });
        Ok(1)
    }

    async fn publish(&self, channel: &str, payload: String) -> Result<usize, CacheError> {
        let channels = self.channels.read().await;
        // No receivers is not an error: the message is simply not delivered.
        Ok(channels.get(channel).map_or(0, |tx| tx.send(payload).unwrap_or(0)))
    }

    async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<String>, CacheError> {
        let mut channels = self.channels.write().await;
        let tx = channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        Ok(tx.subscribe())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        if self.available.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(CacheError::Unavailable("memory cache marked down".into()))
        }
    }
}

pub fn current_price_key(symbol: &str) -> String {
    format!("current_price:{symbol}")
}

pub fn indicator_key(symbol: &str, timeframe: Timeframe, name: &str) -> String {
    format!("indicator:{symbol}:{timeframe}:{name}")
}

pub fn ws_session_key(session_id: &str) -> String {
    format!("ws_session:{session_id}")
}

pub fn ticks_channel(symbol: &str) -> String {
    format!("ticks:{symbol}")
}

pub fn ohlcv_channel(symbol: &str) -> String {
    format!("ohlcv:{symbol}")
}

/// Typed accessors for the service's cache keys and channels.
#[derive(Clone)]
pub struct MarketCache {
    inner: Arc<dyn Cache>,
}

impl MarketCache {
    pub fn new(inner: Arc<dyn Cache>) -> Self {
        Self { inner }
    }

    pub fn raw(&self) -> &Arc<dyn Cache> {
        &self.inner
    }

    pub async fn set_json<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.inner.set(key, serde_json::to_string(value)?, ttl).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.inner.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn cache_current_price(&self, symbol: &str, price: f64) -> Result<(), CacheError> {
        self.set_json(&current_price_key(symbol), &price, CURRENT_PRICE_TTL).await
    }

    pub async fn current_price(&self, symbol: &str) -> Result<Option<f64>, CacheError> {
        self.get_json(&current_price_key(symbol)).await
    }

    pub async fn cache_market_status(&self, status: &str) -> Result<(), CacheError> {
        self.set_json(MARKET_STATUS_KEY, &status, MARKET_STATUS_TTL).await
    }

    pub async fn market_status(&self) -> Result<Option<String>, CacheError> {
        self.get_json(MARKET_STATUS_KEY).await
    }

    pub async fn cache_indicator(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        name: &str,
        value: f64,
    ) -> Result<(), CacheError> {
        self.set_json(&indicator_key(symbol, timeframe, name), &value, INDICATOR_TTL).await
    }

    pub async fn indicator(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        name: &str,
    ) -> Result<Option<f64>, CacheError> {
        self.get_json(&indicator_key(symbol, timeframe, name)).await
    }

    /// Counts one hit against `key`; limited once the count within `window`
    /// exceeds `limit`.
    pub async fn is_rate_limited(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<bool, CacheError> {
        let count = self.inner.incr(key, window).await?;
        Ok(count > i64::from(limit))
    }

    pub async fn store_ws_session(
        &self,
        session_id: &str,
        data: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), CacheError> {
        self.set_json(&ws_session_key(session_id), data, WS_SESSION_TTL).await
    }

    pub async fn ws_session(
        &self,
        session_id: &str,
    ) -> Result<Option<serde_json::Map<String, serde_json::Value>>, CacheError> {
        self.get_json(&ws_session_key(session_id)).await
    }

    pub async fn delete_ws_session(&self, session_id: &str) -> Result<(), CacheError> {
        self.inner.delete(&ws_session_key(session_id)).await
    }

    pub async fn publish_tick(&self, tick: &Tick) -> Result<usize, CacheError> {
        let payload = serde_json::to_string(tick)?;
        self.inner.publish(&ticks_channel(&tick.symbol), payload).await
    }

    pub async fn publish_bar(&self, bar: &Bar) -> Result<usize, CacheError> {
        let payload = serde_json::to_string(bar)?;
        self.inner.publish(&ohlcv_channel(&bar.symbol), payload).await
    }

    pub async fn subscribe_ticks(
        &self,
        symbol: &str,
    ) -> Result<broadcast::Receiver<String>, CacheError> {
        self.inner.subscribe(&ticks_channel(symbol)).await
    }

    pub async fn subscribe_ohlcv(
        &self,
        symbol: &str,
    ) -> Result<broadcast::Receiver<String>, CacheError> {
        self.inner.subscribe(&ohlcv_channel(symbol)).await
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        self.inner.ping().await
    }
}
