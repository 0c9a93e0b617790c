//! Configuration parsing for the market data service.
//!
//! The whole service reads its settings from one JSON file, passed in
//! explicitly; nothing here looks at the environment. Most fields are optional
//! and resolved through `effective_*` accessors so a minimal file works.
//!
//! # Example config
//!
//! ```json
//! {
//!   "service": { "name": "mds", "listen_addr": "0.0.0.0:8080", "log_level": "info" },
//!   "providers": [
//!     { "name": "mock", "kind": "mock", "tick_interval_ms": 1000 },
//!     { "name": "archive", "kind": "store", "enabled": false }
//!   ],
//!   "active_provider": "mock",
//!   "hub": { "mailbox_size": 256, "ping_interval_secs": 54 },
//!   "indicators": { "rsi_period": 14 },
//!   "collection": { "symbols": ["AAPL", "MSFT"], "timeframe": "1m" }
//! }
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::MdsError;
use crate::indicators::{IndicatorDefaults, IndicatorKind};
use crate::types::{Stock, Timeframe};

const DEFAULT_SERVICE_NAME: &str = "mds";
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Process metadata (name, logging, listen address).
    pub service: Option<ServiceConfig>,

    /// Registered market data providers, in registration order.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    /// Name of the provider consulted first for quotes and history.
    pub active_provider: Option<String>,

    /// Distribution hub sizing and liveness timings.
    pub hub: Option<HubConfig>,

    /// Default indicator parameters.
    #[serde(default)]
    pub indicators: IndicatorDefaults,

    /// Periodic collection loop.
    pub collection: Option<CollectionConfig>,

    /// Stock catalogue used to seed the in-memory store.
    #[serde(default)]
    pub stocks: Vec<Stock>,
}

impl AppConfig {
    pub fn service(&self) -> ServiceConfig {
        self.service.clone().unwrap_or_default()
    }

    pub fn hub(&self) -> HubConfig {
        self.hub.clone().unwrap_or_default()
    }

    pub fn collection(&self) -> CollectionConfig {
        self.collection.clone().unwrap_or_default()
    }

    /// Providers with `enabled` unset or true.
    pub fn enabled_providers(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.iter().filter(|p| p.is_enabled())
    }

    /// Cross-field checks that serde cannot express.
    pub fn validate(&self) -> Result<(), MdsError> {
        let mut seen = std::collections::HashSet::new();
        for provider in &self.providers {
            if provider.name.is_empty() {
                return Err(MdsError::Config("provider with empty name".into()));
            }
            if !seen.insert(provider.name.as_str()) {
                return Err(MdsError::Config(format!("duplicate provider name: {}", provider.name)));
            }
        }

        if let Some(active) = &self.active_provider {
            if !self.enabled_providers().any(|p| &p.name == active) {
                return Err(MdsError::Config(format!(
                    "active_provider {active} is not an enabled provider"
                )));
            }
        }

        let hub = self.hub();
        if hub.effective_mailbox_size() == 0 {
            return Err(MdsError::Config("hub.mailbox_size must be at least 1".into()));
        }
        for (field, value) in [
            ("ping_interval_secs", hub.ping_interval()),
            ("pong_wait_secs", hub.pong_wait()),
            ("write_wait_secs", hub.write_wait()),
        ] {
            if value.is_zero() {
                return Err(MdsError::Config(format!("hub.{field} must be at least 1")));
            }
        }
        if hub.ping_interval() >= hub.pong_wait() {
            return Err(MdsError::Config(
                "hub.ping_interval_secs must be shorter than hub.pong_wait_secs".into(),
            ));
        }

        self.service().listen_addr()?;
        Ok(())
    }
}

/// Process metadata block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceConfig {
    pub name: Option<String>,

    /// Directory for daily-rotated log files. Console only when unset.
    pub log_path: Option<String>,

    pub log_level: Option<String>,

    /// Emit console logs as JSON lines.
    pub json_logs: Option<bool>,

    /// Address of the streaming (WebSocket) endpoint.
    pub listen_addr: Option<String>,
}

impl ServiceConfig {
    pub fn effective_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string())
    }

    pub fn effective_log_level(&self) -> String {
        self.log_level.clone().unwrap_or_else(|| "info".to_string())
    }

    pub fn json_logs(&self) -> bool {
        self.json_logs.unwrap_or(false)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, MdsError> {
        let raw = self.listen_addr.as_deref().unwrap_or(DEFAULT_LISTEN_ADDR);
        raw.parse().map_err(|e| MdsError::Config(format!("invalid listen_addr {raw}: {e}")))
    }
}

/// One market data provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Registry name, unique across providers.
    pub name: String,

    /// Implementation: `"mock"` or `"store"`. Defaults to the name.
    pub kind: Option<String>,

    pub enabled: Option<bool>,

    pub api_key: Option<String>,
    pub api_secret: Option<String>,

    /// Interval between synthetic ticks per subscription.
    pub tick_interval_ms: Option<u64>,

    /// Quote price override for the mock provider.
    pub fixed_price: Option<f64>,
}

impl ProviderConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn effective_kind(&self) -> &str {
        self.kind.as_deref().unwrap_or(&self.name)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.unwrap_or(1_000).max(1))
    }
}

/// Hub buffer sizing and connection liveness timings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HubConfig {
    /// Outbound messages buffered per connection before it is dropped.
    pub mailbox_size: Option<usize>,

    pub ping_interval_secs: Option<u64>,

    /// Read deadline, refreshed on every pong.
    pub pong_wait_secs: Option<u64>,

    pub write_wait_secs: Option<u64>,

    /// Largest accepted inbound frame, in bytes.
    pub max_message_size: Option<usize>,
}

impl HubConfig {
    pub fn effective_mailbox_size(&self) -> usize {
        self.mailbox_size.unwrap_or(256)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.unwrap_or(54))
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs.unwrap_or(60))
    }

    pub fn write_wait(&self) -> Duration {
        Duration::from_secs(self.write_wait_secs.unwrap_or(10))
    }

    pub fn effective_max_message_size(&self) -> usize {
        self.max_message_size.unwrap_or(512)
    }
}

/// Periodic quote/bar collection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectionConfig {
    pub enabled: Option<bool>,

    #[serde(default)]
    pub symbols: Vec<String>,

    pub timeframe: Option<Timeframe>,

    pub interval_ms: Option<u64>,

    /// How many bars of history to refresh on each pass.
    pub history_bars: Option<usize>,

    /// Indicators computed over the refreshed history. All when unset.
    pub indicators: Option<Vec<IndicatorKind>>,
}

impl CollectionConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true) && !self.symbols.is_empty()
    }

    pub fn effective_timeframe(&self) -> Timeframe {
        self.timeframe.unwrap_or_default()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.unwrap_or(1_000).max(1))
    }

    pub fn effective_history_bars(&self) -> usize {
        self.history_bars.unwrap_or(100).max(1)
    }

    pub fn effective_indicators(&self) -> Vec<IndicatorKind> {
        self.indicators.clone().unwrap_or_else(|| IndicatorKind::ALL.to_vec())
    }
}

/// Load and parse a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}
