//! Provider registry with one active provider and failover.
//!
//! Routing rule for quotes, history and tick subscriptions: if the active
//! provider is connected, use it and return its result as is (an error from
//! it is not retried elsewhere). Otherwise use the first connected provider
//! in name order. With nothing connected the call fails with
//! [`ProviderError::NoProviderAvailable`].

use std::collections::BTreeMap;
use std::sync::Arc;

use mds_core::{Bar, Tick, Timeframe};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::{MarketDataProvider, ProviderError, TickCallback};

#[derive(Default)]
struct Registry {
    providers: BTreeMap<String, Arc<dyn MarketDataProvider>>,
    active: Option<String>,
}

/// Connection state of one registered provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub connected: bool,
    pub active: bool,
}

#[derive(Default)]
pub struct ProviderManager {
    registry: RwLock<Registry>,
}

impl ProviderManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under the provider's own name, replacing any previous entry.
    pub async fn register(&self, provider: Arc<dyn MarketDataProvider>) {
        let name = provider.name().to_string();
        let replaced = self.registry.write().await.providers.insert(name.clone(), provider);
        if replaced.is_some() {
            warn!("[providers] replaced provider {name}");
        } else {
            info!("[providers] registered provider {name}");
        }
    }

    /// Unregister `name`. Clears the active pointer if it pointed there. The
    /// provider is returned as is; callers disconnect it if needed.
    pub async fn remove(&self, name: &str) -> Option<Arc<dyn MarketDataProvider>> {
        let mut registry = self.registry.write().await;
        let removed = registry.providers.remove(name);
        if removed.is_some() {
            if registry.active.as_deref() == Some(name) {
                registry.active = None;
                warn!("[providers] removed active provider {name}");
            } else {
                info!("[providers] removed provider {name}");
            }
        }
        removed
    }

    /// Point the active slot at a registered provider. It does not need to be
    /// connected.
    pub async fn set_active(&self, name: &str) -> Result<(), ProviderError> {
        let mut registry = self.registry.write().await;
        if !registry.providers.contains_key(name) {
            return Err(ProviderError::NotFound(name.to_string()));
        }
        registry.active = Some(name.to_string());
        info!("[providers] active provider set to {name}");
        Ok(())
    }

    pub async fn active(&self) -> Option<Arc<dyn MarketDataProvider>> {
        let registry = self.registry.read().await;
        registry.active.as_ref().and_then(|name| registry.providers.get(name).cloned())
    }

    pub async fn active_name(&self) -> Option<String> {
        self.registry.read().await.active.clone()
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn MarketDataProvider>> {
        self.registry.read().await.providers.get(name).cloned()
    }

    pub async fn names(&self) -> Vec<String> {
        self.registry.read().await.providers.keys().cloned().collect()
    }

    pub async fn status(&self) -> Vec<ProviderStatus> {
        let registry = self.registry.read().await;
        registry
            .providers
            .iter()
            .map(|(name, p)| ProviderStatus {
                name: name.clone(),
                connected: p.is_connected(),
                active: registry.active.as_deref() == Some(name.as_str()),
            })
            .collect()
    }

    pub async fn any_connected(&self) -> bool {
        self.registry.read().await.providers.values().any(|p| p.is_connected())
    }

    /// Connect every provider. Failures are logged and skipped.
    pub async fn connect_all(&self) {
        for (name, provider) in self.snapshot().await {
            match provider.connect().await {
                Ok(()) => info!("[providers] connected {name}"),
                Err(e) => warn!("[providers] failed to connect {name}: {e}"),
            }
        }
    }

    /// Disconnect every provider. Failures are logged and skipped.
    pub async fn disconnect_all(&self) {
        for (name, provider) in self.snapshot().await {
            match provider.disconnect().await {
                Ok(()) => info!("[providers] disconnected {name}"),
                Err(e) => warn!("[providers] failed to disconnect {name}: {e}"),
            }
        }
    }

    pub async fn quote(&self, symbol: &str) -> Result<Tick, ProviderError> {
        self.route("quote").await?.quote(symbol).await
    }

    pub async fn historical(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: u64,
        to: u64,
    ) -> Result<Vec<Bar>, ProviderError> {
        self.route("history").await?.historical(symbol, timeframe, from, to).await
    }

    /// Subscribe on the routed provider. Returns its name so the caller can
    /// unsubscribe from the same one later.
    pub async fn subscribe_ticks(
        &self,
        symbols: &[String],
        callback: TickCallback,
    ) -> Result<String, ProviderError> {
        let provider = self.route("ticks").await?;
        provider.subscribe_ticks(symbols, callback).await?;
        Ok(provider.name().to_string())
    }

    /// Unsubscribe `symbols` on every registered provider.
    pub async fn unsubscribe_ticks(&self, symbols: &[String]) {
        for (name, provider) in self.snapshot().await {
            if let Err(e) = provider.unsubscribe_ticks(symbols).await {
                warn!("[providers] failed to unsubscribe {name}: {e}");
            }
        }
    }

    async fn snapshot(&self) -> Vec<(String, Arc<dyn MarketDataProvider>)> {
        let registry = self.registry.read().await;
        registry.providers.iter().map(|(n, p)| (n.clone(), p.clone())).collect()
    }

    /// Pick the provider for one request. The lock is released before the
    /// provider is called.
    async fn route(&self, what: &str) -> Result<Arc<dyn MarketDataProvider>, ProviderError> {
        let registry = self.registry.read().await;

        if let Some(active) = registry.active.as_ref().and_then(|n| registry.providers.get(n)) {
            if active.is_connected() {
                return Ok(active.clone());
            }
        }

        match registry.providers.values().find(|p| p.is_connected()) {
            Some(fallback) => {
                info!("[providers] using fallback provider {} for {what}", fallback.name());
                Ok(fallback.clone())
            }
            None => Err(ProviderError::NoProviderAvailable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockProvider;
    use async_trait::async_trait;

    async fn mock(name: &str, price: f64, connected: bool) -> Arc<MockProvider> {
        let provider = Arc::new(MockProvider::new(name).with_fixed_price(price));
        if connected {
            provider.connect().await.unwrap();
        }
        provider
    }

    #[tokio::test]
    async fn falls_back_when_active_is_disconnected() {
        let manager = ProviderManager::new();
        manager.register(mock("a", 1.0, false).await).await;
        manager.register(mock("b", 2.0, true).await).await;
        manager.set_active("a").await.unwrap();

        let tick = manager.quote("AAPL").await.unwrap();
        assert_eq!(tick.price, 2.0);
    }

    #[tokio::test]
    async fn active_connected_provider_wins() {
        let manager = ProviderManager::new();
        manager.register(mock("a", 1.0, true).await).await;
        manager.register(mock("b", 2.0, true).await).await;
        manager.set_active("b").await.unwrap();

        assert_eq!(manager.quote("AAPL").await.unwrap().price, 2.0);
        let bars = manager.historical("AAPL", Timeframe::M1, 0, 120_000).await.unwrap();
        assert_eq!(bars.len(), 2);
    }

    #[tokio::test]
    async fn nothing_connected_is_unavailable() {
        let manager = ProviderManager::new();
        assert_eq!(manager.quote("AAPL").await.unwrap_err(), ProviderError::NoProviderAvailable);

        manager.register(mock("a", 1.0, false).await).await;
        manager.set_active("a").await.unwrap();
        assert_eq!(manager.quote("AAPL").await.unwrap_err(), ProviderError::NoProviderAvailable);
        assert_eq!(
            manager.historical("AAPL", Timeframe::M1, 0, 1).await.unwrap_err(),
            ProviderError::NoProviderAvailable
        );
    }

    struct Broken;

    #[async_trait]
    impl MarketDataProvider for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        async fn connect(&self) -> Result<(), ProviderError> {
            Err(ProviderError::NotConnected("broken".into()))
        }
        async fn disconnect(&self) -> Result<(), ProviderError> {
            Err(ProviderError::NotConnected("broken".into()))
        }
        fn is_connected(&self) -> bool {
            true
        }
        async fn quote(&self, symbol: &str) -> Result<Tick, ProviderError> {
            Err(ProviderError::NoData(symbol.to_string()))
        }
        async fn historical(
            &self,
            symbol: &str,
            _: Timeframe,
            _: u64,
            _: u64,
        ) -> Result<Vec<Bar>, ProviderError> {
            Err(ProviderError::NoData(symbol.to_string()))
        }
        async fn subscribe_ticks(&self, _: &[String], _: TickCallback) -> Result<(), ProviderError> {
            Ok(())
        }
        async fn unsubscribe_ticks(&self, _: &[String]) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn active_provider_error_is_not_retried() {
        let manager = ProviderManager::new();
        manager.register(Arc::new(Broken)).await;
        manager.register(mock("good", 5.0, true).await).await;
        manager.set_active("broken").await.unwrap();

        assert_eq!(manager.quote("AAPL").await.unwrap_err(), ProviderError::NoData("AAPL".into()));
    }

    #[tokio::test]
    async fn bulk_operations_are_best_effort() {
        let manager = ProviderManager::new();
        manager.register(Arc::new(Broken)).await;
        let good = mock("good", 5.0, false).await;
        manager.register(good.clone()).await;

        manager.connect_all().await;
        assert!(good.is_connected());

        manager.disconnect_all().await;
        assert!(!good.is_connected());
    }

    #[tokio::test]
    async fn set_active_requires_registration() {
        let manager = ProviderManager::new();
        assert_eq!(
            manager.set_active("ghost").await.unwrap_err(),
            ProviderError::NotFound("ghost".into())
        );
    }

    #[tokio::test]
    async fn removing_active_clears_pointer() {
        let manager = ProviderManager::new();
        manager.register(mock("a", 1.0, true).await).await;
        manager.register(mock("b", 2.0, false).await).await;
        manager.set_active("a").await.unwrap();

        assert!(manager.remove("a").await.is_some());
        assert_eq!(manager.active_name().await, None);
        assert!(manager.remove("a").await.is_none());
        assert_eq!(manager.names().await, vec!["b".to_string()]);
        assert_eq!(
            manager.status().await,
            vec![ProviderStatus { name: "b".into(), connected: false, active: false }]
        );
    }

    #[tokio::test]
    async fn tick_subscription_routes_and_reports_provider() {
        let manager = ProviderManager::new();
        manager.register(mock("a", 1.0, false).await).await;
        let b = mock("b", 2.0, true).await;
        manager.register(b.clone()).await;
        manager.set_active("a").await.unwrap();

        let cb: TickCallback = Arc::new(|_| {});
        let used = manager.subscribe_ticks(&["AAPL".into()], cb).await.unwrap();
        assert_eq!(used, "b");
        assert_eq!(b.active_producers().await, 1);

        manager.unsubscribe_ticks(&["AAPL".into()]).await;
        assert_eq!(b.active_producers().await, 0);
    }
}
