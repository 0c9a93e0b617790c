//! Provider registry: factory for creating providers from config.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use mds_core::config::{AppConfig, ProviderConfig};
use mds_core::store::MarketStore;
use tracing::{error, info};

use crate::{MarketDataProvider, MockProvider, ProviderManager, StoreProvider};

/// Create a provider based on the `kind` field (or the name) in the config.
///
/// `store` backs the `"store"` kind.
pub fn create_provider(
    config: &ProviderConfig,
    store: Arc<dyn MarketStore>,
) -> Result<Arc<dyn MarketDataProvider>> {
    let kind = config.effective_kind().to_lowercase();

    let provider: Arc<dyn MarketDataProvider> = match kind.as_str() {
        "mock" => {
            let mut mock =
                MockProvider::new(config.name.clone()).with_tick_interval(config.tick_interval());
            if let Some(price) = config.fixed_price {
                mock = mock.with_fixed_price(price);
            }
            Arc::new(mock)
        }
        "store" => Arc::new(
            StoreProvider::new(config.name.clone(), store).with_tick_interval(config.tick_interval()),
        ),
        other => return Err(anyhow!("Unknown provider kind: {other}")),
    };

    Ok(provider)
}

/// Build a manager holding every enabled provider from `config`, with the
/// configured active provider selected. Providers that fail to build are
/// logged and skipped; nothing is connected yet.
pub async fn build_manager(config: &AppConfig, store: Arc<dyn MarketStore>) -> ProviderManager {
    let manager = ProviderManager::new();

    for (idx, provider_config) in config.enabled_providers().enumerate() {
        match create_provider(provider_config, store.clone()) {
            Ok(provider) => {
                info!(
                    "provider[{idx}]: created '{}' (kind={})",
                    provider_config.name,
                    provider_config.effective_kind()
                );
                manager.register(provider).await;
            }
            Err(e) => error!("provider[{idx}]: failed to create '{}': {e}", provider_config.name),
        }
    }

    if let Some(active) = &config.active_provider {
        if let Err(e) = manager.set_active(active).await {
            error!("active provider not set: {e}");
        }
    }

    manager
}
