//! # mds-runner
//!
//! Main entry point for the market data service.
//!
//! Loads a JSON configuration file, registers the configured providers,
//! starts the distribution hub and its WebSocket listener, and runs the
//! periodic collection loop until Ctrl+C.
//!
//! # Usage
//!
//! ```bash
//! mds-runner config.json --log-level info --json-logs
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use mds_core::cache::{MarketCache, MemoryCache};
use mds_core::logging::LogFormat;
use mds_core::store::{MarketStore, MemoryStore};
use mds_hub::SessionConfig;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use mds_runner::service::MarketDataService;

/// Market Data Service Runner.
#[derive(Parser)]
#[command(name = "mds-runner", about = "Market Data Service Runner")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error). Overrides the config.
    #[arg(short, long)]
    log_level: Option<String>,

    /// Optional log directory for file output. Overrides the config.
    #[arg(long)]
    log_dir: Option<String>,

    /// Emit console logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let config = mds_core::config::load_config(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;
    let service_config = config.service();

    // 2. Initialize logging
    let log_level = cli.log_level.clone().unwrap_or_else(|| service_config.effective_log_level());
    let log_dir = cli.log_dir.clone().or_else(|| service_config.log_path.clone());
    let format = if cli.json_logs || service_config.json_logs() {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    mds_core::logging::init_logging(&log_level, log_dir.as_deref(), "mds-runner", format);

    info!(
        "{} starting, config={}, log_level={log_level}, {} provider(s)",
        service_config.effective_name(),
        cli.config.display(),
        config.providers.len()
    );

    // 3. Storage backends
    let store: Arc<dyn MarketStore> = Arc::new(MemoryStore::with_stocks(config.stocks.clone()));
    let cache = MarketCache::new(Arc::new(MemoryCache::new()));

    // 4. Providers
    let providers = Arc::new(mds_feed::registry::build_manager(&config, store.clone()).await);
    providers.connect_all().await;
    if !providers.any_connected().await {
        warn!("no provider connected, quotes will fail until one is");
    }

    // 5. Hub and listener
    let (hub, hub_task) = mds_hub::spawn_hub();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let addr = service_config.listen_addr()?;
    let listener = TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;
    let session_config = SessionConfig::from(&config.hub());
    let listener_task =
        tokio::spawn(mds_hub::serve(listener, hub.clone(), session_config, shutdown_rx.clone()));

    // 6. Collection loop
    let collection = config.collection();
    let service = Arc::new(
        MarketDataService::new(providers.clone(), hub.clone(), store, cache)
            .with_collection(collection.clone())
            .with_indicator_defaults(config.indicators.clone()),
    );
    let collection_task = if collection.is_enabled() {
        Some(tokio::spawn(service.clone().run_collection(shutdown_rx)))
    } else {
        info!("collection disabled");
        None
    };

    let health = service.health().await;
    info!("ready, healthy={} on ws://{addr}, press Ctrl+C to stop", health.healthy);

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    // 8. Stop accepting, stop collecting, close connections, disconnect
    let _ = shutdown_tx.send(true);
    if let Err(e) = listener_task.await {
        error!("listener task failed: {e}");
    }
    if let Some(task) = collection_task {
        if let Err(e) = task.await {
            error!("collection task failed: {e}");
        }
    }
    hub.shutdown();
    if let Err(e) = hub_task.await {
        error!("hub task failed: {e}");
    }
    providers.disconnect_all().await;

    info!("all components stopped, goodbye");
    Ok(())
}
