//! Logging initialization using the `tracing` ecosystem.
//!
//! Provides:
//! - Console output (colored, human-readable) or JSON lines
//! - File output (daily rotation via `tracing-appender`)
//! - Configurable log level via env var `RUST_LOG` or explicit parameter

use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format for the console layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Initialize the global tracing subscriber.
///
/// Should be called once at program start, from the binary only. Library
/// crates just emit `tracing` events.
///
/// # Parameters
///
/// - `log_level`: default level if `RUST_LOG` env var is not set (e.g. `"info"`)
/// - `log_dir`: optional directory for daily-rotating log files
/// - `module_name`: used as the log file prefix (e.g. `"mds-runner"`)
/// - `format`: console output format; files are always plain text
pub fn init_logging(log_level: &str, log_dir: Option<&str>, module_name: &str, format: LogFormat) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let console_layer = match format {
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(true)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(false)
            .boxed(),
    };

    let file_layer = log_dir.map(|dir| {
        let file_appender = tracing_appender::rolling::daily(dir, module_name);
        fmt::layer()
            .with_writer(file_appender)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();
}
