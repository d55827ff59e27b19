//! TraceHouse Server Binary
//!
//! See `tracehouse_server::config` for the environment variables.
//!
//! # Example
//!
//! ```bash
//! export TRACES_PASSWORD=change-me
//! export TRACES_DIRECTORY=./data/traces
//! export TRACES_PORT=8080
//! cargo run --bin tracehouse
//! ```

use std::sync::Arc;

use anyhow::Context;
use tracehouse_server::shutdown::serve_with_shutdown;
use tracehouse_server::{create_router, AppState, ServerConfig};
use tracehouse_storage::TraceManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;

    tracing::info!(
        port = config.port,
        directory = %config.store.directory.display(),
        flush_delay_ms = config.store.flush_delay_ms,
        drain_timeout_ms = config.store.drain_timeout_ms,
        "Starting trace server"
    );

    let manager = Arc::new(
        TraceManager::start(config.store.clone()).context("Failed to start trace manager")?,
    );

    let state = AppState {
        manager: Arc::clone(&manager),
    };
    let router = create_router(state);

    let report = serve_with_shutdown(router, config.port, manager).await?;
    if report.timed_out {
        tracing::warn!(
            remaining = report.tasks.saturating_sub(report.completed),
            "Exiting with flush tasks still running"
        );
    }

    Ok(())
}
