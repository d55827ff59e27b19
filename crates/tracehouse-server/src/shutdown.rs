//! Graceful Shutdown
//!
//! On SIGINT (Ctrl+C) or SIGTERM the server stops accepting connections, lets
//! in-flight requests finish, then drains the trace store so every accepted
//! trace reaches disk (bounded by the store's drain timeout).
//!
//! ## Usage
//!
//! ```ignore
//! use tracehouse_server::shutdown::serve_with_shutdown;
//!
//! let router = create_router(state.clone());
//! serve_with_shutdown(router, 8080, state.manager).await?;
//! ```

use std::sync::Arc;

use tracehouse_storage::{DrainReport, TraceManager};

/// Shutdown signal type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Received SIGINT (Ctrl+C)
    SigInt,
    /// Received SIGTERM
    SigTerm,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SigInt => write!(f, "SIGINT (Ctrl+C)"),
            Self::SigTerm => write!(f, "SIGTERM"),
        }
    }
}

/// Complete when a shutdown signal is received.
///
/// A handler that cannot be installed is logged and never fires.
pub async fn shutdown_signal() -> ShutdownSignal {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        ShutdownSignal::SigInt
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
        ShutdownSignal::SigTerm
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<ShutdownSignal>();

    tokio::select! {
        signal = ctrl_c => signal,
        signal = terminate => signal,
    }
}

/// Serve `router` on `port` until a shutdown signal, then drain `manager`.
pub async fn serve_with_shutdown(
    router: axum::Router,
    port: u16,
    manager: Arc<TraceManager>,
) -> anyhow::Result<DrainReport> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(address = %addr, "Trace server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let signal = shutdown_signal().await;
            tracing::info!(signal = %signal, "Received shutdown signal, stopping server");
        })
        .await?;

    let report = manager.shutdown().await;
    tracing::info!(
        tasks = report.tasks,
        completed = report.completed,
        timed_out = report.timed_out,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Server shut down"
    );

    Ok(report)
}
