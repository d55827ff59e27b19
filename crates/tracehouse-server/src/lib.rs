//! TraceHouse HTTP Server
//!
//! Thin axum layer over `TraceManager`.
//!
//! ## Routes
//!
//! | Method | Path                           | Result                                   |
//! |--------|--------------------------------|------------------------------------------|
//! | GET    | `/traces/:id`                  | principal id, 32 hex digits              |
//! | GET    | `/traces/:id/key`              | opaque key for the principal             |
//! | PUT    | `/traces/:key`                 | JSON trace body → generated trace id     |
//! | GET    | `/traces/:id/entries`          | JSON listing of the principal's root     |
//! | GET    | `/traces/:id/entries/*path`    | JSON folder listing or CSV file download |
//! | GET    | `/health`                      | `ok`                                     |
//!
//! `:id` and `:key` share one path segment; the method decides which it is.

pub mod config;
pub mod error;
pub mod handlers;
pub mod shutdown;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracehouse_storage::TraceManager;

pub use config::ServerConfig;
pub use error::ApiError;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<TraceManager>,
}

/// Build the router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/traces/:id",
            get(handlers::traces::get_principal).put(handlers::traces::add_trace),
        )
        .route("/traces/:id/key", get(handlers::traces::get_key))
        .route("/traces/:id/entries", get(handlers::entries::get_root_entry))
        .route("/traces/:id/entries/*path", get(handlers::entries::get_entry))
        .route("/health", get(handlers::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
