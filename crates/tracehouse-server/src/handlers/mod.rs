//! HTTP handlers

pub mod entries;
pub mod traces;

/// GET /health
pub async fn health_check() -> &'static str {
    "ok"
}
