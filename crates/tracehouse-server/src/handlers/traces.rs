//! Trace ingestion and key endpoints

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use tracehouse_core::{PrincipalId, Trace};

use crate::error::ApiError;
use crate::AppState;

/// Longest key accepted on the ingestion route, in characters.
pub const MAX_KEY_CHARS: usize = 128;

pub(crate) fn parse_principal(id: &str) -> Result<PrincipalId, ApiError> {
    id.parse::<PrincipalId>()
        .map_err(|e| ApiError::bad_request("id", e.to_string()))
}

/// GET /traces/:id
///
/// Echo the principal id in its canonical 32 hex digit form.
pub async fn get_principal(Path(id): Path<String>) -> Result<String, ApiError> {
    Ok(parse_principal(&id)?.to_string())
}

/// GET /traces/:id/key
pub async fn get_key(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<String, ApiError> {
    let principal = parse_principal(&id)?;
    Ok(state.manager.get_key(&principal))
}

/// PUT /traces/:key
///
/// Buffer one trace for the principal behind `key`; returns the generated
/// trace id (32 hex digits).
pub async fn add_trace(
    State(state): State<AppState>,
    Path(key): Path<String>,
    payload: Result<Json<Trace>, JsonRejection>,
) -> Result<String, ApiError> {
    if key.trim().is_empty() || key.chars().count() > MAX_KEY_CHARS {
        return Err(ApiError::bad_request("key", "Invalid key"));
    }

    let Json(trace) = payload.map_err(|e| ApiError::bad_request("trace", e.body_text()))?;

    let id = state.manager.add_with_key(&key, trace)?;
    Ok(id.simple().to_string())
}
