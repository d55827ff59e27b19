//! Browsing and downloading a principal's trace files

use axum::extract::{Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracehouse_storage::retry::retry_on_sharing_violation;
use tracehouse_storage::{TraceEntry, TraceFile};

use super::traces::parse_principal;
use crate::error::ApiError;
use crate::AppState;

/// GET /traces/:id/entries
pub async fn get_root_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    resolve(state, &id, "").await
}

/// GET /traces/:id/entries/*path
pub async fn get_entry(
    State(state): State<AppState>,
    Path((id, path)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    resolve(state, &id, &path).await
}

async fn resolve(state: AppState, id: &str, path: &str) -> Result<Response, ApiError> {
    let principal = parse_principal(id)?;

    match state.manager.entry(principal, path).await? {
        Some(TraceEntry::File(file)) => download(&state, file).await,
        Some(folder @ TraceEntry::Folder(_)) => Ok(Json(folder).into_response()),
        None => Err(ApiError::NotFound(path.to_string())),
    }
}

async fn download(state: &AppState, file: TraceFile) -> Result<Response, ApiError> {
    let policy = state.manager.config().retry_policy();
    let path = file.path.clone();

    let bytes = tokio::task::spawn_blocking(move || {
        retry_on_sharing_violation(&policy, &path, || std::fs::read(&path))
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    let bytes = match bytes {
        Ok(bytes) => bytes,
        // removed between listing and reading
        Err(tracehouse_storage::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound(file.full_name));
        }
        Err(e) => return Err(e.into()),
    };

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file.name),
            ),
        ],
        bytes,
    )
        .into_response())
}
