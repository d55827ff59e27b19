//! API Error Responses
//!
//! Maps failures to HTTP responses:
//!
//! | Error                         | Status | Body                                         |
//! |-------------------------------|--------|----------------------------------------------|
//! | bad id / key / trace payload  | 400    | `{"errors": {"<field>": ["<message>"]}}`     |
//! | unknown file or folder        | 404    | `{"error": "<message>"}`                     |
//! | per-principal buffer full     | 429    | `{"error": "<message>"}`                     |
//! | store shutting down           | 503    | `{"error": "<message>"}`                     |
//! | anything else                 | 500    | `{"error": "<message>"}`                     |

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    BadRequest { field: &'static str, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] tracehouse_storage::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(field: &'static str, message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            field,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        use tracehouse_storage::Error as StorageError;

        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Storage(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Storage(StorageError::BufferFull { .. }) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Storage(StorageError::ShuttingDown) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Storage(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn field(&self) -> &'static str {
        match self {
            ApiError::BadRequest { field, .. } => field,
            ApiError::Storage(tracehouse_storage::Error::InvalidKey) => "key",
            _ => "trace",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = if status == StatusCode::BAD_REQUEST {
            let mut errors = serde_json::Map::new();
            errors.insert(
                self.field().to_string(),
                serde_json::json!([self.to_string()]),
            );
            serde_json::json!({ "errors": errors })
        } else {
            if status.is_server_error() {
                tracing::error!(status = status.as_u16(), error = %self, "Request failed");
            }
            serde_json::json!({ "error": self.to_string() })
        };

        (status, Json(body)).into_response()
    }
}
