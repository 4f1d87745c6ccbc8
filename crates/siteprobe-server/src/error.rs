//! Error responses for HTTP handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use siteprobe_db::DatabaseError;
use siteprobe_scanner::ScanError;

/// JSON error body returned by every failing handler.
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    /// Machine-readable code (e.g. `INVALID_REQUEST`)
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl ApiError {
    /// Create a new API error.
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    /// 400 for a malformed or incomplete request.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message)
    }

    /// 404 for an unknown scan.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    /// 500 for anything the caller cannot fix.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self }));
        (self.status, body).into_response()
    }
}

impl From<ScanError> for ApiError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::Validation(e) => Self::bad_request(e.to_string()),
            ScanError::Duplicate(id) => Self::new(
                StatusCode::CONFLICT,
                "SCAN_EXISTS",
                format!("Scan {id} already exists"),
            ),
            other => {
                tracing::error!("Scan request failed: {}", other);
                Self::internal(other.to_string())
            }
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFoundWithMessage(message) => Self::not_found(message),
            other => {
                tracing::error!("Database error while serving request: {}", other);
                Self::internal(format!("Database error: {other}"))
            }
        }
    }
}
