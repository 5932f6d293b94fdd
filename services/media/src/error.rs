//! Error types for the media service and their HTTP mapping.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::routes::ApiResponse;

/// Errors raised by an object storage backend
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("delete failed: {0}")]
    DeleteFailed(String),

    #[error("fetch failed: {0}")]
    FetchFailed(String),

    #[error("object not found: {0}")]
    NotFound(String),
}

/// Errors raised by a metadata store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: uuid::Uuid, reason: String },

    #[error("duplicate storage key: {0}")]
    DuplicateKey(String),
}

pub type MediaResult<T> = Result<T, MediaError>;

/// Errors surfaced by media operations
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("requested range starts beyond {size} bytes")]
    RangeNotSatisfiable { size: i64 },

    /// The store answered but did not confirm the destroy
    #[error("{0}")]
    StorageRejected(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("metadata store error: {0}")]
    Store(#[from] StoreError),
}

impl MediaError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            MediaError::Validation(_) => StatusCode::BAD_REQUEST,
            MediaError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            MediaError::Forbidden(_) => StatusCode::FORBIDDEN,
            MediaError::NotFound(_) => StatusCode::NOT_FOUND,
            MediaError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            MediaError::StorageRejected(_) | MediaError::Storage(_) | MediaError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Caller-facing summary; upstream failures get a fixed message and
    /// carry the rendered cause in the `error` field instead.
    fn message(&self) -> String {
        match self {
            MediaError::Storage(_) => "Object storage request failed.".to_string(),
            MediaError::Store(_) => "Metadata store request failed.".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for MediaError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = ApiResponse {
            message: self.message(),
            success: false,
            files: None,
            error: Some(self.to_string()),
        };

        match self {
            MediaError::RangeNotSatisfiable { size } => (
                status,
                [(header::CONTENT_RANGE, format!("bytes */{}", size))],
                Json(body),
            )
                .into_response(),
            _ => (status, Json(body)).into_response(),
        }
    }
}
