use crate::storage::StorageError;
use crate::upload::errors::UploadError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Unified error type for the HTTP surface.
#[derive(Debug, Error)]
pub enum ServiceError {
    // 400 Bad Request
    #[error("Validation error: {0}")]
    Validation(String),

    // 400 Bad Request, carrying the gap report
    #[error("Upload incomplete: {received} of {total} chunks received")]
    IncompleteUpload {
        received: usize,
        total: u32,
        missing: Vec<u32>,
    },

    // 404 Not Found
    #[error("Not found: {0}")]
    NotFound(String),

    // 413 Payload Too Large
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    // 507 Insufficient Storage, retryable after cleanup
    #[error("Insufficient storage: {0}")]
    InsufficientStorage(String),

    // 500 Internal Server Error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) | ServiceError::IncompleteUpload { .. } => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ServiceError::InsufficientStorage(_) => StatusCode::INSUFFICIENT_STORAGE,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            ServiceError::IncompleteUpload {
                received,
                total,
                missing,
            } => json!({
                "error": self.to_string(),
                "uploadedChunks": received,
                "totalChunks": total,
                "missingChunks": missing,
            }),
            ServiceError::InsufficientStorage(_) => json!({
                "error": self.to_string(),
                "retryable": true,
            }),
            ServiceError::Internal(detail) => {
                // Full details stay in the server log.
                error!(error = %detail, "Internal server error");
                json!({ "error": "Internal server error" })
            }
            other => json!({ "error": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

impl From<UploadError> for ServiceError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::InvalidFilename(_)
            | UploadError::InvalidFileType(_)
            | UploadError::FileSizeExceeded(_, _)
            | UploadError::InvalidChunkIndex(_)
            | UploadError::EmptyChunk
            | UploadError::SessionExpired(_) => ServiceError::Validation(err.to_string()),
            UploadError::IncompleteUpload {
                received,
                total,
                missing,
            } => ServiceError::IncompleteUpload {
                received,
                total,
                missing,
            },
            UploadError::SessionNotFound(_) | UploadError::VideoNotFound(_) => {
                ServiceError::NotFound(err.to_string())
            }
            UploadError::ChunkTooLarge(_, _) => ServiceError::PayloadTooLarge(err.to_string()),
            UploadError::StorageFull(msg) => ServiceError::InsufficientStorage(msg),
            UploadError::SizeMismatch { .. } | UploadError::Storage(_) => {
                ServiceError::Internal(err.to_string())
            }
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::StorageFull(msg) => ServiceError::InsufficientStorage(msg),
            StorageError::NotFound(msg) => ServiceError::NotFound(msg),
            StorageError::InvalidPath(msg) => ServiceError::Validation(msg),
            StorageError::Io(e) => ServiceError::Internal(e.to_string()),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
