//! Error types for stemsplit-server
//!
//! `SeparationError` is the closed set of failure kinds the pipeline
//! produces. Each component returns one of these; the HTTP layer translates
//! them exactly once in `ApiError::into_response`.

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Pipeline error kinds
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SeparationError {
    /// Upload extension not in the configured supported set (client)
    #[error("Unsupported file type '{extension}'. Must be one of: {}", supported.join(", "))]
    UnsupportedFormat {
        extension: String,
        supported: Vec<String>,
    },

    /// Neither native decoding nor the transcoder could read the bytes (client)
    #[error("Could not decode audio: {0}")]
    DecodeFailure(String),

    /// Transcoder program is missing (server/config)
    #[error("Transcoder unavailable: {0}")]
    TranscoderUnavailable(String),

    /// Separation model raised or returned malformed output (server)
    #[error("Model failure: {0}")]
    ModelFailure(String),

    /// Storage backend unreachable or rejected the request (server)
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Stored location no longer exists (server)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Queue has reached its configured capacity
    #[error("Separation queue is full ({0} jobs waiting)")]
    QueueFull(usize),

    /// Queue is shutting down and no longer accepts jobs
    #[error("Separation queue is closed")]
    QueueClosed,
}

impl SeparationError {
    /// True for failures caused by the uploaded content itself
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SeparationError::UnsupportedFormat { .. } | SeparationError::DecodeFailure(_)
        )
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            SeparationError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            SeparationError::DecodeFailure(_) => "DECODE_FAILURE",
            SeparationError::TranscoderUnavailable(_) => "TRANSCODER_UNAVAILABLE",
            SeparationError::ModelFailure(_) => "MODEL_FAILURE",
            SeparationError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            SeparationError::NotFound(_) => "NOT_FOUND",
            SeparationError::QueueFull(_) => "QUEUE_FULL",
            SeparationError::QueueClosed => "QUEUE_CLOSED",
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, SeparationError>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Malformed or oversized multipart upload
    #[error("Invalid upload: {0}")]
    Multipart(#[from] MultipartError),

    /// Pipeline failure, classified by kind
    #[error(transparent)]
    Separation(#[from] SeparationError),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Multipart(err) => (err.status(), "INVALID_UPLOAD", err.body_text()),
            ApiError::Separation(err) if err.is_client_error() => {
                (StatusCode::BAD_REQUEST, err.code(), err.to_string())
            }
            ApiError::Separation(
                err @ (SeparationError::QueueFull(_) | SeparationError::QueueClosed),
            ) => (
                StatusCode::SERVICE_UNAVAILABLE,
                err.code(),
                "Service is busy, try again later".to_string(),
            ),
            ApiError::Separation(err) => {
                error!(code = err.code(), "Separation failed: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    err.code(),
                    "Processing failed".to_string(),
                )
            }
            ApiError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Processing failed".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = std::result::Result<T, ApiError>;
