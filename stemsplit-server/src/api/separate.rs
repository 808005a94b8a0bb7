//! POST /separate
//!
//! Accepts one audio file as multipart field `file` and answers with either
//! the stems archive itself (local storage) or a JSON document pointing at
//! a signed URL (object storage).

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info};

use crate::audio::AudioAsset;
use crate::error::{ApiError, ApiResult};
use crate::storage::Delivery;
use crate::AppState;

/// Multipart field carrying the upload
pub const FILE_FIELD: &str = "file";

/// Allowance for multipart framing on top of the file size limit
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Signed URL response for object storage delivery
#[derive(Debug, Serialize)]
pub struct SignedUrlResponse {
    pub url: String,
    pub content_type: String,
    /// RFC 3339 expiry of `url`
    pub expires_at: String,
}

/// POST /separate
pub async fn separate(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult<Response> {
    let mut upload: Option<(String, Bytes)> = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            debug!(field = ?field.name(), "Ignoring multipart field");
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        // Reject by name before buffering the body
        state.orchestrator.normalizer().check_format(&filename)?;

        let bytes = field.bytes().await?;
        info!(filename = %filename, bytes = bytes.len(), "Received upload");
        upload = Some((filename, bytes));
        break;
    }

    let (filename, bytes) = upload
        .ok_or_else(|| ApiError::BadRequest(format!("Missing '{}' field", FILE_FIELD)))?;

    let delivery = match state
        .orchestrator
        .separate(AudioAsset::new(bytes, filename))
        .await
    {
        Ok(delivery) => delivery,
        Err(e) => {
            if !e.is_client_error() {
                // Only the code: /health is public
                *state.last_error.write().await = Some(e.code().to_string());
            }
            return Err(e.into());
        }
    };

    delivery_response(delivery)
}

/// Render a delivery as an HTTP response
pub fn delivery_response(delivery: Delivery) -> ApiResult<Response> {
    match delivery {
        Delivery::Stream {
            filename,
            content_type,
            content_length,
            body,
        } => {
            let mut builder = Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, content_type)
                .header(
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", filename),
                );
            if let Some(len) = content_length {
                builder = builder.header(header::CONTENT_LENGTH, len);
            }
            builder
                .body(Body::from_stream(body))
                .map_err(|e| ApiError::Internal(format!("build response: {}", e)))
        }
        Delivery::SignedUrl {
            url,
            content_type,
            expires_at,
        } => Ok(Json(SignedUrlResponse {
            url,
            content_type,
            expires_at: expires_at.to_rfc3339(),
        })
        .into_response()),
    }
}

/// Build separation routes with the upload size limit applied
pub fn separate_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/separate", post(separate))
        .layer(DefaultBodyLimit::max(
            max_upload_bytes.saturating_add(MULTIPART_OVERHEAD),
        ))
}
