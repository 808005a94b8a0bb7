//! Service metadata endpoint

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use crate::AppState;

/// GET /
pub async fn root() -> Json<Value> {
    Json(json!({
        "service": "Audio Stem Separation API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": ["/separate", "/health", "/model-status"],
    }))
}

pub fn root_routes() -> Router<AppState> {
    Router::new().route("/", get(root))
}
