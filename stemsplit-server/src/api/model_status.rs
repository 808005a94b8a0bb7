//! Model readiness endpoint
//!
//! Probes the model on every call. Always answers 200; the `status` field
//! says whether the model is usable.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::model::ModelInfo;
use crate::queue::QueueStats;
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ModelStatusResponse {
    Loaded {
        status: &'static str,
        info: ModelInfo,
        queue: QueueStats,
    },
    Failed {
        status: &'static str,
        error: String,
    },
}

/// GET /model-status
pub async fn model_status(State(state): State<AppState>) -> Json<ModelStatusResponse> {
    let model = Arc::clone(&state.model);
    let probe = tokio::task::spawn_blocking(move || model.probe().map(|_| model.info())).await;

    let response = match probe {
        Ok(Ok(info)) => ModelStatusResponse::Loaded {
            status: "model loaded",
            info,
            queue: state.orchestrator.queue().stats(),
        },
        Ok(Err(e)) => {
            warn!("Model probe failed: {}", e);
            ModelStatusResponse::Failed {
                status: "model failed",
                error: e.to_string(),
            }
        }
        Err(e) => ModelStatusResponse::Failed {
            status: "model failed",
            error: format!("probe task failed: {}", e),
        },
    };

    Json(response)
}

pub fn model_status_routes() -> Router<AppState> {
    Router::new().route("/model-status", get(model_status))
}
