//! stemsplit-server library interface
//!
//! Exposes the separation pipeline and HTTP router for the binary and for
//! integration tests.

pub mod api;
pub mod audio;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod packager;
pub mod queue;
pub mod storage;

pub use crate::error::{ApiError, ApiResult, Result, SeparationError};

use axum::http::{HeaderValue, Method};
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use stemsplit_common::ServiceConfig;
use tokio::sync::RwLock;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::model::SeparationModel;
use crate::orchestrator::SeparationOrchestrator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: SeparationOrchestrator,
    pub model: Arc<dyn SeparationModel>,
    pub config: Arc<ServiceConfig>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Code of the last server-side failure, reported by /health
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        orchestrator: SeparationOrchestrator,
        model: Arc<dyn SeparationModel>,
        config: Arc<ServiceConfig>,
    ) -> Self {
        Self {
            orchestrator,
            model,
            config,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let max_upload_bytes = state.config.audio.max_upload_bytes();
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .merge(api::root_routes())
        .merge(api::health_routes())
        .merge(api::model_status_routes())
        .merge(api::separate_routes(max_upload_bytes))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// CORS for the configured origins. `*` allows any origin without
/// credentials; explicit origins allow credentials.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(AllowMethods::list([Method::GET, Method::POST, Method::OPTIONS]))
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}
