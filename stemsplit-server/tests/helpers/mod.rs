//! Test Helper Utilities
//!
//! Shared utilities for stemsplit-server integration tests

#![allow(dead_code)]

pub mod audio_generator;
pub mod mock_bucket;
pub mod mock_model;
pub mod multipart;

pub use audio_generator::{generate_test_wav, AudioConfig};
pub use mock_bucket::MockBucket;
pub use mock_model::MockModel;
pub use multipart::multipart_request;

use std::sync::Arc;
use stemsplit_common::config::QueueConfig;
use stemsplit_common::ServiceConfig;
use stemsplit_server::audio::{FormatNormalizer, Transcoder};
use stemsplit_server::model::SeparationModel;
use stemsplit_server::orchestrator::SeparationOrchestrator;
use stemsplit_server::packager::ResultPackager;
use stemsplit_server::queue::SeparationQueue;
use stemsplit_server::storage::StorageGateway;
use stemsplit_server::AppState;

/// Declared sources used by the mock model (htdemucs order)
pub fn default_sources() -> Vec<String> {
    ["drums", "bass", "other", "vocals"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Start a queue over the given model and storage
pub fn start_queue(
    workers: usize,
    model: Arc<dyn SeparationModel>,
    storage: Arc<dyn StorageGateway>,
) -> SeparationQueue {
    let config = QueueConfig {
        workers,
        capacity: None,
    };
    SeparationQueue::start(&config, model, ResultPackager::new(), storage)
}

/// Assemble application state the way the binary does, with a chosen
/// transcoder program.
pub fn test_app_state(
    config: ServiceConfig,
    model: Arc<dyn SeparationModel>,
    storage: Arc<dyn StorageGateway>,
    transcoder: &str,
) -> (AppState, SeparationQueue) {
    let queue = SeparationQueue::start(
        &config.queue,
        Arc::clone(&model),
        ResultPackager::new(),
        Arc::clone(&storage),
    );
    let normalizer = Arc::new(FormatNormalizer::new(
        config.supported_extensions(),
        Transcoder::new(transcoder),
    ));
    let orchestrator = SeparationOrchestrator::new(normalizer, queue.handle(), storage);
    let state = AppState::new(orchestrator, model, Arc::new(config));
    (state, queue)
}
