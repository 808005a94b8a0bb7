//! HTTP API Integration Tests
//!
//! Drive the router in-process with `oneshot` requests: the full upload →
//! normalize → separate → package → deliver path, error mapping, and the
//! status endpoints.

mod helpers;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use helpers::{
    default_sources, generate_test_wav, multipart_request, test_app_state, AudioConfig, MockModel,
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::io::{Cursor, Read};
use std::sync::Arc;
use stemsplit_common::{NormalizedAudio, ServiceConfig};
use stemsplit_server::build_router;
use stemsplit_server::storage::{LocalStorage, StorageGateway};
use tempfile::TempDir;
use tower::ServiceExt;
use zip::ZipArchive;

const MISSING_TRANSCODER: &str = "/nonexistent/bin/ffmpeg";

fn local_storage(dir: &TempDir) -> Arc<dyn StorageGateway> {
    Arc::new(LocalStorage::new(dir.path().join("store")).unwrap())
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn test_separate_returns_stems_archive() {
    // Given: a 2 second mono WAV at 22.05kHz
    let dir = TempDir::new().unwrap();
    let model = Arc::new(MockModel::new(default_sources()));
    let (state, queue) = test_app_state(
        ServiceConfig::default(),
        model.clone(),
        local_storage(&dir),
        MISSING_TRANSCODER,
    );
    let app = build_router(state);
    let wav = generate_test_wav(&AudioConfig {
        duration_seconds: 2.0,
        sample_rate: 22050,
        channels: 1,
    });

    // When: it is uploaded
    let response = app
        .oneshot(multipart_request("/separate", "file", "tone.wav", &wav))
        .await
        .unwrap();

    // Then: the response is a zip download named after the upload
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/zip"
    );
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment"));
    assert!(disposition.contains("tone_stems.zip"));

    // And: it holds one canonical WAV per declared source, in order
    let bytes = body_bytes(response).await;
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    assert_eq!(names, vec!["drums.wav", "bass.wav", "other.wav", "vocals.wav"]);

    for name in &names {
        let mut wav = Vec::new();
        archive.by_name(name).unwrap().read_to_end(&mut wav).unwrap();
        let stem = NormalizedAudio::from_wav_bytes(&wav).unwrap();
        assert!((stem.duration_seconds() - 2.0).abs() < 0.01);
    }

    assert_eq!(model.calls(), 1);
    queue.shutdown().await;
}

#[tokio::test]
async fn test_unsupported_extension_is_rejected_before_model() {
    // Given: a valid WAV payload with an unsupported name
    let dir = TempDir::new().unwrap();
    let model = Arc::new(MockModel::new(default_sources()));
    let (state, queue) = test_app_state(
        ServiceConfig::default(),
        model.clone(),
        local_storage(&dir),
        MISSING_TRANSCODER,
    );
    let app = build_router(state);
    let wav = generate_test_wav(&AudioConfig::default());

    // When: it is uploaded as clip.xyz
    let response = app
        .oneshot(multipart_request("/separate", "file", "clip.xyz", &wav))
        .await
        .unwrap();

    // Then: 400 naming the extension, and the model was never called
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "UNSUPPORTED_FORMAT");
    let message = json["error"]["message"].as_str().unwrap();
    assert!(message.contains(".xyz"));
    assert!(message.contains(".wav"));
    assert_eq!(model.calls(), 0);

    queue.shutdown().await;
}

#[tokio::test]
async fn test_missing_file_field_is_bad_request() {
    let dir = TempDir::new().unwrap();
    let model = Arc::new(MockModel::new(default_sources()));
    let (state, queue) = test_app_state(
        ServiceConfig::default(),
        model.clone(),
        local_storage(&dir),
        MISSING_TRANSCODER,
    );
    let app = build_router(state);

    let response = app
        .oneshot(multipart_request("/separate", "audio", "tone.wav", b"RIFF"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "BAD_REQUEST");
    assert_eq!(model.calls(), 0);

    queue.shutdown().await;
}

#[tokio::test]
async fn test_missing_transcoder_is_server_error() {
    // Given: bytes the native decoder cannot read, and no transcoder
    let dir = TempDir::new().unwrap();
    let model = Arc::new(MockModel::new(default_sources()));
    let (state, queue) = test_app_state(
        ServiceConfig::default(),
        model.clone(),
        local_storage(&dir),
        MISSING_TRANSCODER,
    );
    let app = build_router(state.clone());

    // When: uploaded with a supported extension
    let response = app
        .oneshot(multipart_request(
            "/separate",
            "file",
            "song.m4a",
            b"definitely not an m4a file",
        ))
        .await
        .unwrap();

    // Then: 500 with a generic message, detail kept server-side
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "TRANSCODER_UNAVAILABLE");
    assert_eq!(json["error"]["message"], "Processing failed");
    assert_eq!(model.calls(), 0);
    assert_eq!(
        state.last_error.read().await.as_deref(),
        Some("TRANSCODER_UNAVAILABLE")
    );

    queue.shutdown().await;
}

#[cfg(unix)]
#[tokio::test]
async fn test_undecodable_upload_is_client_error() {
    // Given: a transcoder that runs but cannot convert anything
    let dir = TempDir::new().unwrap();
    let model = Arc::new(MockModel::new(default_sources()));
    let (state, queue) = test_app_state(
        ServiceConfig::default(),
        model.clone(),
        local_storage(&dir),
        "false",
    );
    let app = build_router(state);

    let response = app
        .oneshot(multipart_request("/separate", "file", "noise.ogg", b"garbage bytes"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "DECODE_FAILURE");
    assert_eq!(model.calls(), 0);

    queue.shutdown().await;
}

#[tokio::test]
async fn test_model_failure_is_server_error() {
    let dir = TempDir::new().unwrap();
    let model = Arc::new(MockModel::new(default_sources()).failing("weights missing"));
    let (state, queue) = test_app_state(
        ServiceConfig::default(),
        model.clone(),
        local_storage(&dir),
        MISSING_TRANSCODER,
    );
    let app = build_router(state);
    let wav = generate_test_wav(&AudioConfig::default());

    let response = app
        .oneshot(multipart_request("/separate", "file", "tone.wav", &wav))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "MODEL_FAILURE");
    assert!(!json["error"]["message"]
        .as_str()
        .unwrap()
        .contains("weights missing"));
    assert_eq!(model.calls(), 1);

    queue.shutdown().await;
}

#[tokio::test]
async fn test_health_reports_failure_code_without_detail() {
    // Given: a model whose failure message names internal paths
    let dir = TempDir::new().unwrap();
    let model = Arc::new(
        MockModel::new(default_sources()).failing("secret internal detail at /opt/models/htdemucs.th"),
    );
    let (state, queue) = test_app_state(
        ServiceConfig::default(),
        model,
        local_storage(&dir),
        MISSING_TRANSCODER,
    );
    let app = build_router(state);
    let wav = generate_test_wav(&AudioConfig::default());

    // When: a separation fails and /health is requested
    let response = app
        .clone()
        .oneshot(multipart_request("/separate", "file", "tone.wav", &wav))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    // Then: only the error code is reported
    assert_eq!(response.status(), StatusCode::OK);
    let body = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(!body.contains("secret internal detail"));
    assert!(!body.contains("/opt/models"));
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["last_error"], "MODEL_FAILURE");
    assert_eq!(json["queue"]["failed"], 1);

    queue.shutdown().await;
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let dir = TempDir::new().unwrap();
    let model = Arc::new(MockModel::new(default_sources()));
    let mut config = ServiceConfig::default();
    config.audio.max_upload_mb = 1;
    let (state, queue) = test_app_state(config, model.clone(), local_storage(&dir), MISSING_TRANSCODER);
    let app = build_router(state);

    let too_big = vec![0u8; 2 * 1024 * 1024];
    let response = app
        .oneshot(multipart_request("/separate", "file", "big.wav", &too_big))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(model.calls(), 0);

    queue.shutdown().await;
}

#[tokio::test]
async fn test_health_reports_queue_and_storage() {
    let dir = TempDir::new().unwrap();
    let model = Arc::new(MockModel::new(default_sources()));
    let (state, queue) = test_app_state(
        ServiceConfig::default(),
        model,
        local_storage(&dir),
        MISSING_TRANSCODER,
    );
    let app = build_router(state);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["storage"], "local");
    assert_eq!(json["queue"]["workers"], 1);
    assert_eq!(json["queue"]["completed"], 0);
    assert!(json.get("last_error").is_none());

    queue.shutdown().await;
}

#[tokio::test]
async fn test_model_status_loaded_and_failed() {
    let dir = TempDir::new().unwrap();

    // Given: a healthy model
    let model = Arc::new(MockModel::new(default_sources()));
    let (state, queue) = test_app_state(
        ServiceConfig::default(),
        model,
        local_storage(&dir),
        MISSING_TRANSCODER,
    );
    let response = build_router(state)
        .oneshot(Request::builder().uri("/model-status").body(Body::empty()).unwrap())
        .await
        .unwrap();

    // Then: reported loaded with its sources
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "model loaded");
    assert_eq!(json["info"]["name"], "mock");
    assert_eq!(json["info"]["sources"][3], "vocals");
    assert_eq!(json["info"]["sample_rate"], 44100);
    queue.shutdown().await;

    // Given: a model whose probe fails
    let broken = Arc::new(MockModel::new(default_sources()).failing("no GPU"));
    let (state, queue) = test_app_state(
        ServiceConfig::default(),
        broken,
        local_storage(&dir),
        MISSING_TRANSCODER,
    );
    let response = build_router(state)
        .oneshot(Request::builder().uri("/model-status").body(Body::empty()).unwrap())
        .await
        .unwrap();

    // Then: still 200, reported failed with the reason
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "model failed");
    assert!(json["error"].as_str().unwrap().contains("no GPU"));
    queue.shutdown().await;
}

#[tokio::test]
async fn test_root_describes_service() {
    let dir = TempDir::new().unwrap();
    let model = Arc::new(MockModel::new(default_sources()));
    let (state, queue) = test_app_state(
        ServiceConfig::default(),
        model,
        local_storage(&dir),
        MISSING_TRANSCODER,
    );

    let response = build_router(state)
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["service"], "Audio Stem Separation API");
    assert_eq!(json["status"], "running");

    queue.shutdown().await;
}
