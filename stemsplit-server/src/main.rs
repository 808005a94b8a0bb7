//! stemsplit-server - Audio stem separation service
//!
//! Accepts an uploaded audio file, normalizes it, runs it through the
//! separation model one job at a time, and returns the stems as a zip
//! archive (streamed, or as a signed URL when object storage is used).

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use stemsplit_common::config::{config_source, ConfigSource};
use stemsplit_common::ServiceConfig;
use stemsplit_server::audio::{FormatNormalizer, Transcoder};
use stemsplit_server::model::{BridgeModel, SeparationModel};
use stemsplit_server::orchestrator::SeparationOrchestrator;
use stemsplit_server::packager::ResultPackager;
use stemsplit_server::queue::SeparationQueue;
use stemsplit_server::{build_router, storage, AppState};

/// Command-line arguments for stemsplit-server
#[derive(Parser, Debug)]
#[command(name = "stemsplit-server")]
#[command(about = "Audio stem separation service")]
#[command(version)]
struct Args {
    /// Path to TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind (overrides server.host)
    #[arg(long, env = "HOST")]
    host: Option<String>,

    /// Port to listen on (overrides server.port)
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        ServiceConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    config
        .apply_env_overrides()
        .context("Invalid environment override")?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    init_tracing(&config)?;

    config.validate().context("Invalid configuration")?;

    info!("Starting stemsplit-server v{}", env!("CARGO_PKG_VERSION"));
    match config_source(args.config.as_deref()) {
        ConfigSource::File(path) => info!("Config: {}", path.display()),
        ConfigSource::Missing(path) => warn!(
            "Config file {} not found, using built-in defaults",
            path.display()
        ),
        ConfigSource::Defaults => info!("Config: built-in defaults"),
    }

    let config = Arc::new(config);
    let shutdown = CancellationToken::new();

    // Storage
    let (storage, local_storage) =
        storage::from_config(&config.storage).context("Failed to initialize storage")?;
    info!("Storage backend: {}", storage.backend_name());

    let sweeper = match (local_storage, config.storage.local.retention()) {
        (Some(local), Some(retention)) => Some(local.spawn_sweeper(
            retention,
            config.storage.local.sweep_interval(),
            shutdown.clone(),
        )),
        _ => None,
    };

    // Model
    let model: Arc<dyn SeparationModel> = Arc::new(BridgeModel::from_config(&config.model));
    info!(
        "Model: {} at {} (sources: {})",
        config.model.name,
        config.model.endpoint,
        config.model.sources.join(", ")
    );

    // Normalizer
    let transcoder = Transcoder::new(config.audio.transcoder.clone());
    if !transcoder.is_available() {
        warn!(
            "Transcoder {} not found; formats the native decoder cannot read will fail",
            transcoder.program().display()
        );
    }
    let normalizer = Arc::new(FormatNormalizer::new(
        config.supported_extensions(),
        transcoder,
    ));

    // Queue
    let queue = SeparationQueue::start(
        &config.queue,
        Arc::clone(&model),
        ResultPackager::new(),
        Arc::clone(&storage),
    );

    let orchestrator = SeparationOrchestrator::new(normalizer, queue.handle(), storage);
    let state = AppState::new(orchestrator, model, Arc::clone(&config));
    let app = build_router(state);

    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port))
            .await
            .with_context(|| {
                format!(
                    "Failed to bind to {}:{}",
                    config.server.host, config.server.port
                )
            })?;
    let addr = listener.local_addr().context("Failed to read bound address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Drain in-flight separations before exiting
    shutdown.cancel();
    queue.shutdown().await;
    if let Some(sweeper) = sweeper {
        let _ = sweeper.await;
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Console logging plus an optional plain-text log file
fn init_tracing(config: &ServiceConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("Invalid logging.level filter")?;

    let file_layer = match &config.logging.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create log directory {}", parent.display())
                })?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
