//! Configuration loading and validation
//!
//! Resolution order for the config file:
//! 1. Command-line argument (highest priority)
//! 2. `STEMSPLIT_CONFIG` environment variable
//! 3. Platform config directory (`<config_dir>/stemsplit/config.toml`)
//! 4. Built-in defaults (no file)
//!
//! A missing file is not fatal: the service logs a warning and starts with
//! defaults. A file that exists but cannot be parsed is an error.
//! After loading, a handful of environment variables may override individual
//! fields (see [`ServiceConfig::apply_env_overrides`]), then
//! [`ServiceConfig::validate`] checks the result once at startup.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "STEMSPLIT_CONFIG";

/// Longest presigned URL lifetime accepted by S3-compatible stores (7 days)
pub const MAX_SIGNED_URL_EXPIRY_MINUTES: u64 = 7 * 24 * 60;

/// Longest local retention window (one year)
pub const MAX_RETENTION_MINUTES: u64 = 365 * 24 * 60;

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub audio: AudioConfig,
    pub model: ModelConfig,
    pub queue: QueueConfig,
    pub storage: StorageConfig,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins; empty disables the CORS layer
    pub cors_origins: Vec<String>,
    /// Request timeout in seconds.
    ///
    /// Parsed and validated but not enforced: a separation request runs to
    /// completion regardless of how long the model takes.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
            request_timeout_secs: 300,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log filter directive (e.g. "info", "stemsplit_server=debug")
    pub level: String,

    /// Log file path (optional, logs to stderr only if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "stemsplit_server=info,tower_http=info".to_string(),
            file: None,
        }
    }
}

/// Input audio handling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Accepted upload extensions, dot-prefixed and lowercase
    pub supported_formats: Vec<String>,
    /// Maximum upload size in megabytes
    pub max_upload_mb: usize,
    /// Transcoder program used when native decoding fails
    pub transcoder: PathBuf,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            supported_formats: [".wav", ".mp3", ".aif", ".aiff", ".m4a", ".flac", ".ogg"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_upload_mb: 100,
            transcoder: PathBuf::from("ffmpeg"),
        }
    }
}

impl AudioConfig {
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

/// Separation model client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model identifier reported by the service and sent to the bridge
    pub name: String,
    /// Base URL of the inference bridge
    pub endpoint: String,
    /// Declared source names, in the order the model produces them
    pub sources: Vec<String>,
    /// Per-call timeout for the inference bridge
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "htdemucs".to_string(),
            endpoint: "http://127.0.0.1:8001".to_string(),
            sources: ["drums", "bass", "other", "vocals"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            timeout_secs: 600,
        }
    }
}

impl ModelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Separation queue tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Number of model invocations allowed at once
    pub workers: usize,
    /// Maximum number of waiting jobs; `None` means unbounded
    pub capacity: Option<usize>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            capacity: None,
        }
    }
}

/// Which storage backend delivers results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Ephemeral local files, streamed back in the response
    Local,
    /// Object storage, answered with a signed URL
    Object,
}

impl std::str::FromStr for StorageBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "object" | "gcs" | "s3" => Ok(Self::Object),
            other => Err(Error::Config(format!("unknown storage backend '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub local: LocalStorageConfig,
    pub object: ObjectStorageConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            local: LocalStorageConfig::default(),
            object: ObjectStorageConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalStorageConfig {
    pub root: PathBuf,
    /// Delete artifacts older than this; `None` keeps them forever
    pub retention_minutes: Option<u64>,
    pub sweep_interval_secs: u64,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root: std::env::temp_dir().join("stemsplit"),
            retention_minutes: None,
            sweep_interval_secs: 60,
        }
    }
}

impl LocalStorageConfig {
    /// Retention window, if local artifacts expire at all
    pub fn retention(&self) -> Option<Duration> {
        self.retention_minutes
            .map(|minutes| Duration::from_secs(minutes.saturating_mul(60)))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectStorageConfig {
    /// S3-compatible endpoint (scheme + host, optional port)
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub signed_url_expiry_minutes: u64,
    /// Environment variable holding the access key id
    pub access_key_env: String,
    /// Environment variable holding the secret key
    pub secret_key_env: String,
    /// Environment variable holding an optional session token
    pub session_token_env: String,
}

impl Default for ObjectStorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://storage.googleapis.com".to_string(),
            bucket: "stem-splitter-bucket".to_string(),
            region: "auto".to_string(),
            signed_url_expiry_minutes: 15,
            access_key_env: "STEMSPLIT_ACCESS_KEY_ID".to_string(),
            secret_key_env: "STEMSPLIT_SECRET_ACCESS_KEY".to_string(),
            session_token_env: "STEMSPLIT_SESSION_TOKEN".to_string(),
        }
    }
}

impl ObjectStorageConfig {
    pub fn signed_url_expiry(&self) -> Duration {
        Duration::from_secs(self.signed_url_expiry_minutes * 60)
    }
}

impl ServiceConfig {
    /// Resolve the config file path and load it.
    ///
    /// Falls back to defaults if no file is found.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_path) {
            Some(path) if path.exists() => Self::from_file(&path),
            Some(path) => {
                if cli_path.is_some() {
                    return Err(Error::Config(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                warn!("Config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            None => {
                warn!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Apply environment variable overrides on top of file values.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(backend) = std::env::var("STEMSPLIT_STORAGE_BACKEND") {
            self.storage.backend = backend.parse()?;
        }
        if let Ok(bucket) = std::env::var("STEMSPLIT_BUCKET") {
            self.storage.object.bucket = bucket;
        }
        if let Ok(endpoint) = std::env::var("STEMSPLIT_MODEL_ENDPOINT") {
            self.model.endpoint = endpoint;
        }
        Ok(())
    }

    /// Check cross-field constraints. Called once at startup.
    pub fn validate(&self) -> Result<()> {
        if self.queue.workers == 0 {
            return Err(Error::Config("queue.workers must be at least 1".to_string()));
        }
        if self.queue.capacity == Some(0) {
            return Err(Error::Config(
                "queue.capacity must be at least 1 when set".to_string(),
            ));
        }

        if self.model.sources.is_empty() {
            return Err(Error::Config("model.sources must not be empty".to_string()));
        }
        let mut seen = HashSet::new();
        for source in &self.model.sources {
            if source.trim().is_empty() || source.contains('/') {
                return Err(Error::Config(format!("invalid model source name '{}'", source)));
            }
            if !seen.insert(source.as_str()) {
                return Err(Error::Config(format!("duplicate model source '{}'", source)));
            }
        }

        if self.audio.supported_formats.is_empty() {
            return Err(Error::Config(
                "audio.supported_formats must not be empty".to_string(),
            ));
        }
        if let Some(bad) = self
            .audio
            .supported_formats
            .iter()
            .find(|ext| !ext.starts_with('.') || ext.len() < 2)
        {
            return Err(Error::Config(format!(
                "supported format '{}' must be a dot-prefixed extension",
                bad
            )));
        }
        if self.audio.max_upload_mb == 0 {
            return Err(Error::Config("audio.max_upload_mb must be positive".to_string()));
        }

        if self.server.request_timeout_secs == 0 {
            return Err(Error::Config(
                "server.request_timeout_secs must be positive".to_string(),
            ));
        }

        let expiry = self.storage.object.signed_url_expiry_minutes;
        if expiry == 0 || expiry > MAX_SIGNED_URL_EXPIRY_MINUTES {
            return Err(Error::Config(format!(
                "storage.object.signed_url_expiry_minutes must be within 1..={}",
                MAX_SIGNED_URL_EXPIRY_MINUTES
            )));
        }

        if self.storage.backend == StorageBackend::Object {
            if self.storage.object.bucket.trim().is_empty() {
                return Err(Error::Config("storage.object.bucket is required".to_string()));
            }
            if !self.storage.object.endpoint.starts_with("http://")
                && !self.storage.object.endpoint.starts_with("https://")
            {
                return Err(Error::Config(format!(
                    "storage.object.endpoint '{}' must be an http(s) URL",
                    self.storage.object.endpoint
                )));
            }
        }

        if let Some(minutes) = self.storage.local.retention_minutes {
            if minutes == 0 || minutes > MAX_RETENTION_MINUTES {
                return Err(Error::Config(format!(
                    "storage.local.retention_minutes must be within 1..={} when set",
                    MAX_RETENTION_MINUTES
                )));
            }
        }
        if self.storage.local.sweep_interval_secs == 0 {
            return Err(Error::Config(
                "storage.local.sweep_interval_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Normalized supported extensions (lowercase)
    pub fn supported_extensions(&self) -> Vec<String> {
        self.audio
            .supported_formats
            .iter()
            .map(|ext| ext.to_ascii_lowercase())
            .collect()
    }
}

/// Where the configuration came from, for startup logging
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Loaded from this file
    File(PathBuf),
    /// This file was looked for but does not exist; defaults were used
    Missing(PathBuf),
    /// No candidate path at all; defaults were used
    Defaults,
}

/// Describe which source [`ServiceConfig::load`] uses for `cli_path`.
///
/// `load` runs before logging is set up, so the binary calls this once the
/// subscriber is installed to report the outcome.
pub fn config_source(cli_path: Option<&Path>) -> ConfigSource {
    match resolve_config_path(cli_path) {
        Some(path) if path.exists() => ConfigSource::File(path),
        Some(path) => ConfigSource::Missing(path),
        None => ConfigSource::Defaults,
    }
}

/// Find the config file to load, without checking that it exists.
pub fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    dirs::config_dir().map(|d| d.join("stemsplit").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServiceConfig::default();
        config.validate().unwrap();
        assert_eq!(config.queue.workers, 1);
        assert_eq!(config.storage.backend, StorageBackend::Local);
        assert_eq!(config.storage.object.signed_url_expiry_minutes, 15);
        assert_eq!(config.model.sources, vec!["drums", "bass", "other", "vocals"]);
        assert!(config.audio.supported_formats.contains(&".m4a".to_string()));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ServiceConfig::from_toml_str(
            r#"
            [queue]
            workers = 2

            [storage]
            backend = "object"

            [storage.object]
            bucket = "stems"
            signed_url_expiry_minutes = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.queue.workers, 2);
        assert_eq!(config.queue.capacity, None);
        assert_eq!(config.storage.backend, StorageBackend::Object);
        assert_eq!(config.storage.object.bucket, "stems");
        assert_eq!(config.storage.object.signed_url_expiry(), Duration::from_secs(1800));
        assert_eq!(config.storage.object.region, "auto");
        assert_eq!(config.server.port, 8000);
        config.validate().unwrap();
    }

    #[test]
    fn test_malformed_toml_is_error() {
        let result = ServiceConfig::from_toml_str("[queue\nworkers = ");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = ServiceConfig::default();
        config.queue.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_sources() {
        let mut config = ServiceConfig::default();
        config.model.sources = vec!["drums".into(), "drums".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_undotted_format() {
        let mut config = ServiceConfig::default();
        config.audio.supported_formats = vec!["wav".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_expiry_out_of_range() {
        let mut config = ServiceConfig::default();
        config.storage.object.signed_url_expiry_minutes = 0;
        assert!(config.validate().is_err());
        config.storage.object.signed_url_expiry_minutes = MAX_SIGNED_URL_EXPIRY_MINUTES + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_object_backend_requires_http_endpoint() {
        let mut config = ServiceConfig::default();
        config.storage.backend = StorageBackend::Object;
        config.storage.object.endpoint = "storage.example.com".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_storage_backend_parse() {
        assert_eq!("LOCAL".parse::<StorageBackend>().unwrap(), StorageBackend::Local);
        assert_eq!("gcs".parse::<StorageBackend>().unwrap(), StorageBackend::Object);
        assert!("ftp".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_cli_path_wins() {
        let path = resolve_config_path(Some(Path::new("/etc/stemsplit/custom.toml")));
        assert_eq!(path, Some(PathBuf::from("/etc/stemsplit/custom.toml")));
    }

    #[test]
    fn test_validate_rejects_retention_out_of_range() {
        let mut config = ServiceConfig::default();
        config.storage.local.retention_minutes = Some(0);
        assert!(config.validate().is_err());
        config.storage.local.retention_minutes = Some(u64::MAX);
        assert!(config.validate().is_err());
        config.storage.local.retention_minutes = Some(MAX_RETENTION_MINUTES);
        config.validate().unwrap();
    }

    #[test]
    fn test_retention_duration_never_overflows() {
        let mut local = LocalStorageConfig::default();
        assert_eq!(local.retention(), None);

        local.retention_minutes = Some(90);
        assert_eq!(local.retention(), Some(Duration::from_secs(5400)));

        local.retention_minutes = Some(u64::MAX);
        assert_eq!(local.retention(), Some(Duration::from_secs(u64::MAX)));
    }

    #[test]
    fn test_config_source_reports_missing_file() {
        let missing = Path::new("/nonexistent/stemsplit/config.toml");
        assert_eq!(
            config_source(Some(missing)),
            ConfigSource::Missing(missing.to_path_buf())
        );

        let dir = tempfile::TempDir::new().unwrap();
        let present = dir.path().join("config.toml");
        std::fs::write(&present, "").unwrap();
        assert_eq!(
            config_source(Some(&present)),
            ConfigSource::File(present.clone())
        );
    }

    #[test]
    fn test_load_missing_cli_path_is_error() {
        let result = ServiceConfig::load(Some(Path::new("/nonexistent/stemsplit.toml")));
        assert!(result.is_err());
    }
}
