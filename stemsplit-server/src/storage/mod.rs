//! Storage gateway
//!
//! Persists result artifacts and turns a stored location into something a
//! client can fetch: a byte stream for the local backend, a time-limited
//! signed URL for the durable object backend. The backend is chosen once at
//! startup from configuration.

pub mod credentials;
pub mod local;
pub mod object;
pub mod signing;

pub use credentials::{CredentialProvider, Credentials, EnvCredentialProvider};
pub use local::LocalStorage;
pub use object::ObjectStorage;

use crate::error::{Result, SeparationError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use std::fmt;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use stemsplit_common::config::{StorageBackend, StorageConfig};
use uuid::Uuid;

/// Kind of artifact being stored; drives file extension and content type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileKind {
    /// Zip archive of stems
    Archive,
    /// Canonical WAV audio
    CanonicalAudio,
    /// Anything else, by dot-prefixed extension
    Other(String),
}

impl FileKind {
    pub fn extension(&self) -> &str {
        match self {
            FileKind::Archive => ".zip",
            FileKind::CanonicalAudio => ".wav",
            FileKind::Other(ext) => ext.as_str(),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            FileKind::Archive => "application/zip",
            FileKind::CanonicalAudio => "audio/wav",
            FileKind::Other(_) => "application/octet-stream",
        }
    }

    /// Infer the kind from a stored key or path
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            FileKind::Archive
        } else if lower.ends_with(".wav") {
            FileKind::CanonicalAudio
        } else {
            let ext = std::path::Path::new(&lower)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| format!(".{}", e))
                .unwrap_or_default();
            FileKind::Other(ext)
        }
    }
}

/// Where an artifact was stored. Only meaningful to the backend that
/// produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLocation {
    Local(PathBuf),
    Object { bucket: String, key: String },
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageLocation::Local(path) => write!(f, "{}", path.display()),
            StorageLocation::Object { bucket, key } => write!(f, "s3://{}/{}", bucket, key),
        }
    }
}

impl StorageLocation {
    fn name(&self) -> String {
        match self {
            StorageLocation::Local(path) => path.to_string_lossy().into_owned(),
            StorageLocation::Object { key, .. } => key.clone(),
        }
    }

    pub fn kind(&self) -> FileKind {
        FileKind::from_name(&self.name())
    }
}

/// Byte stream handed to the HTTP layer for streamed delivery
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<bytes::Bytes>> + Send>>;

/// How a result reaches the client
pub enum Delivery {
    /// Stream the artifact in the response body
    Stream {
        filename: String,
        content_type: String,
        content_length: Option<u64>,
        body: ByteStream,
    },
    /// Point the client at a time-limited URL
    SignedUrl {
        url: String,
        content_type: String,
        expires_at: DateTime<Utc>,
    },
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delivery::Stream {
                filename,
                content_type,
                content_length,
                ..
            } => f
                .debug_struct("Stream")
                .field("filename", filename)
                .field("content_type", content_type)
                .field("content_length", content_length)
                .finish_non_exhaustive(),
            Delivery::SignedUrl {
                url,
                content_type,
                expires_at,
            } => f
                .debug_struct("SignedUrl")
                .field("url", url)
                .field("content_type", content_type)
                .field("expires_at", expires_at)
                .finish(),
        }
    }
}

/// Storage backend operations
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Short backend identifier for logs and status output
    fn backend_name(&self) -> &'static str;

    /// Persist bytes under a fresh unique name.
    ///
    /// `temporary` artifacts go in the temporary namespace.
    async fn store(&self, bytes: Vec<u8>, kind: FileKind, temporary: bool)
        -> Result<StorageLocation>;

    /// Read back the exact bytes that were stored
    async fn retrieve(&self, location: &StorageLocation) -> Result<Vec<u8>>;

    /// Make a stored artifact available to the client
    async fn deliver(&self, location: &StorageLocation, filename: &str) -> Result<Delivery>;

    async fn delete(&self, location: &StorageLocation) -> Result<()>;
}

/// Unique storage key: `{temp|files}/file_<uuid><ext>`
pub fn generate_key(kind: &FileKind, temporary: bool) -> String {
    let namespace = if temporary { "temp" } else { "files" };
    format!("{}/file_{}{}", namespace, Uuid::new_v4(), kind.extension())
}

/// Build the configured backend.
///
/// The concrete local backend is returned alongside so the caller can run
/// its retention sweeper.
pub fn from_config(
    config: &StorageConfig,
) -> Result<(Arc<dyn StorageGateway>, Option<Arc<LocalStorage>>)> {
    match config.backend {
        StorageBackend::Local => {
            let local = Arc::new(LocalStorage::new(config.local.root.clone())?);
            let gateway: Arc<dyn StorageGateway> = local.clone();
            Ok((gateway, Some(local)))
        }
        StorageBackend::Object => {
            let provider = EnvCredentialProvider::from_config(&config.object);
            let gateway: Arc<dyn StorageGateway> = Arc::new(ObjectStorage::new(
                config.object.clone(),
                Arc::new(provider),
            )?);
            Ok((gateway, None))
        }
    }
}

pub(crate) fn wrong_backend(location: &StorageLocation, backend: &str) -> SeparationError {
    SeparationError::NotFound(format!("{} is not a {} location", location, backend))
}
