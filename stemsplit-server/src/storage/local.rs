//! Local filesystem backend
//!
//! Artifacts are written under `{root}/temp` or `{root}/files` and streamed
//! back to the client. Nothing is deleted implicitly; an optional sweeper
//! purges files older than the configured retention.

use super::{generate_key, wrong_backend, Delivery, FileKind, StorageGateway, StorageLocation};
use crate::error::{Result, SeparationError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const NAMESPACES: [&str; 2] = ["temp", "files"];

#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Create the backend, making sure the root directory exists.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            SeparationError::StorageUnavailable(format!(
                "cannot create storage root {}: {}",
                root.display(),
                e
            ))
        })?;
        info!(root = %root.display(), "Local storage backend ready");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for<'a>(&self, location: &'a StorageLocation) -> Result<&'a Path> {
        match location {
            StorageLocation::Local(path) if path.starts_with(&self.root) => Ok(path.as_path()),
            other => Err(wrong_backend(other, "local storage")),
        }
    }

    /// Delete stored files whose modification time is older than `age`.
    ///
    /// Returns the number of files removed. Files that vanish or cannot be
    /// inspected mid-sweep are skipped.
    pub async fn purge_older_than(&self, age: Duration) -> Result<usize> {
        let cutoff = SystemTime::now()
            .checked_sub(age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut removed = 0;

        for namespace in NAMESPACES {
            let dir = self.root.join(namespace);
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(io_error(&dir, e)),
            };

            while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(&dir, e))? {
                let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                    Ok(modified) => modified,
                    Err(e) => {
                        debug!("Skipping {}: {}", entry.path().display(), e);
                        continue;
                    }
                };
                if modified >= cutoff {
                    continue;
                }
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("Failed to purge {}: {}", entry.path().display(), e),
                }
            }
        }

        if removed > 0 {
            info!(removed, "Purged expired stored files");
        }
        Ok(removed)
    }

    /// Run [`purge_older_than`](Self::purge_older_than) every `interval`
    /// until `shutdown` is cancelled.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        retention: Duration,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        info!(
            retention_secs = retention.as_secs(),
            interval_secs = interval.as_secs(),
            "Starting storage sweeper"
        );
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Storage sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.purge_older_than(retention).await {
                            warn!("Storage sweep failed: {}", e);
                        }
                    }
                }
            }
        })
    }
}

fn io_error(path: &Path, e: std::io::Error) -> SeparationError {
    if e.kind() == std::io::ErrorKind::NotFound {
        SeparationError::NotFound(path.display().to_string())
    } else {
        SeparationError::StorageUnavailable(format!("{}: {}", path.display(), e))
    }
}

#[async_trait]
impl StorageGateway for LocalStorage {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    async fn store(
        &self,
        bytes: Vec<u8>,
        kind: FileKind,
        temporary: bool,
    ) -> Result<StorageLocation> {
        let path = self.root.join(generate_key(&kind, temporary));
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| io_error(&path, e))?;

        info!(bytes = bytes.len(), "File stored: {}", path.display());
        Ok(StorageLocation::Local(path))
    }

    async fn retrieve(&self, location: &StorageLocation) -> Result<Vec<u8>> {
        let path = self.path_for(location)?;
        tokio::fs::read(path).await.map_err(|e| io_error(path, e))
    }

    async fn deliver(&self, location: &StorageLocation, filename: &str) -> Result<Delivery> {
        let path = self.path_for(location)?;
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| io_error(path, e))?;
        let content_length = file.metadata().await.ok().map(|m| m.len());

        debug!(filename, "Streaming {}", path.display());

        Ok(Delivery::Stream {
            filename: filename.to_string(),
            content_type: location.kind().content_type().to_string(),
            content_length,
            body: Box::pin(ReaderStream::new(file)),
        })
    }

    async fn delete(&self, location: &StorageLocation) -> Result<()> {
        let path = self.path_for(location)?;
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| io_error(path, e))?;
        info!("File deleted: {}", path.display());
        Ok(())
    }
}
