//! Request orchestration
//!
//! Glue for one separation request:
//! 1. Reject unsupported formats before any decoding
//! 2. Normalize on the blocking pool
//! 3. Submit to the separation queue and wait (separate, package, store)
//! 4. Turn the stored location into a client delivery
//!
//! Errors pass through unchanged; the HTTP layer classifies them.

use crate::audio::{AudioAsset, FormatNormalizer};
use crate::error::Result;
use crate::queue::QueueHandle;
use crate::storage::{Delivery, StorageGateway};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Fallback download name when the upload name has no usable stem
pub const DEFAULT_ARCHIVE_NAME: &str = "output.zip";

#[derive(Clone)]
pub struct SeparationOrchestrator {
    normalizer: Arc<FormatNormalizer>,
    queue: QueueHandle,
    storage: Arc<dyn StorageGateway>,
}

impl SeparationOrchestrator {
    pub fn new(
        normalizer: Arc<FormatNormalizer>,
        queue: QueueHandle,
        storage: Arc<dyn StorageGateway>,
    ) -> Self {
        Self {
            normalizer,
            queue,
            storage,
        }
    }

    pub fn normalizer(&self) -> &FormatNormalizer {
        &self.normalizer
    }

    pub fn queue(&self) -> &QueueHandle {
        &self.queue
    }

    pub fn storage(&self) -> &Arc<dyn StorageGateway> {
        &self.storage
    }

    /// Run the full pipeline for one upload.
    pub async fn separate(&self, asset: AudioAsset) -> Result<Delivery> {
        let started = Instant::now();
        let filename = asset.filename.clone();
        info!(filename = %filename, bytes = asset.bytes.len(), "Processing upload");

        self.normalizer.check_format(&filename)?;

        let audio = self.normalizer.normalize_async(asset.clone()).await?;
        info!(
            filename = %filename,
            frames = audio.frames(),
            duration_seconds = format!("{:.2}", audio.duration_seconds()),
            "Audio normalized"
        );

        let output = self.queue.submit(audio).await?;
        info!(
            job_id = %output.job_id,
            archive_bytes = output.archive_bytes,
            "Separation stored at {}",
            output.location
        );

        let delivery = self
            .storage
            .deliver(&output.location, &archive_name(&asset))
            .await?;

        info!(
            filename = %filename,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Request completed"
        );
        Ok(delivery)
    }
}

/// `<upload stem>_stems.zip`, or `output.zip` when the upload name is unusable
pub fn archive_name(asset: &AudioAsset) -> String {
    asset
        .base_name()
        .map(|base| {
            let safe: String = base
                .chars()
                .map(|c| if c.is_control() || c == '"' { '_' } else { c })
                .collect();
            format!("{}_stems.zip", safe)
        })
        .unwrap_or_else(|| DEFAULT_ARCHIVE_NAME.to_string())
}
