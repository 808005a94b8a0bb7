//! Format normalization
//!
//! Turns an arbitrary supported upload into canonical PCM:
//! 1. Reject unsupported extensions before touching the bytes
//! 2. Decode natively (symphonia)
//! 3. On native failure, transcode externally and decode the result
//! 4. Fold channels to stereo (mono duplicated, extras dropped)
//! 5. Resample to 44.1kHz
//! 6. Samples are f32 from the decoder onwards
//!
//! Normalization is CPU-bound; async callers use [`FormatNormalizer::normalize_async`]
//! which runs it on the blocking thread pool.

use super::decoder::{decode_bytes, DecodedAudio};
use super::resampler::Resampler;
use super::transcoder::Transcoder;
use super::AudioAsset;
use crate::error::{Result, SeparationError};
use bytes::Bytes;
use std::sync::Arc;
use stemsplit_common::NormalizedAudio;
use tracing::{debug, warn};

/// Decodes uploads into canonical stereo 44.1kHz f32 audio
#[derive(Debug, Clone)]
pub struct FormatNormalizer {
    supported: Vec<String>,
    transcoder: Transcoder,
}

impl FormatNormalizer {
    /// `supported` holds dot-prefixed extensions; matching is case-insensitive.
    pub fn new(supported: Vec<String>, transcoder: Transcoder) -> Self {
        let supported = supported
            .into_iter()
            .map(|ext| ext.to_ascii_lowercase())
            .collect();
        Self {
            supported,
            transcoder,
        }
    }

    pub fn supported_extensions(&self) -> &[String] {
        &self.supported
    }

    pub fn is_supported(&self, filename: &str) -> bool {
        self.check_format(filename).is_ok()
    }

    /// Return the upload's extension if it is in the supported set.
    pub fn check_format(&self, filename: &str) -> Result<String> {
        let asset = AudioAsset::new(Bytes::new(), filename);
        match asset.extension() {
            Some(ext) if self.supported.contains(&ext) => Ok(ext),
            other => Err(SeparationError::UnsupportedFormat {
                extension: other.unwrap_or_else(|| "(none)".to_string()),
                supported: self.supported.clone(),
            }),
        }
    }

    /// Normalize an upload. Blocking: decode, transcode and resample all
    /// run on the calling thread.
    pub fn normalize(&self, asset: &AudioAsset) -> Result<NormalizedAudio> {
        let extension = self.check_format(&asset.filename)?;

        let decoded = match decode_bytes(asset.bytes.clone(), Some(&extension)) {
            Ok(decoded) => decoded,
            Err(native_err) => {
                warn!(
                    filename = %asset.filename,
                    "Native decode failed for {}, using transcoder fallback: {}",
                    extension,
                    native_err
                );
                let wav = self.transcoder.transcode(&asset.bytes, &extension)?;
                decode_bytes(Bytes::from(wav), Some(".wav")).map_err(|e| {
                    SeparationError::DecodeFailure(format!(
                        "transcoded output unreadable: {}",
                        e
                    ))
                })?
            }
        };

        to_canonical(decoded)
    }

    /// Run [`normalize`](Self::normalize) on the blocking pool.
    pub async fn normalize_async(
        self: &Arc<Self>,
        asset: AudioAsset,
    ) -> Result<NormalizedAudio> {
        let normalizer = Arc::clone(self);
        tokio::task::spawn_blocking(move || normalizer.normalize(&asset))
            .await
            .map_err(|e| {
                SeparationError::DecodeFailure(format!("normalization task failed: {}", e))
            })?
    }
}

/// Fold decoded audio into canonical form (stereo, 44.1kHz).
pub fn to_canonical(decoded: DecodedAudio) -> Result<NormalizedAudio> {
    let source_channels = decoded.channels.len();
    let [left, right] = fold_channels(decoded.channels)?;
    let [left, right] = match Resampler::to_canonical_rate(vec![left, right], decoded.sample_rate)?
        .try_into()
    {
        Ok(pair) => pair,
        Err(_) => {
            return Err(SeparationError::DecodeFailure(
                "resampler changed channel count".to_string(),
            ))
        }
    };

    let audio = NormalizedAudio::new(left, right)
        .map_err(|e| SeparationError::DecodeFailure(e.to_string()))?;
    if audio.frames() == 0 {
        return Err(SeparationError::DecodeFailure(format!(
            "audio too short: nothing left after resampling from {}Hz",
            decoded.sample_rate
        )));
    }

    debug!(
        source_channels,
        source_rate = decoded.sample_rate,
        frames = audio.frames(),
        duration_seconds = format!("{:.2}", audio.duration_seconds()),
        "Normalized audio"
    );

    Ok(audio)
}

/// Reduce any channel layout to exactly two channels.
///
/// - 1 channel: duplicated into both
/// - 2 channels: unchanged
/// - more than 2: first two kept
pub fn fold_channels(mut channels: Vec<Vec<f32>>) -> Result<[Vec<f32>; 2]> {
    match channels.len() {
        0 => Err(SeparationError::DecodeFailure(
            "audio has no channels".to_string(),
        )),
        1 => {
            let mono = channels.remove(0);
            Ok([mono.clone(), mono])
        }
        _ => {
            channels.truncate(2);
            let right = channels.remove(1);
            let left = channels.remove(0);
            Ok([left, right])
        }
    }
}
