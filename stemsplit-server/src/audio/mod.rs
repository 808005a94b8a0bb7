//! Input audio handling: decoding, transcoding fallback, and normalization
//! to canonical PCM.

pub mod decoder;
pub mod normalizer;
pub mod resampler;
pub mod transcoder;

pub use decoder::{decode_bytes, DecodedAudio};
pub use normalizer::FormatNormalizer;
pub use resampler::Resampler;
pub use transcoder::Transcoder;

use bytes::Bytes;
use std::path::Path;

/// Raw uploaded bytes plus the name the client gave them
#[derive(Debug, Clone)]
pub struct AudioAsset {
    pub bytes: Bytes,
    pub filename: String,
}

impl AudioAsset {
    pub fn new(bytes: impl Into<Bytes>, filename: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            filename: filename.into(),
        }
    }

    /// Lowercase, dot-prefixed extension (".mp3"), if the filename has one
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
    }

    /// Filename without directory or extension, used to name the result
    pub fn base_name(&self) -> Option<String> {
        Path::new(&self.filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}
