//! Separation model boundary
//!
//! The model is opaque: it takes canonical audio and returns one stem per
//! declared source name. Implementations may be reused sequentially but are
//! not assumed safe for concurrent use; only the separation queue workers
//! call [`SeparationModel::separate`].

pub mod bridge;

pub use bridge::BridgeModel;

use crate::error::{Result, SeparationError};
use serde::Serialize;
use stemsplit_common::{NormalizedAudio, Stem, CANONICAL_SAMPLE_RATE};

/// Descriptive model metadata for status endpoints
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModelInfo {
    pub name: String,
    pub backend: String,
    pub sources: Vec<String>,
    pub sample_rate: u32,
}

/// Opaque source separation model
pub trait SeparationModel: Send + Sync {
    /// Model identifier (e.g. "htdemucs")
    fn name(&self) -> &str;

    /// Declared source names, in output order. Stable across calls.
    fn sources(&self) -> &[String];

    /// Separate canonical audio into one stem per declared source.
    ///
    /// Blocking; callers run this on the blocking pool. Errors are reported
    /// as `ModelFailure` and never retried.
    fn separate(&self, audio: &NormalizedAudio) -> Result<Vec<Stem>>;

    /// Readiness probe. Defaults to always ready.
    fn probe(&self) -> Result<()> {
        Ok(())
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            name: self.name().to_string(),
            backend: "in-process".to_string(),
            sources: self.sources().to_vec(),
            sample_rate: CANONICAL_SAMPLE_RATE,
        }
    }
}

/// Check model output against the declared sources and the input shape.
///
/// Stems are reordered to the declared order; a missing, extra, duplicated
/// or wrongly-sized stem fails the whole job so no partial archive is ever
/// produced.
pub fn validate_stems(
    declared: &[String],
    input: &NormalizedAudio,
    mut stems: Vec<Stem>,
) -> Result<Vec<Stem>> {
    if stems.len() != declared.len() {
        return Err(SeparationError::ModelFailure(format!(
            "model returned {} stems, expected {}",
            stems.len(),
            declared.len()
        )));
    }

    let mut ordered = Vec::with_capacity(declared.len());
    for name in declared {
        let position = stems
            .iter()
            .position(|s| &s.name == name)
            .ok_or_else(|| {
                SeparationError::ModelFailure(format!("model output missing stem '{}'", name))
            })?;
        let stem = stems.swap_remove(position);
        if stem.audio.frames() != input.frames() {
            return Err(SeparationError::ModelFailure(format!(
                "stem '{}' has {} frames, input has {}",
                stem.name,
                stem.audio.frames(),
                input.frames()
            )));
        }
        ordered.push(stem);
    }

    Ok(ordered)
}
