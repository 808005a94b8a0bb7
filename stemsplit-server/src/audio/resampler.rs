//! Audio resampling using rubato
//!
//! Converts planar audio to the canonical 44.1kHz rate.

use crate::error::{Result, SeparationError};
use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use stemsplit_common::CANONICAL_SAMPLE_RATE;
use tracing::debug;

/// Rubato-backed sample rate converter
pub struct Resampler;

impl Resampler {
    /// Resample planar channels to 44.1kHz.
    ///
    /// Input already at 44.1kHz is returned untouched, so canonical audio
    /// passes through bit-for-bit.
    pub fn to_canonical_rate(channels: Vec<Vec<f32>>, input_rate: u32) -> Result<Vec<Vec<f32>>> {
        let output_rate = CANONICAL_SAMPLE_RATE;

        if input_rate == output_rate {
            debug!("Sample rate already at {}Hz, skipping resample", output_rate);
            return Ok(channels);
        }
        if input_rate == 0 {
            return Err(SeparationError::DecodeFailure(
                "Source sample rate is zero".to_string(),
            ));
        }

        let input_frames = channels.first().map(|c| c.len()).unwrap_or(0);
        if input_frames == 0 || channels.is_empty() {
            return Ok(channels);
        }

        debug!(
            "Resampling from {}Hz to {}Hz ({} channels, {} frames)",
            input_rate,
            output_rate,
            channels.len(),
            input_frames
        );

        // Whole buffer as a single chunk: uploads are finite and already in memory
        let mut resampler = FastFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            1.0,
            PolynomialDegree::Septic,
            input_frames,
            channels.len(),
        )
        .map_err(|e| SeparationError::DecodeFailure(format!("Failed to create resampler: {}", e)))?;

        let output = resampler
            .process(&channels, None)
            .map_err(|e| SeparationError::DecodeFailure(format!("Resampling failed: {}", e)))?;

        debug!(
            "Resampled {} input frames to {} output frames",
            input_frames,
            output.first().map(|c| c.len()).unwrap_or(0)
        );

        Ok(output)
    }
}
