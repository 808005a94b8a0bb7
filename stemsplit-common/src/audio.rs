//! Canonical audio types
//!
//! Every stage after normalization works on stereo, 44.1kHz, 32-bit float
//! audio. `NormalizedAudio` stores the two channels planar so the channel
//! count is fixed by the type rather than checked at runtime.

use crate::{Error, Result};
use std::io::Cursor;

/// Canonical sample rate for all pipeline stages
pub const CANONICAL_SAMPLE_RATE: u32 = 44100;

/// Canonical channel count for all pipeline stages
pub const CANONICAL_CHANNELS: u16 = 2;

/// Decoded audio in canonical form (2 channels, 44100 Hz, f32 samples)
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedAudio {
    channels: [Vec<f32>; 2],
}

impl NormalizedAudio {
    /// Build from two planar channels of equal length.
    pub fn new(left: Vec<f32>, right: Vec<f32>) -> Result<Self> {
        if left.len() != right.len() {
            return Err(Error::InvalidInput(format!(
                "channel length mismatch: left={} right={}",
                left.len(),
                right.len()
            )));
        }
        Ok(Self {
            channels: [left, right],
        })
    }

    /// Build from interleaved stereo samples ([L, R, L, R, ...]).
    pub fn from_interleaved(samples: &[f32]) -> Result<Self> {
        if samples.len() % CANONICAL_CHANNELS as usize != 0 {
            return Err(Error::InvalidInput(format!(
                "interleaved stereo buffer has odd sample count {}",
                samples.len()
            )));
        }

        let frames = samples.len() / 2;
        let mut left = Vec::with_capacity(frames);
        let mut right = Vec::with_capacity(frames);
        for frame in samples.chunks_exact(2) {
            left.push(frame[0]);
            right.push(frame[1]);
        }

        Ok(Self {
            channels: [left, right],
        })
    }

    pub fn sample_rate(&self) -> u32 {
        CANONICAL_SAMPLE_RATE
    }

    pub fn channel_count(&self) -> u16 {
        CANONICAL_CHANNELS
    }

    /// Number of sample frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.channels[0].len()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frames() as f64 / CANONICAL_SAMPLE_RATE as f64
    }

    pub fn left(&self) -> &[f32] {
        &self.channels[0]
    }

    pub fn right(&self) -> &[f32] {
        &self.channels[1]
    }

    pub fn channels(&self) -> &[Vec<f32>; 2] {
        &self.channels
    }

    pub fn into_channels(self) -> [Vec<f32>; 2] {
        self.channels
    }

    /// Interleave into [L, R, L, R, ...]
    pub fn interleaved(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.frames() * 2);
        for (l, r) in self.channels[0].iter().zip(self.channels[1].iter()) {
            out.push(*l);
            out.push(*r);
        }
        out
    }

    /// Encode as a 32-bit float stereo WAV file at 44.1kHz.
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: CANONICAL_CHANNELS,
            sample_rate: CANONICAL_SAMPLE_RATE,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };

        let mut buf = Vec::with_capacity(self.frames() * 8 + 64);
        {
            let mut writer = hound::WavWriter::new(Cursor::new(&mut buf), spec)?;
            for (l, r) in self.channels[0].iter().zip(self.channels[1].iter()) {
                writer.write_sample(*l)?;
                writer.write_sample(*r)?;
            }
            writer.finalize()?;
        }
        Ok(buf)
    }

    /// Decode a canonical WAV (stereo, 44.1kHz, 32-bit float).
    ///
    /// Anything else is rejected: callers that accept arbitrary audio go
    /// through the normalizer instead.
    pub fn from_wav_bytes(bytes: &[u8]) -> Result<Self> {
        let reader = hound::WavReader::new(Cursor::new(bytes))?;
        let spec = reader.spec();

        if spec.channels != CANONICAL_CHANNELS
            || spec.sample_rate != CANONICAL_SAMPLE_RATE
            || spec.sample_format != hound::SampleFormat::Float
            || spec.bits_per_sample != 32
        {
            return Err(Error::InvalidInput(format!(
                "not canonical audio: {} ch, {} Hz, {:?} {}-bit",
                spec.channels, spec.sample_rate, spec.sample_format, spec.bits_per_sample
            )));
        }

        let samples = reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, hound::Error>>()?;
        Self::from_interleaved(&samples)
    }
}

/// One isolated source track produced by the separation model
#[derive(Debug, Clone, PartialEq)]
pub struct Stem {
    /// Source name declared by the model (e.g. "drums")
    pub name: String,
    pub audio: NormalizedAudio,
}

impl Stem {
    pub fn new(name: impl Into<String>, audio: NormalizedAudio) -> Self {
        Self {
            name: name.into(),
            audio,
        }
    }
}
