//! Audio decoding using symphonia
//!
//! Decodes an in-memory upload to planar f32 PCM at the source sample rate,
//! keeping every source channel. Channel folding and resampling happen in
//! the normalizer.

use crate::error::{Result, SeparationError};
use bytes::Bytes;
use std::io::Cursor;
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::conv::FromSample;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;
use tracing::{debug, warn};

/// Decoded audio at its original rate and channel layout
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// One f32 buffer per source channel, all the same length
    pub channels: Vec<Vec<f32>>,
    /// Source sample rate in Hz
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }
}

/// Decode an in-memory audio file.
///
/// **Algorithm:**
/// 1. Probe the container (extension used as a hint only)
/// 2. Pick the first decodable audio track
/// 3. Decode every packet, converting samples to f32 per channel
///
/// Corrupt individual packets are skipped; a stream that yields no audio at
/// all is a `DecodeFailure`.
pub fn decode_bytes(bytes: Bytes, extension_hint: Option<&str>) -> Result<DecodedAudio> {
    let input_len = bytes.len();
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension_hint {
        hint.with_extension(ext.trim_start_matches('.'));
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| SeparationError::DecodeFailure(format!("Failed to probe format: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| SeparationError::DecodeFailure("No audio track found".to_string()))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| SeparationError::DecodeFailure(format!("Failed to create decoder: {}", e)))?;

    let mut channels: Vec<Vec<f32>> = Vec::new();
    let mut skipped_packets = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(SeparationError::DecodeFailure(format!(
                    "Error reading packet: {}",
                    e
                )));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                if sample_rate.is_none() {
                    sample_rate = Some(decoded.spec().rate);
                }
                append_planar(&decoded, &mut channels);
            }
            Err(SymphoniaError::DecodeError(e)) => {
                skipped_packets += 1;
                warn!("Skipping corrupt packet: {}", e);
            }
            Err(e) => {
                return Err(SeparationError::DecodeFailure(format!(
                    "Decode error: {}",
                    e
                )));
            }
        }
    }

    let sample_rate = sample_rate
        .ok_or_else(|| SeparationError::DecodeFailure("Sample rate unknown".to_string()))?;

    let frames = channels.first().map(|c| c.len()).unwrap_or(0);
    if frames == 0 {
        return Err(SeparationError::DecodeFailure(
            "Stream contained no audio samples".to_string(),
        ));
    }

    debug!(
        input_bytes = input_len,
        sample_rate,
        channels = channels.len(),
        frames,
        skipped_packets,
        "Audio decoding complete"
    );

    Ok(DecodedAudio {
        channels,
        sample_rate,
    })
}

/// Append a decoded buffer to the per-channel output, converting to f32.
fn append_planar(decoded: &AudioBufferRef, out: &mut Vec<Vec<f32>>) {
    match decoded {
        AudioBufferRef::U8(buf) => extend_channels(buf, out),
        AudioBufferRef::U16(buf) => extend_channels(buf, out),
        AudioBufferRef::U24(buf) => extend_channels(buf, out),
        AudioBufferRef::U32(buf) => extend_channels(buf, out),
        AudioBufferRef::S8(buf) => extend_channels(buf, out),
        AudioBufferRef::S16(buf) => extend_channels(buf, out),
        AudioBufferRef::S24(buf) => extend_channels(buf, out),
        AudioBufferRef::S32(buf) => extend_channels(buf, out),
        AudioBufferRef::F32(buf) => extend_channels(buf, out),
        AudioBufferRef::F64(buf) => extend_channels(buf, out),
    }
}

fn extend_channels<S: Sample>(buf: &AudioBuffer<S>, out: &mut Vec<Vec<f32>>)
where
    f32: FromSample<S>,
{
    let num_channels = buf.spec().channels.count();
    if out.len() < num_channels {
        // Layout can only grow at stream start; pad late channels with silence
        let existing = out.first().map(|c| c.len()).unwrap_or(0);
        out.resize_with(num_channels, || vec![0.0; existing]);
    }

    for (ch, dest) in out.iter_mut().enumerate().take(num_channels) {
        dest.extend(buf.chan(ch).iter().map(|s| f32::from_sample(*s)));
    }
}
