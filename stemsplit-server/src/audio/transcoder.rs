//! External transcoder fallback
//!
//! Shells out to an ffmpeg-compatible program to convert inputs the native
//! decoder cannot read into a 32-bit float stereo WAV at 44.1kHz. All files
//! live in a scratch directory that is removed when the call returns.

use crate::error::{Result, SeparationError};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// ffmpeg-compatible transcoder
#[derive(Debug, Clone)]
pub struct Transcoder {
    program: PathBuf,
}

impl Transcoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Check whether the transcoder can be launched at all
    pub fn is_available(&self) -> bool {
        Command::new(&self.program).arg("-version").output().is_ok()
    }

    /// Convert `input` (an `extension` file) to canonical WAV bytes.
    ///
    /// # Errors
    /// * `TranscoderUnavailable` - program missing or not executable
    /// * `DecodeFailure` - program ran but could not convert the input
    pub fn transcode(&self, input: &[u8], extension: &str) -> Result<Vec<u8>> {
        let scratch = tempfile::Builder::new()
            .prefix("stemsplit-transcode-")
            .tempdir()
            .map_err(|e| {
                SeparationError::TranscoderUnavailable(format!("scratch directory: {}", e))
            })?;

        let input_path = scratch.path().join(format!("input{}", extension));
        let output_path = scratch.path().join("converted.wav");

        std::fs::write(&input_path, input).map_err(|e| {
            SeparationError::TranscoderUnavailable(format!("write scratch input: {}", e))
        })?;

        debug!(
            program = %self.program.display(),
            input = %input_path.display(),
            "Running transcoder"
        );

        let output = Command::new(&self.program)
            .arg("-hide_banner")
            .args(["-loglevel", "error"])
            .arg("-i")
            .arg(&input_path)
            .args(["-ar", "44100", "-ac", "2", "-acodec", "pcm_f32le", "-f", "wav", "-y"])
            .arg(&output_path)
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SeparationError::TranscoderUnavailable(format!(
                        "{} not found; install ffmpeg to support this format",
                        self.program.display()
                    ))
                } else {
                    SeparationError::TranscoderUnavailable(format!(
                        "failed to launch {}: {}",
                        self.program.display(),
                        e
                    ))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SeparationError::DecodeFailure(format!(
                "transcoder exited with {:?}: {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        let converted = std::fs::read(&output_path).map_err(|e| {
            SeparationError::DecodeFailure(format!("transcoder produced no output: {}", e))
        })?;

        info!(
            input_bytes = input.len(),
            output_bytes = converted.len(),
            "Transcoded {} input to WAV",
            extension
        );

        Ok(converted)
    }
}
