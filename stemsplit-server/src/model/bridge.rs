//! HTTP bridge to an out-of-process separation model
//!
//! The model itself (e.g. htdemucs under PyTorch) runs behind a small HTTP
//! bridge. Protocol:
//! - `POST {endpoint}/separate` with a canonical WAV body, answered by
//!   `{"stems": [{"name": "drums", "wav_base64": "..."}, ...]}`
//! - `GET {endpoint}/health` answered with any 2xx status when ready
//!
//! Calls are blocking and must run on the blocking pool. A client is built
//! per call so no blocking client is ever owned by async code.

use super::{ModelInfo, SeparationModel};
use crate::error::{Result, SeparationError};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use std::time::{Duration, Instant};
use stemsplit_common::config::ModelConfig;
use stemsplit_common::{NormalizedAudio, Stem, CANONICAL_SAMPLE_RATE};
use tracing::{debug, info};

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct SeparateResponse {
    stems: Vec<StemPayload>,
}

#[derive(Debug, Deserialize)]
struct StemPayload {
    name: String,
    wav_base64: String,
}

/// Separation model reached over HTTP
#[derive(Debug, Clone)]
pub struct BridgeModel {
    name: String,
    endpoint: String,
    sources: Vec<String>,
    timeout: Duration,
}

impl BridgeModel {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        sources: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            sources,
            timeout,
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(
            config.name.clone(),
            config.endpoint.clone(),
            config.sources.clone(),
            config.timeout(),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn client(&self, timeout: Duration) -> Result<reqwest::blocking::Client> {
        reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SeparationError::ModelFailure(format!("HTTP client: {}", e)))
    }

    fn decode_stems(&self, response: SeparateResponse) -> Result<Vec<Stem>> {
        response
            .stems
            .into_iter()
            .map(|payload| {
                let wav = BASE64.decode(payload.wav_base64.as_bytes()).map_err(|e| {
                    SeparationError::ModelFailure(format!(
                        "stem '{}' is not valid base64: {}",
                        payload.name, e
                    ))
                })?;
                let audio = NormalizedAudio::from_wav_bytes(&wav).map_err(|e| {
                    SeparationError::ModelFailure(format!(
                        "stem '{}' is not canonical audio: {}",
                        payload.name, e
                    ))
                })?;
                Ok(Stem::new(payload.name, audio))
            })
            .collect()
    }
}

impl SeparationModel for BridgeModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn sources(&self) -> &[String] {
        &self.sources
    }

    fn separate(&self, audio: &NormalizedAudio) -> Result<Vec<Stem>> {
        let body = audio
            .to_wav_bytes()
            .map_err(|e| SeparationError::ModelFailure(format!("encode input: {}", e)))?;
        let url = format!("{}/separate", self.endpoint);
        let started = Instant::now();

        debug!(url = %url, frames = audio.frames(), "Sending audio to model bridge");

        let response = self
            .client(self.timeout)?
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "audio/wav")
            .body(body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    SeparationError::ModelFailure(format!(
                        "model timed out after {}s",
                        self.timeout.as_secs()
                    ))
                } else if e.is_connect() {
                    SeparationError::ModelFailure(format!(
                        "cannot connect to model at {}: {}",
                        self.endpoint, e
                    ))
                } else {
                    SeparationError::ModelFailure(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(SeparationError::ModelFailure(format!(
                "model returned {}: {}",
                status,
                detail.trim()
            )));
        }

        let parsed: SeparateResponse = response
            .json()
            .map_err(|e| SeparationError::ModelFailure(format!("invalid model response: {}", e)))?;

        let stems = self.decode_stems(parsed)?;

        info!(
            model = %self.name,
            stems = stems.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Model separation complete"
        );

        Ok(stems)
    }

    fn probe(&self) -> Result<()> {
        let url = format!("{}/health", self.endpoint);
        let response = self
            .client(HEALTH_TIMEOUT)?
            .get(&url)
            .send()
            .map_err(|e| {
                SeparationError::ModelFailure(format!("model unreachable at {}: {}", url, e))
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(SeparationError::ModelFailure(format!(
                "model health check returned {}",
                response.status()
            )))
        }
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            name: self.name.clone(),
            backend: format!("bridge {}", self.endpoint),
            sources: self.sources.clone(),
            sample_rate: CANONICAL_SAMPLE_RATE,
        }
    }
}
