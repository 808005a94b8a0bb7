//! # Stemsplit Common Library
//!
//! Shared code for the stem separation service:
//! - Error types
//! - Typed configuration loading and validation
//! - Canonical audio types (`NormalizedAudio`, `Stem`) and WAV helpers

pub mod audio;
pub mod config;
pub mod error;

pub use audio::{NormalizedAudio, Stem, CANONICAL_CHANNELS, CANONICAL_SAMPLE_RATE};
pub use config::ServiceConfig;
pub use error::{Error, Result};
