//! Common error types for stemsplit

use thiserror::Error;

/// Common result type for stemsplit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the stemsplit crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid audio data or parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// WAV encoding/decoding error
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}
