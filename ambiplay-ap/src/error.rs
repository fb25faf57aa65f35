//! Error types for ambiplay-ap
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for ambiplay-ap
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or inconsistent RIFF/WAVE data
    #[error("Invalid WAV data: {0}")]
    InvalidWav(String),

    /// Bit depth, channel count or technique combination not supported
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Convolver setup errors
    #[error("Convolver error: {0}")]
    Convolver(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// WAV encoding errors
    #[error("WAV write error: {0}")]
    Wav(#[from] hound::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ambiplay_common::Error> for Error {
    fn from(err: ambiplay_common::Error) -> Self {
        match err {
            ambiplay_common::Error::Io(e) => Error::Io(e),
            other => Error::Config(other.to_string()),
        }
    }
}

/// Convenience Result type using ambiplay-ap Error
pub type Result<T> = std::result::Result<T, Error>;
