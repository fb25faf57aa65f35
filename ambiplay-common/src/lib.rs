//! # ambiplay Common Library
//!
//! Shared code for the ambiplay crates:
//! - Audio value types exchanged with the media-decoder layer
//!   (`AudioConfig`, `AudioDesc`, `Technique`, `Orientation`)
//! - Configuration loading
//! - Common error type

pub mod audio;
pub mod config;
pub mod error;

pub use audio::{
    AudioConfig, AudioDesc, AudioFormat, Orientation, Technique, MAX_AUDIO_CHANNELS,
};
pub use error::{Error, Result};
