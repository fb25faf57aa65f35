//! # ambiplay Audio Player Library (ambiplay-ap)
//!
//! Binaural rendering of stereo, surround and ambisonic material.
//!
//! **Purpose:** Load WAV assets and HRTF banks, decode source buffers of any
//! supported layout into the output device's format (convolving surround and
//! ambisonic sources with HRTFs), and manage the output device.
//!
//! **Architecture:** realfft overlap-add convolution + cpal output

pub mod audio;
pub mod dsp;
pub mod error;
pub mod state;

pub use error::{Error, Result};
pub use state::AppContext;
