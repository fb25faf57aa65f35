//! Test helper modules for ambiplay-ap integration tests
//!
//! - MockBackend: scripted audio backend that records every call
//! - WavBuilder: byte-exact RIFF/RIFX images, including malformed ones
//! - Signal helpers for planar and interleaved buffers

#![allow(dead_code)]

pub mod mock_backend;
pub mod wav_builder;

pub use mock_backend::{MockBackend, MockLog};
pub use wav_builder::{f32_bytes, f32_values, write_hound_wav, WavBuilder};
