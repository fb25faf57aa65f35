//! Audio value types shared with the media-decoder layer
//!
//! `AudioConfig` describes a device/destination stream, `AudioDesc` describes a
//! decoded source stream together with its spatialization technique. Both are
//! small `Copy` values created per call.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest channel count a source frame may carry
/// (third-order ambisonics plus a head-locked stereo track).
pub const MAX_AUDIO_CHANNELS: usize = 18;

/// Sample format of an interleaved PCM buffer.
///
/// Samples are stored in native byte order. `U8` is offset binary
/// (128 is silence).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Unknown,
    U8,
    S16,
    S32,
    F32,
}

impl AudioFormat {
    /// Size of one sample in bytes (0 for `Unknown`)
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            AudioFormat::Unknown => 0,
            AudioFormat::U8 => 1,
            AudioFormat::S16 => 2,
            AudioFormat::S32 | AudioFormat::F32 => 4,
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AudioFormat::Unknown => "unknown",
            AudioFormat::U8 => "U8",
            AudioFormat::S16 => "S16",
            AudioFormat::S32 => "S32",
            AudioFormat::F32 => "F32",
        };
        f.write_str(name)
    }
}

/// Device or destination stream configuration.
///
/// The default value is invalid and is used to mean "no configuration"
/// (disabled device, or a backend with no suggestion to offer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AudioConfig {
    pub format: AudioFormat,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioConfig {
    pub const fn new(format: AudioFormat, sample_rate: u32, channels: u16) -> Self {
        Self {
            format,
            sample_rate,
            channels,
        }
    }

    /// A config is usable only with a known format, a rate and at least one channel.
    pub fn is_valid(&self) -> bool {
        self.format != AudioFormat::Unknown && self.sample_rate > 0 && self.channels > 0
    }

    pub fn bytes_per_sample(&self) -> usize {
        self.format.bytes_per_sample()
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.format.bytes_per_sample()
    }
}

impl fmt::Display for AudioConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} Hz {} ch",
            self.format, self.sample_rate, self.channels
        )
    }
}

/// Spatialization convention of a source stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Technique {
    /// Plain channel-based audio (mono, stereo, 5.1, 7.1)
    #[default]
    Default,
    /// ACN channel order, SN3D normalization
    AmbiX,
    /// Furse-Malham channel order, maxN normalization
    FuMa,
    /// Two Big Ears 8-channel layout
    Tbe,
}

impl Technique {
    pub fn is_ambisonic(self) -> bool {
        self != Technique::Default
    }
}

impl fmt::Display for Technique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Technique::Default => "default",
            Technique::AmbiX => "ambix",
            Technique::FuMa => "fuma",
            Technique::Tbe => "tbe",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for Technique {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" | "none" => Ok(Technique::Default),
            "ambix" => Ok(Technique::AmbiX),
            "fuma" | "amb" => Ok(Technique::FuMa),
            "tbe" => Ok(Technique::Tbe),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown technique: {}",
                other
            ))),
        }
    }
}

/// Description of a decoded source stream.
///
/// The source buffer is interleaved with `num_channels` samples per frame.
/// Logical channel `i` (ACN index, surround slot or TBE channel) is read from
/// frame offset `channel_index[i]`. With `num_tracks == 2` on an ambisonic
/// technique the last two logical channels form a head-locked stereo track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioDesc {
    pub technique: Technique,
    pub format: AudioFormat,
    pub sample_rate: u32,
    pub num_channels: u16,
    pub num_tracks: u16,
    pub channel_index: [u8; MAX_AUDIO_CHANNELS],
}

impl AudioDesc {
    /// Single-track description with the identity channel table
    pub fn new(technique: Technique, format: AudioFormat, sample_rate: u32, num_channels: u16) -> Self {
        let mut channel_index = [0u8; MAX_AUDIO_CHANNELS];
        for (i, slot) in channel_index.iter_mut().enumerate() {
            *slot = i as u8;
        }

        Self {
            technique,
            format,
            sample_rate,
            num_channels,
            num_tracks: 1,
            channel_index,
        }
    }

    /// Describe a stream whose last two channels are head-locked stereo
    pub fn with_head_locked_stereo(mut self) -> Self {
        self.num_tracks = 2;
        self
    }

    /// Replace the logical-to-frame channel table
    pub fn with_channel_index(mut self, index: &[u8]) -> Self {
        for (slot, &offset) in self.channel_index.iter_mut().zip(index) {
            *slot = offset;
        }
        self
    }

    pub fn has_head_locked_stereo(&self) -> bool {
        self.technique.is_ambisonic() && self.num_tracks >= 2 && self.num_channels >= 2
    }

    /// Number of channels that take part in spatial rendering
    pub fn spatial_channels(&self) -> usize {
        if self.has_head_locked_stereo() {
            self.num_channels as usize - 2
        } else {
            self.num_channels as usize
        }
    }

    /// Frame offset of logical channel `logical`
    pub fn frame_offset(&self, logical: usize) -> usize {
        self.channel_index
            .get(logical)
            .map(|&offset| offset as usize)
            .unwrap_or(logical)
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.num_channels as usize * self.format.bytes_per_sample()
    }

    /// Equivalent stream config of the source buffer
    pub fn config(&self) -> AudioConfig {
        AudioConfig::new(self.format, self.sample_rate, self.num_channels)
    }
}

/// Listener head orientation as a unit quaternion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orientation {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Orientation {
    pub const IDENTITY: Orientation = Orientation {
        w: 1.0,
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    /// Unit-length copy; degenerate quaternions collapse to identity
    pub fn normalized(&self) -> Self {
        let norm = (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt();
        if norm <= f32::EPSILON || !norm.is_finite() {
            return Self::IDENTITY;
        }
        Self {
            w: self.w / norm,
            x: self.x / norm,
            y: self.y / norm,
            z: self.z / norm,
        }
    }

    pub fn is_identity(&self) -> bool {
        let q = self.normalized();
        (q.w.abs() - 1.0).abs() < 1e-6
    }
}

impl Default for Orientation {
    fn default() -> Self {
        Self::IDENTITY
    }
}
