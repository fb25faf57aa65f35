//! Ambisonic channel conventions
//!
//! Everything downstream of the loaders works in AmbiX convention (ACN
//! channel order, SN3D normalization). FuMa material is converted with a
//! fixed permutation and per-channel gain.
//!
//! Sound-field rotation is supplied from outside through [`SoundFieldRotator`];
//! the default implementation leaves the field untouched.

use ambiplay_common::Orientation;

/// Highest supported ambisonic order
pub const MAX_AMBISONIC_ORDER: usize = 3;

/// Channels of a full third-order stream
pub const MAX_AMBISONIC_CHANNELS: usize = 16;

/// For each ACN output channel, the FuMa channel it is taken from
/// (W X Y Z R S T U V K L M N O P Q → ACN 0..15).
pub const FUMA_TO_ACN: [usize; MAX_AMBISONIC_CHANNELS] =
    [0, 2, 3, 1, 8, 6, 4, 5, 7, 15, 13, 11, 9, 10, 12, 14];

/// maxN → SN3D gain for each ACN channel
pub const SN3D_FROM_MAXN: [f32; MAX_AMBISONIC_CHANNELS] = [
    std::f32::consts::SQRT_2, // W
    1.0,                      // Y
    1.0,                      // Z
    1.0,                      // X
    1.154_700_5,              // V  2/sqrt(3)
    1.154_700_5,              // T
    1.0,                      // R
    1.154_700_5,              // S
    1.154_700_5,              // U
    1.264_911_1,              // Q  sqrt(8/5)
    1.341_640_8,              // O  3/sqrt(5)
    1.185_854_1,              // M  sqrt(45/32)
    1.0,                      // K
    1.185_854_1,              // L
    1.341_640_8,              // N
    1.264_911_1,              // P
];

/// Ambisonic order carried by a full-sphere channel count
pub fn ambisonic_order(channels: usize) -> Option<usize> {
    match channels {
        4 => Some(1),
        9 => Some(2),
        16 => Some(3),
        _ => None,
    }
}

/// Rotates a planar ACN/SN3D sound field to compensate for listener orientation.
///
/// `channels[acn][..frames]` holds the field; implementations rotate in place.
/// Called from the render path: implementations must not block or allocate.
pub trait SoundFieldRotator: Send {
    fn rotate(&mut self, orientation: &Orientation, channels: &mut [Vec<f32>], frames: usize);
}

/// Rotator that leaves the field as is
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityRotator;

impl SoundFieldRotator for IdentityRotator {
    fn rotate(&mut self, _orientation: &Orientation, _channels: &mut [Vec<f32>], _frames: usize) {}
}

/// Left/right virtual-cardioid projection of the first-order components.
///
/// Returns `(left, right)` gains for ACN channel `acn`; higher-order channels
/// do not contribute. ACN 1 (Y) points to the listener's left.
pub fn projection_gains(acn: usize) -> (f32, f32) {
    match acn {
        0 => (0.5, 0.5),
        1 => (0.5, -0.5),
        _ => (0.0, 0.0),
    }
}
