//! Byte-level sample conversion
//!
//! Device and decode buffers are untyped byte slices in native byte order.
//! These helpers read, write, scale and convert samples of every
//! [`AudioFormat`] without allocating.
//!
//! Float values use the usual normalized range: `[-1.0, 1.0)` maps to the
//! full integer range of the target format. U8 is offset binary.

use ambiplay_common::AudioFormat;

/// Byte value of digital silence for `format`
pub fn silence_byte(format: AudioFormat) -> u8 {
    match format {
        AudioFormat::U8 => 0x80,
        _ => 0,
    }
}

/// Fill `buffer` with digital silence
pub fn fill_silence(format: AudioFormat, buffer: &mut [u8]) {
    buffer.fill(silence_byte(format));
}

/// Read one sample as a normalized float.
///
/// `bytes` must hold at least one sample of `format`.
#[inline]
pub fn read_sample(format: AudioFormat, bytes: &[u8]) -> f32 {
    match format {
        AudioFormat::U8 => (bytes[0] as f32 - 128.0) / 128.0,
        AudioFormat::S16 => i16::from_ne_bytes([bytes[0], bytes[1]]) as f32 / 32768.0,
        AudioFormat::S32 => {
            i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32 / 2_147_483_648.0
        }
        AudioFormat::F32 => f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        AudioFormat::Unknown => 0.0,
    }
}

/// Write one normalized float sample, saturating at the format's range.
#[inline]
pub fn write_sample(format: AudioFormat, value: f32, out: &mut [u8]) {
    match format {
        AudioFormat::U8 => {
            out[0] = ((value * 128.0).round().clamp(-128.0, 127.0) as i32 + 128) as u8;
        }
        AudioFormat::S16 => {
            let s = (value * 32768.0).round().clamp(-32768.0, 32767.0) as i16;
            out[..2].copy_from_slice(&s.to_ne_bytes());
        }
        AudioFormat::S32 => {
            let s = (value as f64 * 2_147_483_648.0)
                .round()
                .clamp(-2_147_483_648.0, 2_147_483_647.0) as i32;
            out[..4].copy_from_slice(&s.to_ne_bytes());
        }
        AudioFormat::F32 => out[..4].copy_from_slice(&value.to_ne_bytes()),
        AudioFormat::Unknown => {}
    }
}

/// Write a canonical S16 sample in `format`
#[inline]
pub fn write_s16_as(format: AudioFormat, sample: i16, out: &mut [u8]) {
    match format {
        AudioFormat::U8 => out[0] = ((sample >> 8) + 128) as u8,
        AudioFormat::S16 => out[..2].copy_from_slice(&sample.to_ne_bytes()),
        AudioFormat::S32 => out[..4].copy_from_slice(&((sample as i32) << 16).to_ne_bytes()),
        AudioFormat::F32 => out[..4].copy_from_slice(&(sample as f32 / 32768.0).to_ne_bytes()),
        AudioFormat::Unknown => {}
    }
}

/// Largest fixed-point scale; any 16-bit sample saturates well before this
const MAX_FIXED_POINT_SCALE: i64 = 1 << 24;

/// Fixed-point gain used for 8/16-bit scaling: `round(256 * gain)`, clamped
/// to `±2^24` so `scale * sample` cannot overflow.
#[inline]
pub fn fixed_point_scale(gain: f32) -> i64 {
    let scale = (256.0 * gain as f64).round();
    if scale.is_nan() {
        return 0;
    }
    scale.clamp(-(MAX_FIXED_POINT_SCALE as f64), MAX_FIXED_POINT_SCALE as f64) as i64
}

/// Copy `src` into `dst` scaled by `gain`, both in `format`.
///
/// U8 and S16 use integer fixed-point scaling (`(scale * sample) >> 8`) so the
/// hot path stays free of float math; S32 and F32 multiply directly.
/// Only whole samples present in both slices are written.
pub fn scale_samples(format: AudioFormat, dst: &mut [u8], src: &[u8], gain: f32) {
    let len = dst.len().min(src.len());
    let (dst, src) = (&mut dst[..len], &src[..len]);

    match format {
        AudioFormat::U8 => {
            let scale = fixed_point_scale(gain);
            for (out, &sample) in dst.iter_mut().zip(src) {
                let centered = sample as i64 - 128;
                *out = (((scale * centered) >> 8).clamp(-128, 127) + 128) as u8;
            }
        }
        AudioFormat::S16 => {
            let scale = fixed_point_scale(gain);
            for (out, sample) in dst.chunks_exact_mut(2).zip(src.chunks_exact(2)) {
                let s = i16::from_ne_bytes([sample[0], sample[1]]) as i64;
                let scaled = ((scale * s) >> 8).clamp(i16::MIN as i64, i16::MAX as i64) as i16;
                out.copy_from_slice(&scaled.to_ne_bytes());
            }
        }
        AudioFormat::S32 => {
            for (out, sample) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
                let s = i32::from_ne_bytes([sample[0], sample[1], sample[2], sample[3]]) as f64;
                let scaled = (s * gain as f64).clamp(i32::MIN as f64, i32::MAX as f64) as i32;
                out.copy_from_slice(&scaled.to_ne_bytes());
            }
        }
        AudioFormat::F32 => {
            for (out, sample) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
                let s = f32::from_ne_bytes([sample[0], sample[1], sample[2], sample[3]]);
                out.copy_from_slice(&(s * gain).to_ne_bytes());
            }
        }
        AudioFormat::Unknown => dst.fill(0),
    }
}

/// Convert `samples` samples from `src_format` to `dst_format`, applying `gain`.
pub fn convert_samples(
    src_format: AudioFormat,
    src: &[u8],
    dst_format: AudioFormat,
    dst: &mut [u8],
    samples: usize,
    gain: f32,
) {
    let src_size = src_format.bytes_per_sample();
    let dst_size = dst_format.bytes_per_sample();
    if src_size == 0 || dst_size == 0 {
        return;
    }

    for (out, sample) in dst
        .chunks_exact_mut(dst_size)
        .zip(src.chunks_exact(src_size))
        .take(samples)
    {
        write_sample(dst_format, read_sample(src_format, sample) * gain, out);
    }
}
