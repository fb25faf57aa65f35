//! WAV asset loader
//!
//! Parses RIFF (little-endian) and RIFX (big-endian) WAVE files and
//! normalizes every supported representation into one canonical buffer:
//! interleaved signed 16-bit samples. That buffer is the only form the
//! rest of the player consumes, for impulse responses and clips alike.
//!
//! FuMa ambisonic material is reordered to ACN and rescaled to SN3D during
//! the same pass, so loaded data is always in AmbiX convention.
//!
//! Loading is all-or-nothing: on any error the file is left unloaded.

use crate::audio::ambisonics::{ambisonic_order, FUMA_TO_ACN, SN3D_FROM_MAXN};
use crate::audio::sample::{fill_silence, write_s16_as, write_sample};
use crate::error::{Error, Result};
use ambiplay_common::{AudioConfig, AudioDesc, AudioFormat, Technique};
use std::path::Path;
use tracing::{debug, info};

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Trailing 12 bytes of the KSDATAFORMAT_SUBTYPE_* GUIDs
const KSDATAFORMAT_GUID_TAIL: [u8; 12] = [
    0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xAA, 0x00, 0x38, 0x9B, 0x71,
];

/// Trailing 12 bytes of the AMB B-format sub-format GUIDs (FuMa material)
const AMB_GUID_TAIL: [u8; 12] = [
    0x21, 0x07, 0xD3, 0x11, 0x86, 0x44, 0xC8, 0xC1, 0xCA, 0x00, 0x00, 0x00,
];

/// Sample encoding of the `data` chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Pcm,
    Float,
}

/// Parsed `fmt ` chunk
#[derive(Debug, Clone, Copy)]
struct FmtChunk {
    encoding: Encoding,
    channels: u16,
    sample_rate: u32,
    byte_rate: u32,
    block_align: u16,
    bits_per_sample: u16,
    /// WAVE_FORMAT_EXTENSIBLE with an AMB sub-format
    amb: bool,
}

/// Endian-aware cursor over the file bytes
struct ChunkReader<'a> {
    data: &'a [u8],
    pos: usize,
    big_endian: bool,
}

impl<'a> ChunkReader<'a> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(Error::InvalidWav(format!(
                "Unexpected end of file at offset {}",
                self.pos
            )));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn tag(&mut self) -> Result<[u8; 4]> {
        let b = self.bytes(4)?;
        Ok([b[0], b[1], b[2], b[3]])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.bytes(2)?;
        Ok(if self.big_endian {
            u16::from_be_bytes([b[0], b[1]])
        } else {
            u16::from_le_bytes([b[0], b[1]])
        })
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.bytes(4)?;
        Ok(if self.big_endian {
            u32::from_be_bytes([b[0], b[1], b[2], b[3]])
        } else {
            u32::from_le_bytes([b[0], b[1], b[2], b[3]])
        })
    }
}

/// Canonical in-memory WAV asset.
///
/// Samples are interleaved S16. `cursor` is the next frame read by
/// [`WavFile::streaming`]; it always lies in `[0, frames)` and wraps at the end.
#[derive(Debug, Clone, Default)]
pub struct WavFile {
    samples: Vec<i16>,
    channels: u16,
    frames: usize,
    sample_rate: u32,
    cursor: usize,
    technique: Technique,
}

impl WavFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an asset from canonical interleaved samples
    pub fn from_samples(samples: Vec<i16>, channels: u16, sample_rate: u32, technique: Technique) -> Result<Self> {
        if channels == 0 || sample_rate == 0 || samples.is_empty() {
            return Err(Error::InvalidWav(format!(
                "Empty or shapeless buffer: {} samples, {} channels, {} Hz",
                samples.len(),
                channels,
                sample_rate
            )));
        }
        if samples.len() % channels as usize != 0 {
            return Err(Error::InvalidWav(format!(
                "{} samples do not divide into {} channels",
                samples.len(),
                channels
            )));
        }

        let frames = samples.len() / channels as usize;
        let samples = if technique == Technique::FuMa {
            fuma_to_ambix(&samples, channels as usize)?
        } else {
            samples
        };

        Ok(Self {
            samples,
            channels,
            frames,
            sample_rate,
            cursor: 0,
            technique: canonical_technique(technique),
        })
    }

    /// Load a WAV file from disk, interpreting it with `technique`.
    pub fn load(&mut self, path: impl AsRef<Path>, technique: Technique) -> Result<()> {
        let path = path.as_ref();
        self.unload();

        let bytes = std::fs::read(path)?;
        self.load_from_bytes(&bytes, technique)?;

        info!(
            "Loaded {}: {} ch, {} Hz, {} frames ({})",
            path.display(),
            self.channels,
            self.sample_rate,
            self.frames,
            self.technique
        );
        Ok(())
    }

    /// Load a WAV image already in memory.
    pub fn load_from_bytes(&mut self, bytes: &[u8], technique: Technique) -> Result<()> {
        self.unload();
        *self = Self::parse(bytes, technique)?;
        Ok(())
    }

    /// Release the sample buffer
    pub fn unload(&mut self) {
        *self = Self::default();
    }

    fn parse(bytes: &[u8], technique: Technique) -> Result<Self> {
        let mut reader = ChunkReader {
            data: bytes,
            pos: 0,
            big_endian: false,
        };

        match &reader.tag()? {
            b"RIFF" => reader.big_endian = false,
            b"RIFX" => reader.big_endian = true,
            _ => return Err(Error::InvalidWav("Missing RIFF/RIFX header".to_string())),
        }
        let _riff_size = reader.u32()?;
        if &reader.tag()? != b"WAVE" {
            return Err(Error::InvalidWav("Missing WAVE form type".to_string()));
        }

        let mut fmt: Option<FmtChunk> = None;
        let mut data: Option<&[u8]> = None;

        while reader.remaining() >= 8 && (fmt.is_none() || data.is_none()) {
            let id = reader.tag()?;
            let size = reader.u32()? as usize;
            if size > reader.remaining() {
                return Err(Error::InvalidWav(format!(
                    "Chunk {:?} claims {} bytes, only {} remain",
                    String::from_utf8_lossy(&id),
                    size,
                    reader.remaining()
                )));
            }

            let start = reader.pos;
            match &id {
                b"fmt " => fmt = Some(Self::parse_fmt(&mut reader, size)?),
                b"data" => data = Some(&bytes[start..start + size]),
                _ => debug!("Skipping chunk {:?} ({} bytes)", String::from_utf8_lossy(&id), size),
            }

            // Chunks are word aligned; extended fmt bytes are skipped here too
            let padded = size + (size & 1);
            reader.pos = (start + padded).min(bytes.len());
        }

        let fmt = fmt.ok_or_else(|| Error::InvalidWav("Missing fmt chunk".to_string()))?;
        let data = data.ok_or_else(|| Error::InvalidWav("Missing data chunk".to_string()))?;

        let technique = if fmt.amb && technique == Technique::Default {
            Technique::FuMa
        } else {
            technique
        };

        Self::decode(&fmt, data, reader.big_endian, technique)
    }

    fn parse_fmt(reader: &mut ChunkReader<'_>, size: usize) -> Result<FmtChunk> {
        if size < 16 {
            return Err(Error::InvalidWav(format!("fmt chunk too short: {} bytes", size)));
        }

        let format_tag = reader.u16()?;
        let channels = reader.u16()?;
        let sample_rate = reader.u32()?;
        let byte_rate = reader.u32()?;
        let block_align = reader.u16()?;
        let bits_per_sample = reader.u16()?;

        let mut amb = false;
        let format_tag = if format_tag == WAVE_FORMAT_EXTENSIBLE {
            if size < 40 {
                return Err(Error::InvalidWav(
                    "Extensible fmt chunk without sub-format".to_string(),
                ));
            }
            let _extension_size = reader.u16()?;
            let _valid_bits = reader.u16()?;
            let _channel_mask = reader.u32()?;
            let sub_format = reader.u32()?;
            let guid_tail = reader.bytes(12)?;

            if guid_tail == AMB_GUID_TAIL {
                amb = true;
            } else if guid_tail != KSDATAFORMAT_GUID_TAIL {
                return Err(Error::UnsupportedFormat("Unknown extensible sub-format".to_string()));
            }
            sub_format as u16
        } else {
            format_tag
        };

        let encoding = match format_tag {
            WAVE_FORMAT_PCM => Encoding::Pcm,
            WAVE_FORMAT_IEEE_FLOAT => Encoding::Float,
            other => {
                return Err(Error::UnsupportedFormat(format!(
                    "WAVE format tag 0x{:04X}",
                    other
                )))
            }
        };

        Ok(FmtChunk {
            encoding,
            channels,
            sample_rate,
            byte_rate,
            block_align,
            bits_per_sample,
            amb,
        })
    }

    fn decode(fmt: &FmtChunk, data: &[u8], big_endian: bool, technique: Technique) -> Result<Self> {
        if fmt.channels == 0 || fmt.sample_rate == 0 {
            return Err(Error::InvalidWav(format!(
                "Invalid stream shape: {} channels, {} Hz",
                fmt.channels, fmt.sample_rate
            )));
        }

        let decode_sample: fn(&[u8], bool) -> i16 = match (fmt.encoding, fmt.bits_per_sample) {
            (Encoding::Pcm, 8) => decode_u8,
            (Encoding::Pcm, 16) => decode_s16,
            (Encoding::Pcm, 24) => decode_s24,
            (Encoding::Pcm, 32) => decode_s32,
            (Encoding::Float, 32) => decode_f32,
            (Encoding::Float, 64) => decode_f64,
            (encoding, bits) => {
                return Err(Error::UnsupportedFormat(format!(
                    "{:?} with {} bits per sample",
                    encoding, bits
                )))
            }
        };

        let bytes_per_sample = fmt.bits_per_sample as usize / 8;
        let channels = fmt.channels as usize;
        let block_align = channels * bytes_per_sample;

        if fmt.block_align as usize != block_align {
            return Err(Error::InvalidWav(format!(
                "Block align {} does not match {} channels x {} bytes",
                fmt.block_align, channels, bytes_per_sample
            )));
        }
        if fmt.byte_rate as u64 != fmt.sample_rate as u64 * block_align as u64 {
            return Err(Error::InvalidWav(format!(
                "Byte rate {} does not match {} Hz x {} bytes per frame",
                fmt.byte_rate, fmt.sample_rate, block_align
            )));
        }
        if data.is_empty() || data.len() % block_align != 0 {
            return Err(Error::InvalidWav(format!(
                "Data size {} is not a whole number of {}-byte frames",
                data.len(),
                block_align
            )));
        }
        if technique == Technique::FuMa && ambisonic_order(channels).is_none() {
            return Err(Error::UnsupportedFormat(format!(
                "FuMa material must have 4, 9 or 16 channels, got {}",
                channels
            )));
        }

        let frames = data.len() / block_align;
        let mut samples = Vec::with_capacity(frames * channels);

        for frame in data.chunks_exact(block_align) {
            if technique == Technique::FuMa {
                for (acn, &gain) in SN3D_FROM_MAXN.iter().enumerate().take(channels) {
                    let offset = FUMA_TO_ACN[acn] * bytes_per_sample;
                    let s = decode_sample(&frame[offset..offset + bytes_per_sample], big_endian);
                    samples.push(saturate_s16(s as f32 * gain));
                }
            } else {
                for sample in frame.chunks_exact(bytes_per_sample) {
                    samples.push(decode_sample(sample, big_endian));
                }
            }
        }

        Ok(Self {
            samples,
            channels: fmt.channels,
            frames,
            sample_rate: fmt.sample_rate,
            cursor: 0,
            technique: canonical_technique(technique),
        })
    }

    pub fn is_loaded(&self) -> bool {
        !self.samples.is_empty()
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Technique of the canonical data (FuMa input is reported as AmbiX)
    pub fn technique(&self) -> Technique {
        self.technique
    }

    /// Interleaved canonical samples
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Move the read cursor, wrapping past the end
    pub fn seek(&mut self, frame: usize) {
        self.cursor = if self.frames == 0 { 0 } else { frame % self.frames };
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames as f64 / self.sample_rate as f64
    }

    /// Stream config of the canonical buffer
    pub fn config(&self) -> AudioConfig {
        AudioConfig::new(AudioFormat::S16, self.sample_rate, self.channels)
    }

    /// Source description for `format` as delivered by [`WavFile::streaming`]
    pub fn desc(&self, format: AudioFormat) -> AudioDesc {
        AudioDesc::new(self.technique, format, self.sample_rate, self.channels)
    }

    /// One channel as planar normalized floats
    pub fn channel_f32(&self, channel: usize) -> Option<Vec<f32>> {
        if channel >= self.channels as usize {
            return None;
        }
        Some(
            self.samples
                .iter()
                .skip(channel)
                .step_by(self.channels as usize)
                .map(|&s| s as f32 / 32768.0)
                .collect(),
        )
    }

    /// Read `frames` frames from the cursor into `dst` as `format`, scaled by `gain`.
    ///
    /// The cursor wraps to the start at the end of the buffer, so a clip loops
    /// forever. Returns the number of frames written; an unloaded file writes
    /// silence.
    pub fn streaming(&mut self, dst: &mut [u8], frames: usize, format: AudioFormat, gain: f32) -> usize {
        let sample_size = format.bytes_per_sample();
        let frame_size = self.channels as usize * sample_size;
        if !self.is_loaded() || frame_size == 0 {
            fill_silence(format, dst);
            return 0;
        }

        let frames = frames.min(dst.len() / frame_size);
        let channels = self.channels as usize;
        let unity = gain == 1.0;

        for out_frame in dst.chunks_exact_mut(frame_size).take(frames) {
            let base = self.cursor * channels;
            let frame = &self.samples[base..base + channels];
            for (out, &sample) in out_frame.chunks_exact_mut(sample_size).zip(frame) {
                if unity {
                    write_s16_as(format, sample, out);
                } else {
                    write_sample(format, sample as f32 / 32768.0 * gain, out);
                }
            }

            self.cursor += 1;
            if self.cursor >= self.frames {
                self.cursor = 0;
            }
        }

        frames
    }

    /// Write the canonical buffer as a 16-bit PCM RIFF/WAVE file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        if !self.is_loaded() {
            return Err(Error::InvalidState("No WAV data loaded".to_string()));
        }

        let spec = hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(path.as_ref(), spec)?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;

        debug!("Saved {} frames to {}", self.frames, path.as_ref().display());
        Ok(())
    }
}

/// Reorder interleaved FuMa frames to ACN and rescale to SN3D
fn fuma_to_ambix(samples: &[i16], channels: usize) -> Result<Vec<i16>> {
    if ambisonic_order(channels).is_none() {
        return Err(Error::UnsupportedFormat(format!(
            "FuMa material must have 4, 9 or 16 channels, got {}",
            channels
        )));
    }

    let mut out = Vec::with_capacity(samples.len());
    for frame in samples.chunks_exact(channels) {
        for (acn, &gain) in SN3D_FROM_MAXN.iter().enumerate().take(channels) {
            out.push(saturate_s16(frame[FUMA_TO_ACN[acn]] as f32 * gain));
        }
    }
    Ok(out)
}

/// FuMa data is stored converted, so it is reported as AmbiX
fn canonical_technique(technique: Technique) -> Technique {
    match technique {
        Technique::FuMa => Technique::AmbiX,
        other => other,
    }
}

fn saturate_s16(value: f32) -> i16 {
    value.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

fn decode_u8(b: &[u8], _big_endian: bool) -> i16 {
    ((b[0] as i16) - 128) << 8
}

fn decode_s16(b: &[u8], big_endian: bool) -> i16 {
    if big_endian {
        i16::from_be_bytes([b[0], b[1]])
    } else {
        i16::from_le_bytes([b[0], b[1]])
    }
}

fn decode_s24(b: &[u8], big_endian: bool) -> i16 {
    let raw = if big_endian {
        i32::from_be_bytes([b[0], b[1], b[2], 0])
    } else {
        i32::from_le_bytes([0, b[0], b[1], b[2]])
    };
    (raw >> 16) as i16
}

fn decode_s32(b: &[u8], big_endian: bool) -> i16 {
    let raw = if big_endian {
        i32::from_be_bytes([b[0], b[1], b[2], b[3]])
    } else {
        i32::from_le_bytes([b[0], b[1], b[2], b[3]])
    };
    (raw >> 16) as i16
}

fn decode_f32(b: &[u8], big_endian: bool) -> i16 {
    let raw = [b[0], b[1], b[2], b[3]];
    let value = if big_endian {
        f32::from_be_bytes(raw)
    } else {
        f32::from_le_bytes(raw)
    };
    saturate_s16(value * 32768.0)
}

fn decode_f64(b: &[u8], big_endian: bool) -> i16 {
    let raw = [b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]];
    let value = if big_endian {
        f64::from_be_bytes(raw)
    } else {
        f64::from_le_bytes(raw)
    };
    saturate_s16(value as f32 * 32768.0)
}
