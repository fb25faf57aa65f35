//! Format decode pipeline
//!
//! Turns one block of source audio, described by an [`AudioDesc`], into the
//! device's stream format. Depending on the source layout this is a plain
//! copy, a sample-format conversion, binaural convolution of a surround mix,
//! or binaural decoding of an ambisonic sound field.
//!
//! Runs on the audio thread. All scratch is allocated up front (at
//! construction and when an HRTF bank is installed), so decoding never
//! allocates. Anything the pipeline cannot render comes out as silence.

use crate::audio::ambisonics::{
    ambisonic_order, projection_gains, IdentityRotator, SoundFieldRotator, FUMA_TO_ACN,
    SN3D_FROM_MAXN,
};
use crate::audio::hrtf::HrtfBank;
use crate::audio::sample::{convert_samples, fill_silence, read_sample, scale_samples, write_sample};
use crate::dsp::convolver::FftConvolver;
use crate::error::{Error, Result};
use ambiplay_common::{AudioConfig, AudioDesc, AudioFormat, Orientation, Technique, MAX_AUDIO_CHANNELS};
use tracing::{info, warn};

/// Frames per convolution block
pub const CONVOLUTION_BLOCK_SIZE: usize = 512;

/// Gains below this magnitude render silence
pub const SILENT_GAIN: f32 = 1e-5;

/// Virtual loudspeaker slots of a surround HRTF bank: FL FR C LFE BL BR SL SR
pub const SURROUND_SLOTS: usize = 8;

const LFE_SLOT: usize = 3;

/// ITU 5.1 channel order [L R C LFE Ls Rs] mapped to surround slots
const SLOTS_5_1: [usize; 6] = [0, 1, 2, 3, 6, 7];

/// 7.1 channel order [L R C LFE BL BR SL SR] mapped to surround slots
const SLOTS_7_1: [usize; 8] = [0, 1, 2, 3, 4, 5, 6, 7];

/// Channels of the TBE layout
const TBE_CHANNELS: usize = 8;

/// Which path produced a decoded block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodePath {
    Silence,
    Passthrough,
    Convert,
    SurroundConvolution,
    AmbisonicConvolution,
    AmbisonicProjection,
}

/// Layout an HRTF bank is installed for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HrtfTarget {
    Surround,
    Ambisonic,
    Tbe,
}

impl HrtfTarget {
    fn min_sources(self) -> usize {
        match self {
            HrtfTarget::Surround => SURROUND_SLOTS,
            HrtfTarget::Ambisonic => 4,
            HrtfTarget::Tbe => TBE_CHANNELS,
        }
    }
}

/// Installed bank: convolver plus the number of sources it covers
struct HrtfRenderer {
    convolver: FftConvolver,
    sources: usize,
}

/// Source/destination pair of the last mismatch that was logged
type Mismatch = (AudioDesc, AudioConfig);

/// Stateful decoder from source buffers to device buffers.
pub struct DecodePipeline {
    surround: Option<HrtfRenderer>,
    ambisonic: Option<HrtfRenderer>,
    tbe: Option<HrtfRenderer>,
    rotator: Box<dyn SoundFieldRotator>,
    planar: Vec<Vec<f32>>,
    left: Vec<f32>,
    right: Vec<f32>,
    last_mismatch: Option<Mismatch>,
}

impl Default for DecodePipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl DecodePipeline {
    pub fn new() -> Self {
        Self {
            surround: None,
            ambisonic: None,
            tbe: None,
            rotator: Box::new(IdentityRotator),
            planar: vec![vec![0.0; CONVOLUTION_BLOCK_SIZE]; MAX_AUDIO_CHANNELS],
            left: vec![0.0; CONVOLUTION_BLOCK_SIZE],
            right: vec![0.0; CONVOLUTION_BLOCK_SIZE],
            last_mismatch: None,
        }
    }

    pub fn with_rotator(mut self, rotator: Box<dyn SoundFieldRotator>) -> Self {
        self.rotator = rotator;
        self
    }

    pub fn set_rotator(&mut self, rotator: Box<dyn SoundFieldRotator>) {
        self.rotator = rotator;
    }

    /// Install `bank` for `target`, replacing any previous bank.
    pub fn set_hrtf(&mut self, target: HrtfTarget, bank: &HrtfBank) -> Result<()> {
        if bank.sources() < target.min_sources() {
            return Err(Error::Convolver(format!(
                "{:?} HRTF bank needs {} sources, got {}",
                target,
                target.min_sources(),
                bank.sources()
            )));
        }

        let renderer = HrtfRenderer {
            convolver: bank.convolver(CONVOLUTION_BLOCK_SIZE)?,
            sources: bank.sources(),
        };
        info!(
            "Installed {:?} HRTF bank: {} sources, {} taps",
            target,
            renderer.sources,
            bank.ir_len()
        );
        *self.slot(target) = Some(renderer);
        Ok(())
    }

    pub fn clear_hrtf(&mut self, target: HrtfTarget) {
        *self.slot(target) = None;
    }

    pub fn has_hrtf(&self, target: HrtfTarget) -> bool {
        match target {
            HrtfTarget::Surround => self.surround.is_some(),
            HrtfTarget::Ambisonic => self.ambisonic.is_some(),
            HrtfTarget::Tbe => self.tbe.is_some(),
        }
    }

    fn slot(&mut self, target: HrtfTarget) -> &mut Option<HrtfRenderer> {
        match target {
            HrtfTarget::Surround => &mut self.surround,
            HrtfTarget::Ambisonic => &mut self.ambisonic,
            HrtfTarget::Tbe => &mut self.tbe,
        }
    }

    /// Zero the overlap tails of every installed convolver
    pub fn reset(&mut self) {
        for renderer in [&mut self.surround, &mut self.ambisonic, &mut self.tbe]
            .into_iter()
            .flatten()
        {
            renderer.convolver.reset(None);
        }
    }

    /// Decode `frames` frames of `src` into `dst` in `dst_config` format.
    ///
    /// Always writes `frames * dst_config.bytes_per_frame()` bytes (clamped to
    /// `dst.len()`), either decoded audio or silence.
    #[allow(clippy::too_many_arguments)]
    pub fn decode_audio_data(
        &mut self,
        dst: &mut [u8],
        dst_config: &AudioConfig,
        src: &[u8],
        frames: usize,
        src_desc: &AudioDesc,
        orientation: &Orientation,
        gain: f32,
    ) -> DecodePath {
        let dst_frame = dst_config.bytes_per_frame();
        let out_len = (frames * dst_frame).min(dst.len());
        let dst = &mut dst[..out_len];

        if !dst_config.is_valid() {
            fill_silence(dst_config.format, dst);
            return DecodePath::Silence;
        }

        let frames = out_len / dst_frame;
        let src_frame = src_desc.bytes_per_frame();
        if src_frame == 0 || src.len() < frames * src_frame {
            return self.mismatch(dst, dst_config, src_desc, "source buffer too short");
        }

        if gain.abs() < SILENT_GAIN {
            fill_silence(dst_config.format, dst);
            return DecodePath::Silence;
        }

        if src_desc.technique.is_ambisonic() {
            return self.decode_ambisonic(dst, dst_config, src, frames, src_desc, orientation, gain);
        }

        let src_config = src_desc.config();
        let identity = channel_table_is_identity(src_desc);
        if src_config == *dst_config && identity {
            let src = &src[..out_len];
            if gain == 1.0 {
                dst.copy_from_slice(src);
            } else {
                scale_samples(dst_config.format, dst, src, gain);
            }
            return DecodePath::Passthrough;
        }

        if self.surround.is_some()
            && src_desc.format == AudioFormat::F32
            && matches!(src_desc.num_channels, 6 | 8)
            && dst_config.format == AudioFormat::F32
            && dst_config.channels == 2
            && src_desc.sample_rate == dst_config.sample_rate
            && channel_table_fits(src_desc, src_desc.num_channels as usize)
        {
            return self.decode_surround(dst, dst_config, src, frames, src_desc, gain);
        }

        if src_config.is_valid()
            && src_desc.num_channels == dst_config.channels
            && src_desc.sample_rate == dst_config.sample_rate
        {
            if identity {
                let samples = frames * dst_config.channels as usize;
                convert_samples(src_desc.format, src, dst_config.format, dst, samples, gain);
            } else if channel_table_fits(src_desc, src_desc.num_channels as usize) {
                remap_channels(dst, dst_config, src, frames, src_desc, gain);
            } else {
                return self.mismatch(dst, dst_config, src_desc, "channel table points outside the frame");
            }
            return DecodePath::Convert;
        }

        self.mismatch(dst, dst_config, src_desc, "no decode path for layout")
    }

    #[allow(clippy::too_many_arguments)]
    fn decode_ambisonic(
        &mut self,
        dst: &mut [u8],
        dst_config: &AudioConfig,
        src: &[u8],
        frames: usize,
        src_desc: &AudioDesc,
        orientation: &Orientation,
        gain: f32,
    ) -> DecodePath {
        if dst_config.channels != 2 || src_desc.sample_rate != dst_config.sample_rate {
            return self.mismatch(dst, dst_config, src_desc, "ambisonic output must be stereo at the source rate");
        }

        let spatial = src_desc.spatial_channels();
        if !channel_table_fits(src_desc, src_desc.num_channels as usize) {
            return self.mismatch(dst, dst_config, src_desc, "channel table points outside the frame");
        }

        let tbe = src_desc.technique == Technique::Tbe;
        let acn_layout = !tbe && ambisonic_order(spatial).is_some();
        let bank_fits = if tbe {
            spatial == TBE_CHANNELS && self.tbe.is_some()
        } else {
            acn_layout
                && self
                    .ambisonic
                    .as_ref()
                    .is_some_and(|renderer| renderer.sources >= spatial)
        };

        if bank_fits {
            return match self.convolve_ambisonic(dst, dst_config, src, frames, src_desc, orientation, gain) {
                Ok(()) => DecodePath::AmbisonicConvolution,
                Err(e) => self.mismatch(dst, dst_config, src_desc, &e.to_string()),
            };
        }

        if acn_layout && src_desc.format == AudioFormat::F32 {
            self.project_ambisonic(dst, dst_config, src, frames, src_desc, gain);
            return DecodePath::AmbisonicProjection;
        }

        self.mismatch(dst, dst_config, src_desc, "no HRTF bank for ambisonic layout")
    }

    #[allow(clippy::too_many_arguments)]
    fn convolve_ambisonic(
        &mut self,
        dst: &mut [u8],
        dst_config: &AudioConfig,
        src: &[u8],
        frames: usize,
        src_desc: &AudioDesc,
        orientation: &Orientation,
        gain: f32,
    ) -> Result<()> {
        let spatial = src_desc.spatial_channels();
        let tbe = src_desc.technique == Technique::Tbe;
        let fuma = src_desc.technique == Technique::FuMa;
        let renderer = (if tbe { self.tbe.as_mut() } else { self.ambisonic.as_mut() })
            .ok_or_else(|| Error::InvalidState("Ambisonic HRTF bank missing".to_string()))?;

        let reader = FrameReader::new(src, src_desc);
        let mut done = 0;
        while done < frames {
            let n = (frames - done).min(CONVOLUTION_BLOCK_SIZE);

            for (channel, plane) in self.planar.iter_mut().enumerate().take(spatial) {
                let (logical, scale) = if fuma {
                    (FUMA_TO_ACN[channel], SN3D_FROM_MAXN[channel])
                } else {
                    (channel, 1.0)
                };
                let offset = src_desc.frame_offset(logical);
                for (i, value) in plane[..n].iter_mut().enumerate() {
                    *value = reader.sample(done + i, offset) * scale;
                }
            }

            if !tbe {
                self.rotator.rotate(orientation, &mut self.planar[..spatial], n);
            }

            let (left, right) = (&mut self.left[..n], &mut self.right[..n]);
            left.fill(0.0);
            right.fill(0.0);
            for (source, plane) in self.planar.iter().enumerate().take(spatial) {
                renderer.convolver.process_add(left, &plane[..n], 2 * source)?;
                renderer.convolver.process_add(right, &plane[..n], 2 * source + 1)?;
            }

            if src_desc.has_head_locked_stereo() {
                reader.add_head_locked(src_desc, done, left, right);
            }

            write_stereo(dst, dst_config, done, left, right, gain);
            done += n;
        }

        Ok(())
    }

    /// First-order virtual-cardioid projection without convolution
    fn project_ambisonic(
        &mut self,
        dst: &mut [u8],
        dst_config: &AudioConfig,
        src: &[u8],
        frames: usize,
        src_desc: &AudioDesc,
        gain: f32,
    ) {
        let fuma = src_desc.technique == Technique::FuMa;
        let reader = FrameReader::new(src, src_desc);

        let mut done = 0;
        while done < frames {
            let n = (frames - done).min(CONVOLUTION_BLOCK_SIZE);
            let (left, right) = (&mut self.left[..n], &mut self.right[..n]);
            left.fill(0.0);
            right.fill(0.0);

            for acn in 0..2 {
                let (logical, scale) = if fuma {
                    (FUMA_TO_ACN[acn], SN3D_FROM_MAXN[acn])
                } else {
                    (acn, 1.0)
                };
                let offset = src_desc.frame_offset(logical);
                let (l_gain, r_gain) = projection_gains(acn);
                for i in 0..n {
                    let s = reader.sample(done + i, offset) * scale;
                    left[i] += s * l_gain;
                    right[i] += s * r_gain;
                }
            }

            if src_desc.has_head_locked_stereo() {
                reader.add_head_locked(src_desc, done, left, right);
            }

            write_stereo(dst, dst_config, done, left, right, gain);
            done += n;
        }
    }

    fn decode_surround(
        &mut self,
        dst: &mut [u8],
        dst_config: &AudioConfig,
        src: &[u8],
        frames: usize,
        src_desc: &AudioDesc,
        gain: f32,
    ) -> DecodePath {
        match self.convolve_surround(dst, dst_config, src, frames, src_desc, gain) {
            Ok(()) => DecodePath::SurroundConvolution,
            Err(e) => self.mismatch(dst, dst_config, src_desc, &e.to_string()),
        }
    }

    fn convolve_surround(
        &mut self,
        dst: &mut [u8],
        dst_config: &AudioConfig,
        src: &[u8],
        frames: usize,
        src_desc: &AudioDesc,
        gain: f32,
    ) -> Result<()> {
        let slots: &[usize] = if src_desc.num_channels == 6 { &SLOTS_5_1 } else { &SLOTS_7_1 };
        let renderer = self
            .surround
            .as_mut()
            .ok_or_else(|| Error::InvalidState("Surround HRTF bank missing".to_string()))?;

        let reader = FrameReader::new(src, src_desc);
        let mut done = 0;
        while done < frames {
            let n = (frames - done).min(CONVOLUTION_BLOCK_SIZE);

            for (channel, plane) in self.planar.iter_mut().enumerate().take(slots.len()) {
                let offset = src_desc.frame_offset(channel);
                for (i, value) in plane[..n].iter_mut().enumerate() {
                    *value = reader.sample(done + i, offset);
                }
            }

            let (left, right) = (&mut self.left[..n], &mut self.right[..n]);
            left.fill(0.0);
            right.fill(0.0);
            for (&slot, plane) in slots.iter().zip(&self.planar) {
                let plane = &plane[..n];
                if slot == LFE_SLOT {
                    for i in 0..n {
                        left[i] += plane[i];
                        right[i] += plane[i];
                    }
                } else {
                    renderer.convolver.process_add(left, plane, 2 * slot)?;
                    renderer.convolver.process_add(right, plane, 2 * slot + 1)?;
                }
            }

            write_stereo(dst, dst_config, done, left, right, gain);
            done += n;
        }

        Ok(())
    }

    /// Silence the block, logging only the first occurrence of each mismatch
    fn mismatch(
        &mut self,
        dst: &mut [u8],
        dst_config: &AudioConfig,
        src_desc: &AudioDesc,
        reason: &str,
    ) -> DecodePath {
        fill_silence(dst_config.format, dst);

        let key = (*src_desc, *dst_config);
        if self.last_mismatch != Some(key) {
            warn!(
                "Cannot decode {} {} ({} tracks) to {}: {}; rendering silence",
                src_desc.technique,
                src_desc.config(),
                src_desc.num_tracks,
                dst_config,
                reason
            );
            self.last_mismatch = Some(key);
        }

        DecodePath::Silence
    }
}

/// Random access to samples of an interleaved source buffer
struct FrameReader<'a> {
    src: &'a [u8],
    format: AudioFormat,
    frame_size: usize,
    sample_size: usize,
}

impl<'a> FrameReader<'a> {
    fn new(src: &'a [u8], desc: &AudioDesc) -> Self {
        Self {
            src,
            format: desc.format,
            frame_size: desc.bytes_per_frame(),
            sample_size: desc.format.bytes_per_sample(),
        }
    }

    #[inline]
    fn sample(&self, frame: usize, offset: usize) -> f32 {
        let start = frame * self.frame_size + offset * self.sample_size;
        read_sample(self.format, &self.src[start..start + self.sample_size])
    }

    /// Mix the trailing head-locked stereo track straight into the ears
    fn add_head_locked(&self, desc: &AudioDesc, start: usize, left: &mut [f32], right: &mut [f32]) {
        let spatial = desc.spatial_channels();
        let (l_offset, r_offset) = (desc.frame_offset(spatial), desc.frame_offset(spatial + 1));
        for (i, (l, r)) in left.iter_mut().zip(right.iter_mut()).enumerate() {
            *l += self.sample(start + i, l_offset);
            *r += self.sample(start + i, r_offset);
        }
    }
}

/// Logical channel `i` sits at frame offset `i` for every channel in the frame
fn channel_table_is_identity(desc: &AudioDesc) -> bool {
    (0..desc.num_channels as usize).all(|c| desc.frame_offset(c) == c)
}

/// Per-sample conversion that reads each output channel through the channel table
fn remap_channels(dst: &mut [u8], config: &AudioConfig, src: &[u8], frames: usize, desc: &AudioDesc, gain: f32) {
    let reader = FrameReader::new(src, desc);
    let sample_size = config.bytes_per_sample();

    for (frame, out) in dst.chunks_exact_mut(config.bytes_per_frame()).take(frames).enumerate() {
        for (channel, sample) in out.chunks_exact_mut(sample_size).enumerate() {
            let value = reader.sample(frame, desc.frame_offset(channel));
            write_sample(config.format, value * gain, sample);
        }
    }
}

/// Every logical channel below `count` maps inside the frame
fn channel_table_fits(desc: &AudioDesc, count: usize) -> bool {
    count <= MAX_AUDIO_CHANNELS && (0..count).all(|c| desc.frame_offset(c) < desc.num_channels as usize)
}

/// Interleave stereo accumulators into `dst` starting at frame `start`
fn write_stereo(dst: &mut [u8], config: &AudioConfig, start: usize, left: &[f32], right: &[f32], gain: f32) {
    let frame_size = config.bytes_per_frame();
    let sample_size = config.bytes_per_sample();
    let frames = dst[start * frame_size..].chunks_exact_mut(frame_size);

    for ((frame, &l), &r) in frames.zip(left).zip(right) {
        write_sample(config.format, l * gain, &mut frame[..sample_size]);
        write_sample(config.format, r * gain, &mut frame[sample_size..2 * sample_size]);
    }
}
