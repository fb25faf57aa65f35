//! Clip rendering
//!
//! Feeds a looping [`WavFile`] through the decode pipeline, either into the
//! live device (as a [`RenderFn`]) or offline into a new stereo file.

use crate::audio::decode::{DecodePath, DecodePipeline};
use crate::audio::manager::RenderFn;
use crate::audio::output::MAX_CALLBACK_FRAMES;
use crate::audio::sample::fill_silence;
use crate::audio::wav::WavFile;
use crate::error::{Error, Result};
use ambiplay_common::{AudioConfig, AudioDesc, AudioFormat, Orientation};
use tracing::info;

/// Source format clips are streamed in before decoding
const CLIP_FORMAT: AudioFormat = AudioFormat::F32;

/// Plays one clip in a loop.
pub struct ClipRenderer {
    wav: WavFile,
    desc: AudioDesc,
    gain: f32,
    orientation: Orientation,
    scratch: Vec<u8>,
}

impl ClipRenderer {
    /// `head_locked` marks the clip's last two channels as head-locked stereo.
    pub fn new(wav: WavFile, head_locked: bool, gain: f32) -> Result<Self> {
        if !wav.is_loaded() {
            return Err(Error::InvalidState("Clip has no audio data".to_string()));
        }

        let mut desc = wav.desc(CLIP_FORMAT);
        if head_locked {
            desc = desc.with_head_locked_stereo();
        }
        let scratch = vec![0u8; MAX_CALLBACK_FRAMES * desc.bytes_per_frame()];

        Ok(Self {
            wav,
            desc,
            gain,
            orientation: Orientation::IDENTITY,
            scratch,
        })
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation.normalized();
        self
    }

    pub fn desc(&self) -> &AudioDesc {
        &self.desc
    }

    /// Length of one pass through the clip
    pub fn frames(&self) -> usize {
        self.wav.frames()
    }

    /// Fill `dst` (in `config` format) with the next frames of the clip.
    pub fn render(&mut self, dst: &mut [u8], config: &AudioConfig, pipeline: &mut DecodePipeline) -> DecodePath {
        let frame_size = config.bytes_per_frame();
        if frame_size == 0 {
            fill_silence(config.format, dst);
            return DecodePath::Silence;
        }

        let src_frame = self.desc.bytes_per_frame();
        let mut path = DecodePath::Silence;
        for chunk in dst.chunks_mut(MAX_CALLBACK_FRAMES * frame_size) {
            let frames = chunk.len() / frame_size;
            let src = &mut self.scratch[..frames * src_frame];
            self.wav.streaming(src, frames, CLIP_FORMAT, 1.0);
            path = pipeline.decode_audio_data(chunk, config, src, frames, &self.desc, &self.orientation, self.gain);
        }
        path
    }

    pub fn into_render_fn(mut self) -> RenderFn {
        Box::new(move |dst, config, pipeline| {
            self.render(dst, config, pipeline);
        })
    }
}

/// Render `frames` frames of `clip` into a 16-bit file with `channels` at the clip's rate.
pub fn render_to_wav(
    clip: &mut ClipRenderer,
    pipeline: &mut DecodePipeline,
    channels: u16,
    frames: usize,
) -> Result<(WavFile, DecodePath)> {
    let config = AudioConfig::new(AudioFormat::S16, clip.desc.sample_rate, channels);
    let mut bytes = vec![0u8; frames * config.bytes_per_frame()];
    let path = clip.render(&mut bytes, &config, pipeline);

    let samples: Vec<i16> = bytes
        .chunks_exact(2)
        .map(|b| i16::from_ne_bytes([b[0], b[1]]))
        .collect();
    let wav = WavFile::from_samples(samples, channels, config.sample_rate, ambiplay_common::Technique::Default)?;

    info!("Rendered {} frames via {:?}", frames, path);
    Ok((wav, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambiplay_common::Technique;

    #[test]
    fn test_unloaded_clip_rejected() {
        assert!(ClipRenderer::new(WavFile::new(), false, 1.0).is_err());
    }

    #[test]
    fn test_stereo_clip_passes_through_convert() {
        let wav = WavFile::from_samples(vec![16384, -16384, 8192, -8192], 2, 48000, Technique::Default).unwrap();
        let mut clip = ClipRenderer::new(wav, false, 1.0).unwrap();
        let mut pipeline = DecodePipeline::new();

        let (out, path) = render_to_wav(&mut clip, &mut pipeline, 2, 4).unwrap();
        assert_eq!(path, DecodePath::Convert);
        // Clip loops after two frames
        assert_eq!(out.samples(), &[16384, -16384, 8192, -8192, 16384, -16384, 8192, -8192]);
    }
}
