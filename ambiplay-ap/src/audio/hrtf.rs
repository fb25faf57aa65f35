//! HRTF impulse-response banks
//!
//! A bank holds one stereo (left ear, right ear) impulse-response pair per
//! virtual source: a loudspeaker slot for surround decoding, an ACN channel
//! for ambisonics, or a TBE channel.

use crate::audio::wav::WavFile;
use crate::dsp::convolver::FftConvolver;
use crate::error::{Error, Result};
use ambiplay_common::Technique;
use std::path::Path;
use tracing::info;

/// Stereo impulse-response pair for one virtual source
#[derive(Debug, Clone, PartialEq)]
pub struct HrtfPair {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

/// Set of equally long HRTF pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct HrtfBank {
    pairs: Vec<HrtfPair>,
    ir_len: usize,
}

impl HrtfBank {
    pub fn from_pairs(pairs: Vec<HrtfPair>) -> Result<Self> {
        let ir_len = pairs.first().map(|p| p.left.len()).unwrap_or(0);
        if ir_len == 0 {
            return Err(Error::Convolver("HRTF bank needs at least one non-empty pair".to_string()));
        }

        for (i, pair) in pairs.iter().enumerate() {
            if pair.left.len() != ir_len || pair.right.len() != ir_len {
                return Err(Error::Convolver(format!(
                    "HRTF pair {} has {}/{} taps, expected {}",
                    i,
                    pair.left.len(),
                    pair.right.len(),
                    ir_len
                )));
            }
        }

        Ok(Self { pairs, ir_len })
    }

    /// Build from a WAV whose channels are interleaved as L0 R0 L1 R1 ...
    pub fn from_wav(wav: &WavFile) -> Result<Self> {
        let channels = wav.channels() as usize;
        if channels == 0 || channels % 2 != 0 {
            return Err(Error::UnsupportedFormat(format!(
                "HRTF WAV needs an even channel count, got {}",
                channels
            )));
        }

        let mut pairs = Vec::with_capacity(channels / 2);
        for source in 0..channels / 2 {
            let left = wav.channel_f32(2 * source);
            let right = wav.channel_f32(2 * source + 1);
            match (left, right) {
                (Some(left), Some(right)) => pairs.push(HrtfPair { left, right }),
                _ => return Err(Error::InvalidState("HRTF WAV is not loaded".to_string())),
            }
        }

        Self::from_pairs(pairs)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut wav = WavFile::new();
        wav.load(path, Technique::Default)?;
        let bank = Self::from_wav(&wav)?;

        info!(
            "HRTF bank {}: {} sources, {} taps",
            path.display(),
            bank.sources(),
            bank.ir_len()
        );
        Ok(bank)
    }

    /// Number of virtual sources
    pub fn sources(&self) -> usize {
        self.pairs.len()
    }

    pub fn ir_len(&self) -> usize {
        self.ir_len
    }

    pub fn pairs(&self) -> &[HrtfPair] {
        &self.pairs
    }

    /// Convolver with channel `2i` = left ear and `2i + 1` = right ear of source `i`.
    pub fn convolver(&self, block_size: usize) -> Result<FftConvolver> {
        let responses: Vec<&[f32]> = self
            .pairs
            .iter()
            .flat_map(|pair| [pair.left.as_slice(), pair.right.as_slice()])
            .collect();
        FftConvolver::with_responses(block_size, &responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_wav_splits_pairs() {
        // Two sources, two taps: frames are [L0 R0 L1 R1]
        let wav = WavFile::from_samples(
            vec![16384, -16384, 8192, 0, 0, 0, 0, 8192],
            4,
            48000,
            Technique::Default,
        )
        .unwrap();

        let bank = HrtfBank::from_wav(&wav).unwrap();
        assert_eq!(bank.sources(), 2);
        assert_eq!(bank.ir_len(), 2);
        assert_eq!(bank.pairs()[0].left, vec![0.5, 0.0]);
        assert_eq!(bank.pairs()[0].right, vec![-0.5, 0.0]);
        assert_eq!(bank.pairs()[1].right, vec![0.0, 0.25]);
    }

    #[test]
    fn test_odd_channel_count_rejected() {
        let wav = WavFile::from_samples(vec![0; 3], 3, 48000, Technique::Default).unwrap();
        assert!(HrtfBank::from_wav(&wav).is_err());
    }

    #[test]
    fn test_mismatched_pair_rejected() {
        let pairs = vec![HrtfPair {
            left: vec![1.0, 0.0],
            right: vec![1.0],
        }];
        assert!(HrtfBank::from_pairs(pairs).is_err());
    }

    #[test]
    fn test_convolver_layout() {
        let bank = HrtfBank::from_pairs(vec![
            HrtfPair { left: vec![1.0], right: vec![0.5] },
            HrtfPair { left: vec![0.25], right: vec![0.125] },
        ])
        .unwrap();

        let mut convolver = bank.convolver(4).unwrap();
        assert_eq!(convolver.channels(), 4);

        let mut out = [0.0f32; 4];
        convolver.process(&mut out, &[1.0, 0.0, 0.0, 0.0], 3).unwrap();
        assert!((out[0] - 0.125).abs() < 1e-6);
    }

    #[test]
    fn test_ir_longer_than_block_rejected() {
        let bank = HrtfBank::from_pairs(vec![HrtfPair {
            left: vec![0.1; 16],
            right: vec![0.1; 16],
        }])
        .unwrap();
        assert!(bank.convolver(8).is_err());
    }
}
