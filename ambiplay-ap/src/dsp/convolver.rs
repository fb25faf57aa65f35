//! Streaming FFT convolution (overlap-add)
//!
//! Each channel owns a cached frequency-domain impulse response and a
//! time-domain overlap tail that carries convolution energy across block
//! boundaries. A convolver is driven by exactly one thread (the render
//! chain); it is not meant to be shared.
//!
//! The tail must be cleared with [`FftConvolver::reset`] before an unrelated
//! stream is pushed through the same instance, otherwise the previous
//! stream's reverberant energy bleeds into the new one.

use crate::dsp::fft::RealFft;
use crate::error::{Error, Result};
use realfft::num_complex::Complex;

/// Multi-channel overlap-add convolver with a fixed block size.
#[derive(Default)]
pub struct FftConvolver {
    block_size: usize,
    ir_size: usize,
    fft: Option<RealFft>,
    /// Cached spectrum of each channel's zero-padded impulse response
    responses: Vec<Vec<Complex<f32>>>,
    /// Per-channel tail, `fft_size - block_size` samples
    overlaps: Vec<Vec<f32>>,
    spectrum: Vec<Complex<f32>>,
    result: Vec<f32>,
}

impl FftConvolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a convolver from planar impulse responses (one slice per channel)
    pub fn with_responses(block_size: usize, responses: &[&[f32]]) -> Result<Self> {
        let mut convolver = Self::new();
        convolver.initialize(block_size, responses)?;
        Ok(convolver)
    }

    /// Initialize from planar impulse responses, all of the same length.
    pub fn initialize(&mut self, block_size: usize, responses: &[&[f32]]) -> Result<()> {
        let ir_size = responses.first().map(|ir| ir.len()).unwrap_or(0);
        if let Some(bad) = responses.iter().position(|ir| ir.len() != ir_size) {
            self.finalize();
            return Err(Error::Convolver(format!(
                "Impulse response {} has {} taps, expected {}",
                bad,
                responses[bad].len(),
                ir_size
            )));
        }

        self.initialize_with(block_size, responses.len(), ir_size, |channel, tap| {
            responses[channel][tap]
        })
    }

    /// Initialize from an interleaved buffer: tap `k` of channel `c` is at
    /// `data[k * stride + c]`.
    pub fn initialize_strided(
        &mut self,
        block_size: usize,
        data: &[f32],
        channels: usize,
        ir_size: usize,
        stride: usize,
    ) -> Result<()> {
        if stride < channels {
            self.finalize();
            return Err(Error::Convolver(format!(
                "Stride {} is smaller than channel count {}",
                stride, channels
            )));
        }

        let needed = if ir_size == 0 {
            0
        } else {
            (ir_size - 1) * stride + channels
        };
        if data.len() < needed {
            self.finalize();
            return Err(Error::Convolver(format!(
                "Impulse data holds {} values, {} required",
                data.len(),
                needed
            )));
        }

        self.initialize_with(block_size, channels, ir_size, |channel, tap| {
            data[tap * stride + channel]
        })
    }

    fn initialize_with<F>(&mut self, block_size: usize, channels: usize, ir_size: usize, tap: F) -> Result<()>
    where
        F: Fn(usize, usize) -> f32,
    {
        // Re-initialization replaces whatever was there; a failure leaves nothing behind
        self.finalize();

        if block_size == 0 || channels == 0 || ir_size == 0 {
            return Err(Error::Convolver(format!(
                "Invalid convolver shape: block={} channels={} ir={}",
                block_size, channels, ir_size
            )));
        }
        if ir_size > block_size {
            return Err(Error::Convolver(format!(
                "Impulse response of {} taps exceeds block size {}",
                ir_size, block_size
            )));
        }

        let fft_size = (block_size + ir_size - 1).next_power_of_two().max(2);
        let mut fft = RealFft::new(fft_size)?;
        let bins = fft.bins();

        let mut padded = vec![0.0f32; fft_size];
        let mut responses = Vec::with_capacity(channels);
        for channel in 0..channels {
            for (k, slot) in padded[..ir_size].iter_mut().enumerate() {
                *slot = tap(channel, k);
            }
            let mut spectrum = vec![Complex::new(0.0, 0.0); bins];
            fft.analysis(&padded, &mut spectrum)?;
            responses.push(spectrum);
        }

        self.block_size = block_size;
        self.ir_size = ir_size;
        self.overlaps = vec![vec![0.0; fft_size - block_size]; channels];
        self.spectrum = vec![Complex::new(0.0, 0.0); bins];
        self.result = vec![0.0; fft_size];
        self.responses = responses;
        self.fft = Some(fft);

        Ok(())
    }

    /// Release all buffers; the convolver must be initialized again before use.
    pub fn finalize(&mut self) {
        self.fft = None;
        self.block_size = 0;
        self.ir_size = 0;
        self.responses = Vec::new();
        self.overlaps = Vec::new();
        self.spectrum = Vec::new();
        self.result = Vec::new();
    }

    pub fn is_initialized(&self) -> bool {
        self.fft.is_some()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn ir_size(&self) -> usize {
        self.ir_size
    }

    pub fn fft_size(&self) -> usize {
        self.fft.as_ref().map(|fft| fft.size()).unwrap_or(0)
    }

    pub fn overlap_size(&self) -> usize {
        self.fft_size().saturating_sub(self.block_size)
    }

    pub fn channels(&self) -> usize {
        self.responses.len()
    }

    /// Convolve one block of `src` on `channel`, overwriting `dst[..src.len()]`.
    pub fn process(&mut self, dst: &mut [f32], src: &[f32], channel: usize) -> Result<()> {
        let n = self.convolve_block(dst.len(), src, channel)?;
        dst[..n].copy_from_slice(&self.result[..n]);
        self.add_overlap(&mut dst[..n], channel);
        self.carry_tail(n, channel);
        Ok(())
    }

    /// Convolve one block of `src` on `channel`, accumulating into `dst[..src.len()]`.
    pub fn process_add(&mut self, dst: &mut [f32], src: &[f32], channel: usize) -> Result<()> {
        let n = self.convolve_block(dst.len(), src, channel)?;
        for (out, &y) in dst[..n].iter_mut().zip(&self.result[..n]) {
            *out += y;
        }
        self.add_overlap(&mut dst[..n], channel);
        self.carry_tail(n, channel);
        Ok(())
    }

    /// Zero the overlap tail of one channel, or of all channels with `None`.
    pub fn reset(&mut self, channel: Option<usize>) {
        match channel {
            Some(channel) => {
                if let Some(overlap) = self.overlaps.get_mut(channel) {
                    overlap.fill(0.0);
                }
            }
            None => {
                for overlap in &mut self.overlaps {
                    overlap.fill(0.0);
                }
            }
        }
    }

    /// Forward transform, spectral multiply and inverse transform into `self.result`.
    fn convolve_block(&mut self, dst_len: usize, src: &[f32], channel: usize) -> Result<usize> {
        let fft = self
            .fft
            .as_mut()
            .ok_or_else(|| Error::Convolver("Convolver not initialized".to_string()))?;

        if channel >= self.responses.len() {
            return Err(Error::Convolver(format!(
                "Channel {} out of range ({} channels)",
                channel,
                self.responses.len()
            )));
        }

        let n = src.len();
        if n > self.block_size || dst_len < n {
            return Err(Error::Convolver(format!(
                "Block of {} samples does not fit block size {} / destination {}",
                n, self.block_size, dst_len
            )));
        }

        fft.analysis(src, &mut self.spectrum)?;
        for (bin, response) in self.spectrum.iter_mut().zip(&self.responses[channel]) {
            *bin *= *response;
        }
        fft.synthesis(&self.spectrum, &mut self.result)?;

        Ok(n)
    }

    /// Add the pending tail to the head of `dst`.
    ///
    /// The tail can be shorter than a block (it only has to hold `ir_size - 1`
    /// samples); positions past its end have nothing pending.
    fn add_overlap(&self, dst: &mut [f32], channel: usize) {
        for (out, &pending) in dst.iter_mut().zip(&self.overlaps[channel]) {
            *out += pending;
        }
    }

    /// Shift the tail by `n` samples and add the new block's spill-over.
    fn carry_tail(&mut self, n: usize, channel: usize) {
        let overlap = &mut self.overlaps[channel];
        let len = overlap.len();
        for j in 0..len {
            let previous = if n + j < len { overlap[n + j] } else { 0.0 };
            overlap[j] = self.result[n + j] + previous;
        }
    }
}
