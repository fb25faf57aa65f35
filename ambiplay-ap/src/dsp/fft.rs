//! Fixed-size real-valued FFT
//!
//! Thin wrapper over `realfft` planners that owns its scratch buffers, so
//! repeated transforms of the same size never allocate.

use crate::error::{Error, Result};
use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use std::sync::Arc;

/// Forward/inverse real transform of a fixed power-of-two size `n`.
///
/// `analysis` maps up to `n` real samples to `n / 2 + 1` complex bins,
/// `synthesis` maps them back with the `1 / n` normalization applied.
pub struct RealFft {
    size: usize,
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
    time: Vec<f32>,
    freq: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl RealFft {
    pub fn new(size: usize) -> Result<Self> {
        if size < 2 || !size.is_power_of_two() {
            return Err(Error::Convolver(format!(
                "FFT size must be a power of two >= 2, got {}",
                size
            )));
        }

        let mut planner = RealFftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        let scratch_len = forward.get_scratch_len().max(inverse.get_scratch_len());

        Ok(Self {
            size,
            time: vec![0.0; size],
            freq: vec![Complex::new(0.0, 0.0); size / 2 + 1],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            forward,
            inverse,
        })
    }

    /// Transform size in real samples
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of complex bins produced by `analysis`
    pub fn bins(&self) -> usize {
        self.size / 2 + 1
    }

    /// Forward transform; input shorter than the transform size is zero-padded.
    pub fn analysis(&mut self, input: &[f32], output: &mut [Complex<f32>]) -> Result<()> {
        if input.len() > self.size {
            return Err(Error::Convolver(format!(
                "FFT input of {} samples exceeds size {}",
                input.len(),
                self.size
            )));
        }

        self.time[..input.len()].copy_from_slice(input);
        self.time[input.len()..].fill(0.0);

        self.forward
            .process_with_scratch(&mut self.time, output, &mut self.scratch)
            .map_err(|e| Error::Convolver(format!("Forward FFT failed: {}", e)))
    }

    /// Inverse transform, normalized so that `synthesis(analysis(x)) == x`.
    pub fn synthesis(&mut self, input: &[Complex<f32>], output: &mut [f32]) -> Result<()> {
        if input.len() != self.freq.len() {
            return Err(Error::Convolver(format!(
                "FFT synthesis expects {} bins, got {}",
                self.freq.len(),
                input.len()
            )));
        }

        self.freq.copy_from_slice(input);
        // DC and Nyquist bins of a real signal carry no imaginary part
        let last = self.freq.len() - 1;
        self.freq[0].im = 0.0;
        self.freq[last].im = 0.0;

        self.inverse
            .process_with_scratch(&mut self.freq, output, &mut self.scratch)
            .map_err(|e| Error::Convolver(format!("Inverse FFT failed: {}", e)))?;

        let scale = 1.0 / self.size as f32;
        for sample in output.iter_mut() {
            *sample *= scale;
        }

        Ok(())
    }
}
