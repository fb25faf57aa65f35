//! Signal processing primitives

pub mod convolver;
pub mod fft;

pub use convolver::FftConvolver;
pub use fft::RealFft;
