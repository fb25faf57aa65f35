//! Overlap-add convolver integration tests

use ambiplay_ap::audio::decode::CONVOLUTION_BLOCK_SIZE;
use ambiplay_ap::dsp::{FftConvolver, RealFft};
use realfft::num_complex::Complex;

fn noise(len: usize, seed: u32) -> Vec<f32> {
    // Small LCG; deterministic across runs
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0
        })
        .collect()
}

fn run(convolver: &mut FftConvolver, signal: &[f32], block: usize) -> Vec<f32> {
    let mut out = vec![0.0; signal.len()];
    for (src, dst) in signal.chunks(block).zip(out.chunks_mut(block)) {
        convolver.process(dst, src, 0).unwrap();
    }
    out
}

fn assert_close(a: &[f32], b: &[f32], tolerance: f32) {
    assert_eq!(a.len(), b.len());
    for (i, (x, y)) in a.iter().zip(b).enumerate() {
        assert!((x - y).abs() < tolerance, "sample {}: {} vs {}", i, x, y);
    }
}

#[test]
fn test_unit_impulse_reproduces_response() {
    let kernel = noise(200, 7);
    let mut convolver = FftConvolver::with_responses(256, &[&kernel]).unwrap();

    let mut impulse = vec![0.0f32; 512];
    impulse[0] = 1.0;
    let out = run(&mut convolver, &impulse, 256);

    assert_close(&out[..200], &kernel, 1e-5);
    assert!(out[200..].iter().all(|s| s.abs() < 1e-5));
}

#[test]
fn test_impulse_fidelity_at_render_block_size() {
    let block = CONVOLUTION_BLOCK_SIZE;
    let mut impulse = vec![0.0f32; 3 * block];
    impulse[block / 2] = 1.0;

    // Single tap: the FFT just covers the block and there is no tail
    let single = [0.75f32];
    let mut convolver = FftConvolver::with_responses(block, &[&single]).unwrap();
    assert!(convolver.overlap_size() < block);
    let out = run(&mut convolver, &impulse, block);
    let mut expected = vec![0.0f32; impulse.len()];
    expected[block / 2] = 0.75;
    assert_close(&out, &expected, 1e-5);

    // Full-length response: the tail is a whole block long
    let kernel = noise(block, 29);
    let mut convolver = FftConvolver::with_responses(block, &[&kernel]).unwrap();
    assert!(convolver.overlap_size() >= block);
    let out = run(&mut convolver, &impulse, block);
    let mut expected = vec![0.0f32; impulse.len()];
    expected[block / 2..block / 2 + block].copy_from_slice(&kernel);
    assert_close(&out, &expected, 1e-4);

    // One tap longer than the block cannot be processed in one pass
    assert!(FftConvolver::with_responses(block, &[&noise(block + 1, 31)]).is_err());
}

#[test]
fn test_non_power_of_two_block() {
    let kernel = [0.5f32; 10];
    let mut convolver = FftConvolver::with_responses(100, &[&kernel]).unwrap();
    assert_eq!(convolver.fft_size(), 128);

    let mut impulse = vec![0.0f32; 300];
    impulse[95] = 1.0;
    let out = run(&mut convolver, &impulse, 100);

    let mut expected = vec![0.0f32; 300];
    expected[95..105].copy_from_slice(&kernel);
    assert_close(&out, &expected, 1e-5);
}

#[test]
fn test_delayed_impulse_crosses_block_boundary() {
    let kernel = [1.0f32, 0.5, 0.25, 0.125];
    let mut convolver = FftConvolver::with_responses(8, &[&kernel]).unwrap();

    // Impulse at the last sample of the first block
    let mut signal = vec![0.0f32; 16];
    signal[7] = 1.0;
    let out = run(&mut convolver, &signal, 8);

    assert_close(&out[7..11], &kernel, 1e-5);
    assert!(out[..7].iter().all(|s| s.abs() < 1e-5));
    assert!(out[11..].iter().all(|s| s.abs() < 1e-5));
}

#[test]
fn test_linearity() {
    let kernel = noise(64, 3);
    let a = noise(400, 11);
    let b = noise(400, 13);
    let (alpha, beta) = (0.7f32, -1.3f32);
    let mixed: Vec<f32> = a.iter().zip(&b).map(|(x, y)| alpha * x + beta * y).collect();

    let mut convolver = FftConvolver::with_responses(64, &[&kernel]).unwrap();
    let out_a = run(&mut convolver, &a, 64);
    convolver.reset(None);
    let out_b = run(&mut convolver, &b, 64);
    convolver.reset(None);
    let out_mixed = run(&mut convolver, &mixed, 64);

    let expected: Vec<f32> = out_a
        .iter()
        .zip(&out_b)
        .map(|(x, y)| alpha * x + beta * y)
        .collect();
    assert_close(&out_mixed, &expected, 1e-4);
}

#[test]
fn test_block_partitioning_does_not_change_output() {
    let kernel = noise(100, 5);
    let signal = noise(1000, 17);

    let mut whole = FftConvolver::with_responses(128, &[&kernel]).unwrap();
    let reference = run(&mut whole, &signal, 128);

    // Irregular block sizes, all within the configured block size
    let mut partial = FftConvolver::with_responses(128, &[&kernel]).unwrap();
    let mut out = vec![0.0f32; signal.len()];
    let mut pos = 0;
    for size in [128usize, 1, 100, 27, 128, 64].iter().cycle() {
        if pos >= signal.len() {
            break;
        }
        let end = (pos + size).min(signal.len());
        partial.process(&mut out[pos..end], &signal[pos..end], 0).unwrap();
        pos = end;
    }

    assert_close(&out, &reference, 1e-4);
}

#[test]
fn test_oversized_block_rejected() {
    let mut convolver = FftConvolver::with_responses(16, &[&[1.0f32]]).unwrap();
    let mut dst = [0.0f32; 32];
    assert!(convolver.process(&mut dst, &[0.0; 17], 0).is_err());
    assert!(convolver.process(&mut dst[..4], &[0.0; 8], 0).is_err());
    assert!(convolver.process(&mut dst, &[0.0; 16], 1).is_err());
}

#[test]
fn test_reinitialize_replaces_state() {
    let mut convolver = FftConvolver::with_responses(8, &[&[1.0f32, 1.0, 1.0]]).unwrap();
    let mut dst = [0.0f32; 8];
    convolver.process(&mut dst, &[1.0; 8], 0).unwrap();

    convolver.initialize(4, &[&[2.0f32], &[3.0]]).unwrap();
    assert_eq!(convolver.channels(), 2);
    assert_eq!(convolver.block_size(), 4);

    let mut out = [0.0f32; 4];
    convolver.process(&mut out, &[1.0, 0.0, 0.0, 0.0], 1).unwrap();
    assert_close(&out, &[3.0, 0.0, 0.0, 0.0], 1e-5);
}

#[test]
fn test_strided_bounds_checked() {
    let mut convolver = FftConvolver::new();
    assert!(convolver.initialize_strided(8, &[0.0; 5], 2, 3, 2).is_err());
    assert!(convolver.initialize_strided(8, &[0.0; 6], 2, 3, 1).is_err());
    assert!(!convolver.is_initialized());
    assert!(convolver.initialize_strided(8, &[0.0; 6], 2, 3, 2).is_ok());
}

#[test]
fn test_real_fft_parseval() {
    let mut fft = RealFft::new(256).unwrap();
    let signal = noise(256, 23);
    let mut bins = vec![Complex::new(0.0f32, 0.0); fft.bins()];
    fft.analysis(&signal, &mut bins).unwrap();

    let time_energy: f32 = signal.iter().map(|s| s * s).sum();
    // Interior bins stand for two mirrored bins of the full spectrum
    let last = bins.len() - 1;
    let freq_energy: f32 = bins
        .iter()
        .enumerate()
        .map(|(k, c)| {
            let weight = if k == 0 || k == last { 1.0 } else { 2.0 };
            weight * c.norm_sqr()
        })
        .sum::<f32>()
        / 256.0;

    assert!((time_energy - freq_energy).abs() / time_energy < 1e-4);
}
