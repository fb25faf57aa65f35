//! Application context tests
//!
//! Pipeline construction from config and clip playback against a scripted
//! backend.

mod helpers;

use ambiplay_ap::audio::{ClipRenderer, DeviceState, HrtfTarget, WavFile};
use ambiplay_ap::{AppContext, Error};
use ambiplay_common::config::TomlConfig;
use ambiplay_common::{AudioConfig, AudioFormat, Technique};
use helpers::{f32_values, write_hound_wav, MockBackend};
use tempfile::TempDir;

fn float(rate: u32, channels: u16) -> AudioConfig {
    AudioConfig::new(AudioFormat::F32, rate, channels)
}

fn clip(samples: Vec<i16>, channels: u16, rate: u32) -> ClipRenderer {
    let wav = WavFile::from_samples(samples, channels, rate, Technique::Default).unwrap();
    ClipRenderer::new(wav, false, 1.0).unwrap()
}

fn ambix_clip(samples: Vec<i16>, rate: u32) -> ClipRenderer {
    let wav = WavFile::from_samples(samples, 4, rate, Technique::AmbiX).unwrap();
    ClipRenderer::new(wav, false, 1.0).unwrap()
}

#[test]
fn test_play_stereo_clip_on_first_candidate() {
    let (backend, log) = MockBackend::new(&[float(48000, 2)]);
    let mut context = AppContext::new(TomlConfig::default(), Box::new(backend)).unwrap();

    let config = context.play(clip(vec![16384, -16384], 2, 48000)).unwrap();
    assert_eq!(config, float(48000, 2));
    assert_eq!(context.manager().state(), DeviceState::Running);

    let mut buffer = [0u8; 16];
    log.lock().unwrap().render(&mut buffer);
    assert_eq!(f32_values(&buffer), vec![0.5, -0.5, 0.5, -0.5]);

    context.stop();
    assert_eq!(context.manager().state(), DeviceState::Closed);
}

#[test]
fn test_ambisonic_clip_renegotiates_to_clip_rate() {
    let (backend, log) = MockBackend::new(&[float(48000, 2), float(44100, 2)]);
    let mut context = AppContext::new(TomlConfig::default(), Box::new(backend)).unwrap();

    // W only; no HRTF bank, so first-order projection
    let config = context.play(ambix_clip(vec![16384, 0, 0, 0], 44100)).unwrap();
    assert_eq!(config, float(44100, 2));

    let mut buffer = [0u8; 8];
    log.lock().unwrap().render(&mut buffer);
    assert_eq!(f32_values(&buffer), vec![0.25, 0.25]);
}

#[test]
fn test_unreachable_rate_keeps_default_config() {
    let (backend, _log) = MockBackend::new(&[float(48000, 2)]);
    let mut context = AppContext::new(TomlConfig::default(), Box::new(backend)).unwrap();

    // The device cannot run at 22050; playback continues at the default config
    let config = context.play(ambix_clip(vec![0; 4], 22050)).unwrap();
    assert_eq!(config, float(48000, 2));
    assert_eq!(context.manager().state(), DeviceState::Running);
}

#[test]
fn test_play_fails_without_device() {
    let (backend, _log) = MockBackend::new(&[]);
    let mut context = AppContext::new(TomlConfig::default(), Box::new(backend)).unwrap();

    let result = context.play(clip(vec![0, 0], 2, 48000));
    assert!(matches!(result, Err(Error::AudioOutput(_))));
}

#[test]
fn test_configured_hrtf_banks_are_installed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ambisonic.wav");
    // Four sources, two taps each
    let samples: Vec<i16> = (0..16).map(|i| i * 100).collect();
    write_hound_wav(&path, 8, 48000, &samples).unwrap();

    let mut config = TomlConfig::default();
    config.audio.ambisonic_hrtf = Some(path);

    let (backend, _log) = MockBackend::new(&[float(48000, 2)]);
    let context = AppContext::new(config, Box::new(backend)).unwrap();

    let installed = context
        .manager()
        .configure_pipeline(|pipeline| {
            (
                pipeline.has_hrtf(HrtfTarget::Ambisonic),
                pipeline.has_hrtf(HrtfTarget::Surround),
            )
        });
    assert_eq!(installed, (true, false));
}

#[test]
fn test_missing_hrtf_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let mut config = TomlConfig::default();
    config.audio.surround_hrtf = Some(dir.path().join("missing.wav"));

    let (backend, _log) = MockBackend::new(&[float(48000, 2)]);
    assert!(AppContext::new(config, Box::new(backend)).is_err());
}

#[test]
fn test_undersized_surround_bank_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("surround.wav");
    // Four pairs where eight loudspeaker slots are needed
    write_hound_wav(&path, 8, 48000, &[0; 8]).unwrap();

    let mut config = TomlConfig::default();
    config.audio.surround_hrtf = Some(path);

    let (backend, _log) = MockBackend::new(&[float(48000, 2)]);
    assert!(matches!(
        AppContext::new(config, Box::new(backend)),
        Err(Error::Convolver(_))
    ));
}

#[test]
fn test_invalid_config_rejected() {
    let mut config = TomlConfig::default();
    config.audio.candidates.clear();

    let (backend, _log) = MockBackend::new(&[float(48000, 2)]);
    assert!(matches!(
        AppContext::new(config, Box::new(backend)),
        Err(Error::Config(_))
    ));
}
