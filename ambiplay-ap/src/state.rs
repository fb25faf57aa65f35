//! Application context
//!
//! Owns the device manager and the configuration it was built from. There
//! is one per process, created by `main` and passed down explicitly.

use crate::audio::{
    AudioBackend, AudioDeviceManager, ClipRenderer, DecodePipeline, HrtfBank, HrtfTarget,
};
use crate::error::{Error, Result};
use ambiplay_common::config::TomlConfig;
use ambiplay_common::{AudioConfig, Technique};
use tracing::{info, warn};

/// Configuration plus the device manager built from it
pub struct AppContext {
    config: TomlConfig,
    manager: AudioDeviceManager,
}

impl AppContext {
    /// Build the decode pipeline from the configured HRTF banks and hand it
    /// to a manager driving `backend`.
    pub fn new(config: TomlConfig, backend: Box<dyn AudioBackend>) -> Result<Self> {
        config.validate()?;
        let pipeline = Self::build_pipeline(&config)?;
        let manager = AudioDeviceManager::with_pipeline(backend, pipeline);
        Ok(Self { config, manager })
    }

    /// Pipeline with every HRTF bank named in `config` installed.
    pub fn build_pipeline(config: &TomlConfig) -> Result<DecodePipeline> {
        let mut pipeline = DecodePipeline::new();
        let banks = [
            (HrtfTarget::Surround, &config.audio.surround_hrtf),
            (HrtfTarget::Ambisonic, &config.audio.ambisonic_hrtf),
            (HrtfTarget::Tbe, &config.audio.tbe_hrtf),
        ];

        for (target, path) in banks {
            if let Some(path) = path {
                let bank = HrtfBank::load(path)?;
                pipeline.set_hrtf(target, &bank)?;
            }
        }
        Ok(pipeline)
    }

    pub fn config(&self) -> &TomlConfig {
        &self.config
    }

    pub fn manager(&self) -> &AudioDeviceManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut AudioDeviceManager {
        &mut self.manager
    }

    /// Open the device for `clip` and start rendering it.
    ///
    /// Ambisonic clips are decoded to stereo at their own rate, so the
    /// device is renegotiated towards that when the first candidate differs.
    pub fn play(&mut self, clip: ClipRenderer) -> Result<AudioConfig> {
        let desc = *clip.desc();
        let candidates = self.config.audio.candidates.clone();
        let mut config = self.manager.init_audio(clip.into_render_fn(), &candidates)?;

        let channels = if desc.technique != Technique::Default || matches!(desc.num_channels, 6 | 8) {
            2
        } else {
            desc.num_channels
        };
        let wanted = AudioConfig::new(config.format, desc.sample_rate, channels);
        if wanted != config {
            let outcome = self.manager.open_audio(&wanted, true);
            if !outcome.accepted {
                warn!("Device did not accept {}, playing with {}", wanted, outcome.config);
            }
            config = outcome.config;
        }

        if !config.is_valid() {
            return Err(Error::AudioOutput("Audio device disabled".to_string()));
        }

        self.manager.resume()?;
        info!("Playing {} {} on {}", desc.technique, desc.config(), config);
        Ok(config)
    }

    pub fn stop(&mut self) {
        self.manager.close_audio();
    }
}
