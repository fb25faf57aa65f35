//! Audio device manager
//!
//! Owns the one active device configuration and reconfigures the device
//! without racing the real-time callback.
//!
//! **Concurrency contract:**
//! - The audio thread only ever calls [`RenderCallback::render`]. It reads the
//!   paused flag and `try_lock`s the render state; if either says no, it
//!   writes silence. It never blocks and never allocates.
//! - The control thread calls everything else. Before changing the render
//!   state it pauses or closes the backend, so the lock is uncontended in
//!   practice.
//! - Every reconfiguration bumps a generation counter visible in [`RenderStats`].

use crate::audio::decode::DecodePipeline;
use crate::audio::output::{AudioBackend, BackendOpen};
use crate::audio::sample::fill_silence;
use crate::error::{Error, Result};
use ambiplay_common::{AudioConfig, AudioFormat};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

/// Upper bound on backend suggestions followed by one `open_audio` call
pub const MAX_NEGOTIATION_STEPS: usize = 8;

/// Fills one device buffer in the active config's format.
///
/// Must write the whole buffer.
pub type RenderFn = Box<dyn FnMut(&mut [u8], &AudioConfig, &mut DecodePipeline) + Send>;

/// Device lifecycle as seen by the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Closed,
    Paused,
    Running,
}

/// Result of [`AudioDeviceManager::open_audio`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOutcome {
    pub accepted: bool,
    /// Config the device is running with (invalid if the manager is disabled)
    pub config: AudioConfig,
}

/// Callback counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub callbacks: u64,
    pub silent_callbacks: u64,
    pub generation: u64,
}

struct RenderState {
    render_fn: Option<RenderFn>,
    pipeline: DecodePipeline,
    config: AudioConfig,
}

struct Shared {
    state: Mutex<RenderState>,
    paused: AtomicBool,
    generation: AtomicU64,
    callbacks: AtomicU64,
    silent_callbacks: AtomicU64,
}

/// Handle the backend's audio thread renders through.
#[derive(Clone)]
pub struct RenderCallback {
    shared: Arc<Shared>,
}

impl RenderCallback {
    /// Fill `buffer` with the next block of output.
    pub fn render(&self, buffer: &mut [u8]) {
        let shared = &self.shared;
        shared.callbacks.fetch_add(1, Ordering::Relaxed);

        let mut silence = AudioFormat::Unknown;
        if let Ok(mut guard) = shared.state.try_lock() {
            let state = &mut *guard;
            silence = state.config.format;

            if !shared.paused.load(Ordering::Acquire) && state.config.is_valid() {
                if let Some(render_fn) = state.render_fn.as_mut() {
                    render_fn(buffer, &state.config, &mut state.pipeline);
                    return;
                }
            }
        }

        shared.silent_callbacks.fetch_add(1, Ordering::Relaxed);
        fill_silence(silence, buffer);
    }
}

/// Manages the output device on behalf of the render chain.
pub struct AudioDeviceManager {
    backend: Box<dyn AudioBackend>,
    callback: RenderCallback,
    state: DeviceState,
    active: AudioConfig,
    default_config: AudioConfig,
}

impl AudioDeviceManager {
    pub fn new(backend: Box<dyn AudioBackend>) -> Self {
        Self::with_pipeline(backend, DecodePipeline::new())
    }

    pub fn with_pipeline(backend: Box<dyn AudioBackend>, pipeline: DecodePipeline) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(RenderState {
                render_fn: None,
                pipeline,
                config: AudioConfig::default(),
            }),
            paused: AtomicBool::new(true),
            generation: AtomicU64::new(0),
            callbacks: AtomicU64::new(0),
            silent_callbacks: AtomicU64::new(0),
        });

        Self {
            backend,
            callback: RenderCallback { shared },
            state: DeviceState::Closed,
            active: AudioConfig::default(),
            default_config: AudioConfig::default(),
        }
    }

    fn render_state(&self) -> MutexGuard<'_, RenderState> {
        self.callback
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish `config` to the audio thread and bump the generation
    fn set_active(&mut self, config: AudioConfig) {
        self.active = config;
        self.render_state().config = config;
        self.callback.shared.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Open the first candidate the backend accepts.
    ///
    /// That config becomes both the active and the fallback config. The
    /// device is left paused; call [`resume`](Self::resume) to start rendering.
    pub fn init_audio(&mut self, render_fn: RenderFn, candidates: &[AudioConfig]) -> Result<AudioConfig> {
        self.close_audio();
        {
            let mut state = self.render_state();
            state.render_fn = Some(render_fn);
            state.pipeline.reset();
        }

        for candidate in candidates {
            match self.backend.open(candidate, self.callback.clone()) {
                BackendOpen::Opened(obtained) if obtained.is_valid() => {
                    self.backend.pause(true);
                    self.state = DeviceState::Paused;
                    self.default_config = obtained;
                    self.set_active(obtained);
                    info!("Audio device {} initialized: {}", self.backend.name(), obtained);
                    return Ok(obtained);
                }
                BackendOpen::Opened(obtained) => {
                    warn!("{} opened with unusable config {}", self.backend.name(), obtained);
                    self.backend.close();
                }
                BackendOpen::Rejected(_) => {
                    debug!("{} rejected candidate {}", self.backend.name(), candidate);
                }
            }
        }

        self.default_config = AudioConfig::default();
        self.set_active(AudioConfig::default());
        error!(
            "No audio config accepted by {} ({} candidates)",
            self.backend.name(),
            candidates.len()
        );
        Err(Error::AudioOutput(format!(
            "{} accepted none of {} candidate configs",
            self.backend.name(),
            candidates.len()
        )))
    }

    /// Reconfigure the device for `desired`.
    ///
    /// With `compatible`, the backend's alternative configs are acceptable
    /// and its suggestions are followed. If nothing opens, the remembered
    /// default config is reopened; if that fails too, the manager is disabled.
    pub fn open_audio(&mut self, desired: &AudioConfig, compatible: bool) -> OpenOutcome {
        if self.state != DeviceState::Closed && *desired == self.active {
            return OpenOutcome {
                accepted: true,
                config: self.active,
            };
        }

        let was_running = self.state == DeviceState::Running;
        self.pause();
        self.close_audio();

        let mut obtained = self.negotiate(desired, compatible);

        if obtained.is_none() && self.default_config.is_valid() {
            warn!(
                "Could not open {}, falling back to {}",
                desired, self.default_config
            );
            let fallback = self.default_config;
            obtained = match self.backend.open(&fallback, self.callback.clone()) {
                BackendOpen::Opened(config) if config.is_valid() => Some(config),
                BackendOpen::Opened(_) => {
                    self.backend.close();
                    None
                }
                BackendOpen::Rejected(_) => None,
            };
        }

        match obtained {
            Some(config) => {
                self.backend.pause(true);
                self.state = DeviceState::Paused;
                self.set_active(config);
                info!("Audio device {} now {}", self.backend.name(), config);
                if was_running {
                    if let Err(e) = self.resume() {
                        warn!("Failed to resume after reconfiguration: {}", e);
                    }
                }
            }
            None => {
                self.state = DeviceState::Closed;
                self.set_active(AudioConfig::default());
                error!("Audio device {} disabled: no usable config", self.backend.name());
            }
        }

        OpenOutcome {
            accepted: self.active == *desired || (compatible && self.active.is_valid()),
            config: self.active,
        }
    }

    /// Try `desired`, then follow backend suggestions while `compatible`.
    fn negotiate(&mut self, desired: &AudioConfig, compatible: bool) -> Option<AudioConfig> {
        let mut tried = Vec::with_capacity(MAX_NEGOTIATION_STEPS);
        let mut attempt = *desired;

        for step in 1..=MAX_NEGOTIATION_STEPS {
            tried.push(attempt);
            debug!("Negotiation step {}: trying {}", step, attempt);

            match self.backend.open(&attempt, self.callback.clone()) {
                BackendOpen::Opened(obtained) => {
                    if obtained.is_valid() && (obtained == attempt || compatible) {
                        return Some(obtained);
                    }
                    debug!("Backend opened {} instead of {}, not acceptable", obtained, attempt);
                    self.backend.close();
                    return None;
                }
                BackendOpen::Rejected(suggested) => {
                    if compatible && suggested.is_valid() && !tried.contains(&suggested) {
                        debug!("Backend suggests {}", suggested);
                        attempt = suggested;
                    } else {
                        return None;
                    }
                }
            }
        }

        warn!("Gave up negotiating {} after {} steps", desired, MAX_NEGOTIATION_STEPS);
        None
    }

    /// Close the device; idempotent
    pub fn close_audio(&mut self) {
        self.callback.shared.paused.store(true, Ordering::Release);
        if self.state != DeviceState::Closed {
            self.backend.close();
            self.state = DeviceState::Closed;
            self.callback.shared.generation.fetch_add(1, Ordering::AcqRel);
            debug!("Audio device {} closed", self.backend.name());
        }
    }

    /// Stop rendering; does nothing unless running
    pub fn pause(&mut self) {
        if self.state == DeviceState::Running {
            self.callback.shared.paused.store(true, Ordering::Release);
            self.backend.pause(true);
            self.state = DeviceState::Paused;
        }
    }

    /// Start rendering from clean convolver state.
    pub fn resume(&mut self) -> Result<()> {
        match self.state {
            DeviceState::Closed => {
                Err(Error::InvalidState("Cannot resume a closed audio device".to_string()))
            }
            DeviceState::Running => Ok(()),
            DeviceState::Paused => {
                self.render_state().pipeline.reset();
                self.callback.shared.paused.store(false, Ordering::Release);
                self.backend.pause(false);
                self.state = DeviceState::Running;
                Ok(())
            }
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Active config; invalid while disabled
    pub fn current_config(&self) -> AudioConfig {
        self.active
    }

    /// Fallback config remembered by `init_audio`
    pub fn default_config(&self) -> AudioConfig {
        self.default_config
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Run `f` on the decode pipeline under the render-state lock.
    pub fn configure_pipeline<R>(&self, f: impl FnOnce(&mut DecodePipeline) -> R) -> R {
        let result = f(&mut self.render_state().pipeline);
        self.callback.shared.generation.fetch_add(1, Ordering::AcqRel);
        result
    }

    pub fn render_callback(&self) -> RenderCallback {
        self.callback.clone()
    }

    pub fn stats(&self) -> RenderStats {
        let shared = &self.callback.shared;
        RenderStats {
            callbacks: shared.callbacks.load(Ordering::Relaxed),
            silent_callbacks: shared.silent_callbacks.load(Ordering::Relaxed),
            generation: shared.generation.load(Ordering::Acquire),
        }
    }
}

impl Drop for AudioDeviceManager {
    fn drop(&mut self) {
        self.close_audio();
    }
}
