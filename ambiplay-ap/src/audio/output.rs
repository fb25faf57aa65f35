//! Audio output backends
//!
//! [`AudioBackend`] is the seam between the device manager and the platform
//! audio API. The manager asks a backend to open a stream for a desired
//! config; the backend either opens it (possibly with a different config)
//! or rejects it with a suggestion the manager can negotiate towards.
//!
//! [`CpalBackend`] is the real backend. Its stream callback converts between
//! the device's native sample type and the byte buffers the render chain
//! works on.

use crate::audio::manager::RenderCallback;
use crate::error::{Error, Result};
use ambiplay_common::{AudioConfig, AudioFormat};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SizedSample, Stream, StreamConfig, SupportedStreamConfigRange};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Largest device buffer rendered in one pass; bigger buffers are split
pub const MAX_CALLBACK_FRAMES: usize = 4096;

/// Result of asking a backend to open a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendOpen {
    /// Stream is open with this config (not necessarily the one requested)
    Opened(AudioConfig),
    /// Stream not opened; carries the backend's suggestion, or an invalid
    /// config if it has none
    Rejected(AudioConfig),
}

/// Platform audio output strategy.
///
/// Streams are opened paused; `pause(false)` starts the callback.
pub trait AudioBackend {
    fn name(&self) -> &str;

    fn open(&mut self, desired: &AudioConfig, callback: RenderCallback) -> BackendOpen;

    fn close(&mut self);

    fn pause(&mut self, paused: bool);
}

/// Device sample type the byte buffers are converted into
trait DeviceSample: SizedSample + Send + 'static {
    fn from_ne(bytes: &[u8]) -> Self;
}

impl DeviceSample for u8 {
    fn from_ne(bytes: &[u8]) -> Self {
        bytes[0]
    }
}

impl DeviceSample for i16 {
    fn from_ne(bytes: &[u8]) -> Self {
        i16::from_ne_bytes([bytes[0], bytes[1]])
    }
}

impl DeviceSample for i32 {
    fn from_ne(bytes: &[u8]) -> Self {
        i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

impl DeviceSample for f32 {
    fn from_ne(bytes: &[u8]) -> Self {
        f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

fn to_sample_format(format: AudioFormat) -> Option<SampleFormat> {
    match format {
        AudioFormat::U8 => Some(SampleFormat::U8),
        AudioFormat::S16 => Some(SampleFormat::I16),
        AudioFormat::S32 => Some(SampleFormat::I32),
        AudioFormat::F32 => Some(SampleFormat::F32),
        AudioFormat::Unknown => None,
    }
}

fn from_sample_format(format: SampleFormat) -> AudioFormat {
    match format {
        SampleFormat::U8 => AudioFormat::U8,
        SampleFormat::I16 => AudioFormat::S16,
        SampleFormat::I32 => AudioFormat::S32,
        SampleFormat::F32 => AudioFormat::F32,
        _ => AudioFormat::Unknown,
    }
}

/// Output backend on the default cpal host.
pub struct CpalBackend {
    device: Device,
    device_name: String,
    stream: Option<Stream>,
    /// Set by the stream error callback
    error_flag: Arc<AtomicBool>,
    error_count: Arc<AtomicU32>,
}

impl CpalBackend {
    /// Names of the available output devices
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Select an output device by name, falling back to the default device.
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();

        let requested = match device_name {
            Some(name) => {
                let mut devices = host
                    .output_devices()
                    .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;
                let found = devices.find(|d| d.name().ok().as_deref() == Some(name));
                if found.is_none() {
                    warn!("Requested device '{}' not found, falling back to default device", name);
                }
                found
            }
            None => None,
        };

        let device = match requested {
            Some(device) => device,
            None => host
                .default_output_device()
                .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?,
        };

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using audio device: {}", device_name);

        Ok(Self {
            device,
            device_name,
            stream: None,
            error_flag: Arc::new(AtomicBool::new(false)),
            error_count: Arc::new(AtomicU32::new(0)),
        })
    }

    /// Whether the stream reported an error since the last open
    pub fn has_error(&self) -> bool {
        self.error_flag.load(Ordering::SeqCst)
    }

    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::SeqCst)
    }

    /// Find a device config matching `desired`, or a suggestion if there is none.
    fn find_config(&self, desired: &AudioConfig) -> std::result::Result<StreamConfig, AudioConfig> {
        let ranges: Vec<SupportedStreamConfigRange> = match self.device.supported_output_configs() {
            Ok(ranges) => ranges.collect(),
            Err(e) => {
                warn!("Failed to get device configs: {}", e);
                return Err(AudioConfig::default());
            }
        };

        let wanted = to_sample_format(desired.format);
        let exact = ranges.iter().find(|range| {
            Some(range.sample_format()) == wanted
                && range.channels() == desired.channels
                && range.min_sample_rate().0 <= desired.sample_rate
                && range.max_sample_rate().0 >= desired.sample_rate
        });

        if let Some(range) = exact {
            return Ok(range
                .clone()
                .with_sample_rate(cpal::SampleRate(desired.sample_rate))
                .config());
        }

        Err(self.suggest(desired, &ranges))
    }

    /// Closest usable config: the device default if we can render it,
    /// otherwise the first supported range clamped to the desired rate.
    fn suggest(&self, desired: &AudioConfig, ranges: &[SupportedStreamConfigRange]) -> AudioConfig {
        if let Ok(default) = self.device.default_output_config() {
            let config = AudioConfig::new(
                from_sample_format(default.sample_format()),
                default.sample_rate().0,
                default.channels(),
            );
            if config.is_valid() {
                return config;
            }
        }

        ranges
            .iter()
            .find(|range| from_sample_format(range.sample_format()) != AudioFormat::Unknown)
            .map(|range| {
                let rate = desired
                    .sample_rate
                    .clamp(range.min_sample_rate().0, range.max_sample_rate().0);
                AudioConfig::new(from_sample_format(range.sample_format()), rate, range.channels())
            })
            .unwrap_or_default()
    }

    fn build_stream<T: DeviceSample>(
        &self,
        config: &StreamConfig,
        frame_size: usize,
        callback: RenderCallback,
    ) -> Result<Stream> {
        let sample_size = std::mem::size_of::<T>();
        let chunk_samples = MAX_CALLBACK_FRAMES * config.channels as usize;
        let mut scratch = vec![0u8; MAX_CALLBACK_FRAMES * frame_size];
        let error_flag = Arc::clone(&self.error_flag);
        let error_count = Arc::clone(&self.error_count);

        self.device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    for chunk in data.chunks_mut(chunk_samples) {
                        let bytes = &mut scratch[..chunk.len() * sample_size];
                        callback.render(bytes);
                        for (out, sample) in chunk.iter_mut().zip(bytes.chunks_exact(sample_size)) {
                            *out = T::from_ne(sample);
                        }
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    error_flag.store(true, Ordering::SeqCst);
                    error_count.fetch_add(1, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
    }

    fn start_stream(&mut self, desired: &AudioConfig, config: StreamConfig, callback: RenderCallback) -> Result<AudioConfig> {
        let obtained = AudioConfig::new(desired.format, config.sample_rate.0, config.channels);
        let frame_size = obtained.bytes_per_frame();

        let stream = match desired.format {
            AudioFormat::U8 => self.build_stream::<u8>(&config, frame_size, callback)?,
            AudioFormat::S16 => self.build_stream::<i16>(&config, frame_size, callback)?,
            AudioFormat::S32 => self.build_stream::<i32>(&config, frame_size, callback)?,
            AudioFormat::F32 => self.build_stream::<f32>(&config, frame_size, callback)?,
            AudioFormat::Unknown => {
                return Err(Error::AudioOutput("Unknown sample format".to_string()));
            }
        };

        // Some hosts start streams immediately
        if let Err(e) = stream.pause() {
            debug!("Stream cannot start paused: {}", e);
        }

        self.error_flag.store(false, Ordering::SeqCst);
        self.error_count.store(0, Ordering::SeqCst);
        self.stream = Some(stream);
        Ok(obtained)
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &str {
        &self.device_name
    }

    fn open(&mut self, desired: &AudioConfig, callback: RenderCallback) -> BackendOpen {
        self.close();

        let config = match self.find_config(desired) {
            Ok(config) => config,
            Err(suggestion) => {
                debug!("{} does not support {}, suggesting {}", self.device_name, desired, suggestion);
                return BackendOpen::Rejected(suggestion);
            }
        };

        match self.start_stream(desired, config, callback) {
            Ok(obtained) => {
                info!("Opened {} with {}", self.device_name, obtained);
                BackendOpen::Opened(obtained)
            }
            Err(e) => {
                warn!("Failed to open {} with {}: {}", self.device_name, desired, e);
                BackendOpen::Rejected(AudioConfig::default())
            }
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                debug!("Failed to pause stream on close: {}", e);
            }
            info!("Closed audio stream on {}", self.device_name);
        }
    }

    fn pause(&mut self, paused: bool) {
        let Some(stream) = self.stream.as_ref() else {
            return;
        };

        let result = if paused {
            stream.pause().map_err(|e| format!("Failed to pause stream: {}", e))
        } else {
            stream.play().map_err(|e| format!("Failed to start stream: {}", e))
        };
        if let Err(e) = result {
            error!("{}", e);
            self.error_flag.store(true, Ordering::SeqCst);
        }
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        self.close();
    }
}
