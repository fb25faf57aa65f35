//! Scripted audio backend
//!
//! Accepts a fixed list of configs. Anything else is either opened with a
//! substitute config or rejected with a fixed suggestion. All calls are
//! recorded in a shared [`MockLog`] the test keeps after the backend is
//! moved into the manager.

use ambiplay_ap::audio::{AudioBackend, BackendOpen, RenderCallback};
use ambiplay_common::AudioConfig;
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct MockLog {
    pub opens: Vec<AudioConfig>,
    pub closes: usize,
    pub pauses: Vec<bool>,
    pub is_open: bool,
    pub paused: bool,
    pub callback: Option<RenderCallback>,
}

impl MockLog {
    /// Render one buffer through the callback the manager handed over
    pub fn render(&self, buffer: &mut [u8]) {
        self.callback
            .as_ref()
            .expect("backend was never opened")
            .render(buffer);
    }
}

pub struct MockBackend {
    supported: Vec<AudioConfig>,
    suggestion: AudioConfig,
    substitute: Option<AudioConfig>,
    log: Arc<Mutex<MockLog>>,
}

impl MockBackend {
    pub fn new(supported: &[AudioConfig]) -> (Self, Arc<Mutex<MockLog>>) {
        let log = Arc::new(Mutex::new(MockLog::default()));
        let backend = Self {
            supported: supported.to_vec(),
            suggestion: AudioConfig::default(),
            substitute: None,
            log: Arc::clone(&log),
        };
        (backend, log)
    }

    /// Suggest `config` whenever a request is rejected
    pub fn with_suggestion(mut self, config: AudioConfig) -> Self {
        self.suggestion = config;
        self
    }

    /// Open unsupported requests with `config` instead of rejecting them
    pub fn with_substitute(mut self, config: AudioConfig) -> Self {
        self.substitute = Some(config);
        self
    }
}

impl AudioBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn open(&mut self, desired: &AudioConfig, callback: RenderCallback) -> BackendOpen {
        let mut log = self.log.lock().unwrap();
        log.opens.push(*desired);

        let obtained = if self.supported.contains(desired) {
            *desired
        } else if let Some(substitute) = self.substitute {
            substitute
        } else {
            return BackendOpen::Rejected(self.suggestion);
        };

        log.is_open = true;
        log.paused = true;
        log.callback = Some(callback);
        BackendOpen::Opened(obtained)
    }

    fn close(&mut self) {
        let mut log = self.log.lock().unwrap();
        log.closes += 1;
        log.is_open = false;
    }

    fn pause(&mut self, paused: bool) {
        let mut log = self.log.lock().unwrap();
        log.pauses.push(paused);
        log.paused = paused;
    }
}
