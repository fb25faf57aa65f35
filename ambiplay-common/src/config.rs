//! Configuration loading and config file resolution
//!
//! Bootstrap configuration comes from a TOML file located with the
//! following priority order:
//! 1. Command-line argument (highest priority)
//! 2. `AMBIPLAY_CONFIG` environment variable
//! 3. Platform config directory (`<config_dir>/ambiplay/config.toml`)
//! 4. Built-in defaults (fallback)
//!
//! A missing file is not an error: a warning is logged and the built-in
//! defaults are used. A file that exists but does not parse is an error.

use crate::audio::{AudioConfig, AudioFormat};
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "AMBIPLAY_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct TomlConfig {
    /// Device and rendering configuration
    #[serde(default)]
    pub audio: AudioSection,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[audio]` table
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AudioSection {
    /// Device configs tried in order when the output device is opened
    #[serde(default = "default_candidates")]
    pub candidates: Vec<AudioConfig>,

    /// HRTF bank (WAV, stereo pair per surround slot) for 5.1/7.1 sources
    #[serde(default)]
    pub surround_hrtf: Option<PathBuf>,

    /// HRTF bank (WAV, stereo pair per ACN channel) for AmbiX/FuMa sources
    #[serde(default)]
    pub ambisonic_hrtf: Option<PathBuf>,

    /// HRTF bank (WAV, stereo pair per TBE channel)
    #[serde(default)]
    pub tbe_hrtf: Option<PathBuf>,

    /// Output gain applied by the renderer
    #[serde(default = "default_gain")]
    pub gain: f32,
}

impl Default for AudioSection {
    fn default() -> Self {
        Self {
            candidates: default_candidates(),
            surround_hrtf: None,
            ambisonic_hrtf: None,
            tbe_hrtf: None,
            gain: default_gain(),
        }
    }
}

/// `[logging]` table
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_candidates() -> Vec<AudioConfig> {
    vec![
        AudioConfig::new(AudioFormat::F32, 48000, 2),
        AudioConfig::new(AudioFormat::S16, 48000, 2),
        AudioConfig::new(AudioFormat::S16, 44100, 2),
    ]
}

fn default_gain() -> f32 {
    1.0
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse and validate configuration text
    pub fn parse(text: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(text)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Reject configs the audio manager could never use
    pub fn validate(&self) -> Result<()> {
        if self.audio.candidates.is_empty() {
            return Err(Error::Config("audio.candidates must not be empty".to_string()));
        }

        if let Some(bad) = self.audio.candidates.iter().find(|c| !c.is_valid()) {
            return Err(Error::Config(format!("Invalid audio candidate: {:?}", bad)));
        }

        if !self.audio.gain.is_finite() || self.audio.gain < 0.0 {
            return Err(Error::Config(format!("Invalid gain: {}", self.audio.gain)));
        }

        Ok(())
    }
}

/// Locate the config file to use, if any
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    default_config_path().filter(|path| path.exists())
}

/// Resolve and load configuration, falling back to built-in defaults
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = resolve_config_path(cli_arg) else {
        info!("No config file found, using built-in defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        warn!(
            "Config file {} not found, using built-in defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    info!("Loading config from {}", path.display());
    TomlConfig::load(&path)
}

/// Get default configuration file path for the platform
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ambiplay").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.audio.candidates.len(), 3);
        assert_eq!(config.audio.gain, 1.0);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = TomlConfig::parse("").unwrap();
        assert_eq!(config, TomlConfig::default());
    }

    #[test]
    fn test_rejects_invalid_candidate() {
        let text = r#"
            [audio]
            candidates = [{ format = "f32", sample_rate = 0, channels = 2 }]
        "#;
        assert!(matches!(TomlConfig::parse(text), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_negative_gain() {
        let text = "[audio]\ngain = -0.5\n";
        assert!(TomlConfig::parse(text).is_err());
    }
}
