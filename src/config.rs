//! Configuration for the lookout assistant
//!
//! Settings resolve with priority env > TOML file > default. The config file
//! lives at `~/.config/lookout/config.toml` and is a partial overlay — every
//! field is optional.

use std::path::PathBuf;

use serde::Deserialize;

use crate::{Error, Result};

/// Default scene scan period in seconds
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 5;

/// Fixed speech rate for narration
pub const SPEECH_RATE: f32 = 0.9;

/// Fixed speech pitch for narration
pub const SPEECH_PITCH: f32 = 1.0;

/// Fixed speech volume for narration
pub const SPEECH_VOLUME: f32 = 0.8;

/// Resolved lookout configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the remote assistant backend
    pub backend_url: String,

    /// Seconds between continuous scene scans
    pub scan_interval_secs: u64,

    /// Speech recognition locale for voice questions
    pub locale: String,

    /// Enable voice input
    pub voice_enabled: bool,

    /// External command that writes one JPEG frame to stdout
    /// (e.g. `fswebcam --save -`); used when no still image is given
    pub capture_command: Option<String>,

    /// Path to a still JPEG to analyze instead of a live capture command
    pub still_image: Option<PathBuf>,

    /// TTS voice identifier for narration
    pub tts_voice: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8001".to_string(),
            scan_interval_secs: DEFAULT_SCAN_INTERVAL_SECS,
            locale: "en-US".to_string(),
            voice_enabled: true,
            capture_command: None,
            still_image: None,
            tts_voice: "alloy".to_string(),
        }
    }
}

/// Partial TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    backend_url: Option<String>,
    scan_interval_secs: Option<u64>,
    locale: Option<String>,
    #[serde(default)]
    voice: VoiceFileConfig,
    #[serde(default)]
    camera: CameraFileConfig,
}

/// Voice section of the config file
#[derive(Debug, Default, Deserialize)]
struct VoiceFileConfig {
    enabled: Option<bool>,
    tts_voice: Option<String>,
}

/// Camera section of the config file
#[derive(Debug, Default, Deserialize)]
struct CameraFileConfig {
    capture_command: Option<String>,
    still_image: Option<PathBuf>,
}

/// Default config file path: `~/.config/lookout/config.toml`
fn config_file_path() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".config/lookout/config.toml"),
        |d| d.config_dir().join("lookout").join("config.toml"),
    )
}

/// Load the optional TOML config file, returning defaults if absent
fn load_config_file() -> ConfigFile {
    let path = config_file_path();
    match std::fs::read_to_string(&path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(fc) => {
                tracing::debug!(path = %path.display(), "loaded config file");
                fc
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "invalid config file, using defaults");
                ConfigFile::default()
            }
        },
        Err(_) => ConfigFile::default(),
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns error if an environment override cannot be parsed
    pub fn load() -> Result<Self> {
        Self::from_sources(load_config_file())
    }

    fn from_sources(fc: ConfigFile) -> Result<Self> {
        let defaults = Self::default();

        let scan_interval_secs = match std::env::var("LOOKOUT_SCAN_INTERVAL") {
            Ok(v) => v
                .parse::<u64>()
                .map_err(|e| Error::Config(format!("invalid LOOKOUT_SCAN_INTERVAL: {e}")))?,
            Err(_) => fc
                .scan_interval_secs
                .unwrap_or(defaults.scan_interval_secs),
        };

        if scan_interval_secs == 0 {
            return Err(Error::Config(
                "scan interval must be at least one second".to_string(),
            ));
        }

        Ok(Self {
            backend_url: std::env::var("LOOKOUT_BACKEND_URL")
                .ok()
                .or(fc.backend_url)
                .unwrap_or(defaults.backend_url),
            scan_interval_secs,
            locale: std::env::var("LOOKOUT_LOCALE")
                .ok()
                .or(fc.locale)
                .unwrap_or(defaults.locale),
            voice_enabled: std::env::var("LOOKOUT_DISABLE_VOICE")
                .map(|v| v.is_empty() || v == "0")
                .unwrap_or_else(|_| fc.voice.enabled.unwrap_or(defaults.voice_enabled)),
            capture_command: std::env::var("LOOKOUT_CAPTURE_COMMAND")
                .ok()
                .or(fc.camera.capture_command),
            still_image: fc.camera.still_image,
            tts_voice: fc.voice.tts_voice.unwrap_or(defaults.tts_voice),
        })
    }
}
