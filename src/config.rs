//! Client configuration
//!
//! Loaded in layers:
//! 1. Default values in code
//! 2. An optional TOML file (`krishi.toml`, or the path given on the command line)
//! 3. Environment variable overrides with the `KRISHI__` prefix

use std::path::PathBuf;

use config::{ConfigError, Environment, File};
use serde::Deserialize;

use crate::constants::{DEFAULT_BACKEND_BASE, DEFAULT_LANG, IPAPI_URL, IPWHO_URL};
use crate::models::Coordinates;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub backend: BackendConfig,
    pub geolocation: GeolocationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub speech: SpeechConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    /// Base URL serving /ask, /weather and /tts
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeolocationConfig {
    pub ipapi_url: String,
    pub ipwho_url: String,

    /// Position reported as the device fix, if this machine knows where it is
    pub device_latitude: Option<f64>,
    pub device_longitude: Option<f64>,
}

impl GeolocationConfig {
    pub fn device_position(&self) -> Option<Coordinates> {
        match (self.device_latitude, self.device_longitude) {
            (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon)),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    /// JSON file holding form state, last result and speech rate.
    /// Unset keeps everything in memory for the session.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SpeechConfig {
    /// Synthesizer for native voices, e.g. "espeak-ng"
    pub voice_command: Option<String>,

    /// Locale tags the synthesizer can speak
    pub voices: Vec<String>,

    /// Player for server audio
    pub player_command: String,

    /// Player arguments; `{file}`, `{rate}` and `{ipc}` are substituted.
    /// `{ipc}` becomes a control socket path so the rate can change mid-playback.
    pub player_args: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UiConfig {
    /// Language used when no saved form says otherwise
    pub language: String,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => File::with_name(p).required(true),
            None => File::with_name("krishi").required(false),
        };

        let config = config::Config::builder()
            .set_default("backend.base_url", DEFAULT_BACKEND_BASE)?
            .set_default("geolocation.ipapi_url", IPAPI_URL)?
            .set_default("geolocation.ipwho_url", IPWHO_URL)?
            .set_default("speech.voices", Vec::<String>::new())?
            .set_default("speech.player_command", "mpv")?
            .set_default(
                "speech.player_args",
                vec![
                    "--no-video",
                    "--really-quiet",
                    "--speed={rate}",
                    "--input-ipc-server={ipc}",
                    "{file}",
                ],
            )?
            .set_default("ui.language", DEFAULT_LANG)?
            .add_source(file)
            .add_source(
                Environment::with_prefix("KRISHI")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("speech.voices")
                    .with_list_parse_key("speech.player_args")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
