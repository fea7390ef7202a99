use std::{
    fs::File,
    io::{Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    error::SettingsError,
    llmclients::{
        ModelChoice, RequestOptions,
        gemini::{DEFAULT_API_KEY_ENV, DEFAULT_ENDPOINT},
    },
    templates::DEFAULT_HIGHLIGHT_COLOR,
};

#[cfg(debug_assertions)]
const BASE_CONFIG_FILE: &str = ".notekeeper_debug.toml";
#[cfg(not(debug_assertions))]
const BASE_CONFIG_FILE: &str = ".notekeeper.toml";

const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NoteKeeperSettings {
    #[serde(default)]
    pub model: ModelChoice,
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    /// Name of the variable holding the API key, the key itself never
    /// touches the settings file
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_keyword_color")]
    pub keyword_color: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_keyword_color() -> String {
    DEFAULT_HIGHLIGHT_COLOR.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NoteKeeperSettings {
    fn default() -> Self {
        Self {
            model: ModelChoice::default(),
            request_timeout_secs: default_timeout(),
            api_key_env: default_api_key_env(),
            endpoint: default_endpoint(),
            keyword_color: default_keyword_color(),
            log_level: default_log_level(),
        }
    }
}

impl NoteKeeperSettings {
    pub fn get_config_file_path() -> Result<PathBuf, SettingsError> {
        dirs::home_dir()
            .map(|directory| directory.join(BASE_CONFIG_FILE))
            .ok_or(SettingsError::NoHomeDir)
    }

    pub fn load_from_disk() -> Result<Self, SettingsError> {
        Self::load_from(Self::get_config_file_path()?)
    }

    pub fn save_to_disk(&self) -> Result<(), SettingsError> {
        self.save_to(Self::get_config_file_path()?)
    }

    /// Loads the settings at `path`, writing the defaults there first if the
    /// file doesn't exist yet
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No settings at {}, creating defaults", path.display());
            let default_settings = Self::default();
            default_settings.save_to(path)?;
            Ok(default_settings)
        } else {
            let mut settings_file = File::open(path)?;

            let mut toml = String::new();
            settings_file.read_to_string(&mut toml)?;

            let settings = toml::from_str(toml.as_ref())?;
            Ok(settings)
        }
    }

    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), SettingsError> {
        debug!("Saving settings to {}", path.as_ref().display());
        let mut file = File::create(path)?;
        let toml = toml::to_string(&self)?;
        file.write_all(toml.as_bytes())?;
        Ok(())
    }

    pub fn request_options(&self) -> RequestOptions {
        RequestOptions {
            model: self.model,
            timeout: self.request_timeout(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        // A zero timeout would fail every request
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}
