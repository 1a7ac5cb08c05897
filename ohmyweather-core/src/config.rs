use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}};

use crate::provider::openweather::DEFAULT_BASE_URL;

/// Environment variable that overrides the configured API key.
pub const API_KEY_ENV: &str = "OPENWEATHER_API_KEY";

/// Refresh cadences offered to the user, in minutes.
pub const REFRESH_INTERVALS_MINUTES: &[u64] = &[1, 2, 5, 10, 15, 30, 60];

pub const DEFAULT_REFRESH_INTERVAL_MINUTES: u64 = 15;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

fn default_refresh_interval() -> u64 {
    DEFAULT_REFRESH_INTERVAL_MINUTES
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// api_key = "..."
/// refresh_interval_minutes = 15
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// OpenWeather API key. `OPENWEATHER_API_KEY` takes precedence.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Override for the API host, e.g. a caching proxy.
    #[serde(default)]
    pub api_base_url: Option<String>,

    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_minutes: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Where tracked cities are cached. Defaults to the platform data dir.
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: None,
            refresh_interval_minutes: DEFAULT_REFRESH_INTERVAL_MINUTES,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            store_path: None,
        }
    }
}

impl Config {
    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        cfg.validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("dev", "ohmyweather", "ohmyweather")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Path to the city cache, honouring `store_path` when set.
    pub fn store_file_path(&self) -> Result<PathBuf> {
        match &self.store_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::project_dirs()?.data_dir().join("cities.json")),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !REFRESH_INTERVALS_MINUTES.contains(&self.refresh_interval_minutes) {
            return Err(anyhow!(
                "refresh_interval_minutes must be one of {:?}, got {}",
                REFRESH_INTERVALS_MINUTES,
                self.refresh_interval_minutes
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(anyhow!("request_timeout_secs must be greater than zero"));
        }
        Ok(())
    }

    /// Returns the API key, preferring the environment over the file.
    pub fn api_key(&self) -> Option<String> {
        self.api_key_with_env(std::env::var(API_KEY_ENV).ok())
    }

    fn api_key_with_env(&self, env_value: Option<String>) -> Option<String> {
        env_value
            .filter(|key| !key.trim().is_empty())
            .or_else(|| self.api_key.clone().filter(|key| !key.trim().is_empty()))
    }

    pub fn set_api_key(&mut self, api_key: String) {
        self.api_key = Some(api_key);
    }

    pub fn api_base_url(&self) -> &str {
        self.api_base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn set_refresh_interval_minutes(&mut self, minutes: u64) -> Result<()> {
        if !REFRESH_INTERVALS_MINUTES.contains(&minutes) {
            return Err(anyhow!(
                "Unsupported refresh interval {minutes} minutes. Choose one of {:?}.",
                REFRESH_INTERVALS_MINUTES
            ));
        }
        self.refresh_interval_minutes = minutes;
        Ok(())
    }

    pub fn refresh_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.refresh_interval_minutes * 60)
    }
}
