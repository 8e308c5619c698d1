use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};

use crate::{
    cache::CacheSettings,
    client::{ClientSettings, retry::RetryPolicy},
    model::UnitSystem,
};

pub const DEFAULT_ENDPOINT: &str = "https://api.openweathermap.org/data/2.5/weather";

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// api_key = "..."
/// units = "metric"
///
/// [cache]
/// ttl_secs = 600
/// serve_stale_on_error = true
///
/// [client]
/// timeout_secs = 10
/// max_retries = 2
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,

    /// Default unit system when none is given on the command line.
    pub units: Option<UnitSystem>,

    /// Provider endpoint override, mostly for testing against a local server.
    pub endpoint: Option<String>,

    pub cache: CacheConfig,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub capacity: usize,
    pub serve_stale_on_error: bool,
    /// Keep the cache in a file between runs.
    pub persist: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 600, capacity: 256, serve_stale_on_error: false, persist: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            connect_timeout_secs: 5,
            max_retries: 2,
            backoff_base_ms: 500,
            backoff_cap_ms: 4_000,
        }
    }
}

impl Config {
    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
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
        ProjectDirs::from("dev", "weather-task", "weather-cli")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Path to the durable response cache.
    pub fn cache_file_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.cache_dir().join("reports.json"))
    }

    /// Set/replace the API key, stripping surrounding whitespace.
    pub fn set_api_key(&mut self, api_key: &str) {
        let trimmed = api_key.trim();
        self.api_key = (!trimmed.is_empty()).then(|| trimmed.to_string());
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    pub fn default_units(&self) -> UnitSystem {
        self.units.unwrap_or_default()
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT)
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            ttl: Duration::from_secs(self.cache.ttl_secs),
            capacity: self.cache.capacity.max(1),
        }
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            timeout: Duration::from_secs(self.client.timeout_secs),
            connect_timeout: Duration::from_secs(self.client.connect_timeout_secs),
            retry: RetryPolicy {
                max_retries: self.client.max_retries,
                base_delay: Duration::from_millis(self.client.backoff_base_ms),
                max_delay: Duration::from_millis(self.client.backoff_cap_ms),
            },
        }
    }
}
