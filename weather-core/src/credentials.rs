use std::fmt;

use crate::{config::Config, error::WeatherError};

/// Environment variable holding the provider API key.
pub const API_KEY_ENV: &str = "OPENWEATHER_API_KEY";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Explicit,
    Environment,
    ConfigFile,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CredentialSource::Explicit => "--api-key",
            CredentialSource::Environment => API_KEY_ENV,
            CredentialSource::ConfigFile => "the config file",
        })
    }
}

/// A resolved API key. `Debug` never prints the key itself.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    api_key: String,
    source: CredentialSource,
}

impl Credentials {
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

/// Non-explicit places an API key may come from.
///
/// Built once by the caller and handed to the service, so resolution never
/// reads process state on its own.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialResolver {
    pub env_value: Option<String>,
    pub config_value: Option<String>,
}

impl CredentialResolver {
    pub fn new(env_value: Option<String>, config_value: Option<String>) -> Self {
        Self { env_value, config_value }
    }

    /// Snapshot `OPENWEATHER_API_KEY` and the config file's `api_key`.
    pub fn from_env(config: &Config) -> Self {
        Self::new(std::env::var(API_KEY_ENV).ok(), config.api_key.clone())
    }

    /// Explicit argument wins over the environment, which wins over the
    /// config file. Blank values count as absent.
    pub fn resolve(&self, explicit: Option<&str>) -> Result<Credentials, WeatherError> {
        let candidates = [
            (explicit, CredentialSource::Explicit),
            (self.env_value.as_deref(), CredentialSource::Environment),
            (self.config_value.as_deref(), CredentialSource::ConfigFile),
        ];

        let (api_key, source) = candidates
            .into_iter()
            .find_map(|(value, source)| {
                value.map(str::trim).filter(|v| !v.is_empty()).map(|v| (v, source))
            })
            .ok_or(WeatherError::MissingCredential)?;

        if api_key.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(WeatherError::InvalidCredential(source));
        }

        Ok(Credentials { api_key: api_key.to_string(), source })
    }
}

impl fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("env_value", &self.env_value.as_ref().map(|_| "<redacted>"))
            .field("config_value", &self.config_value.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
