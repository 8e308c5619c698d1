use std::{fmt, time::Duration};

use thiserror::Error;

use crate::credentials::CredentialSource;

/// Every failure the fetch pipeline can surface.
///
/// Each variant is a classified failure; callers decide how to present it
/// through [`WeatherError::kind`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WeatherError {
    #[error(
        "No API key found.\n\
         Hint: pass --api-key, set OPENWEATHER_API_KEY, or run `weather configure`."
    )]
    MissingCredential,

    #[error("API key from {0} contains whitespace or control characters")]
    InvalidCredential(CredentialSource),

    #[error("Invalid location: {0}")]
    InvalidLocation(LocationError),

    #[error("Network error: {0}")]
    Network(NetworkFailure),

    #[error("Provider rejected the API key (HTTP {status}). Please check your configuration.")]
    Auth { status: u16 },

    #[error("Provider rate limit exceeded. Please try again later.")]
    RateLimited { retry_after: Option<Duration> },

    #[error("{0}")]
    Provider(ProviderFailure),

    #[error("Malformed response: field `{field}` {reason}")]
    MalformedResponse { field: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("location must not be empty")]
    Empty,
    #[error("location is {len} characters long, the limit is {max}")]
    TooLong { len: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkFailure {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection failed: {0}")]
    Connection(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderFailure {
    #[error("Location '{0}' not found.")]
    LocationNotFound(String),
    #[error("Provider is unavailable (HTTP {status}).")]
    UpstreamUnavailable { status: u16 },
    #[error("Provider rejected the request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Coarse grouping of errors, for what the user should do about them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Fix your key or configuration.
    Configuration,
    /// Fix the location you typed.
    Input,
    /// Try again later.
    Transient,
    /// The location does not exist.
    NotFound,
    /// The provider sent something we could not use.
    Data,
}

impl WeatherError {
    pub(crate) fn malformed(field: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::MalformedResponse { field: field.into(), reason: reason.to_string() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingCredential | Self::InvalidCredential(_) | Self::Auth { .. } => {
                ErrorKind::Configuration
            }
            Self::InvalidLocation(_) => ErrorKind::Input,
            Self::Network(_)
            | Self::RateLimited { .. }
            | Self::Provider(ProviderFailure::UpstreamUnavailable { .. }) => ErrorKind::Transient,
            Self::Provider(ProviderFailure::LocationNotFound(_)) => ErrorKind::NotFound,
            Self::Provider(ProviderFailure::Rejected { .. }) | Self::MalformedResponse { .. } => {
                ErrorKind::Data
            }
        }
    }

    /// Whether repeating the same request may succeed.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}
