//! Core library for the `weather` CLI.
//!
//! This crate defines the whole request/response pipeline:
//! - Credential resolution (explicit flag, environment, config file)
//! - A TTL response cache, optionally backed by a file
//! - Request construction and a retrying provider client
//! - Payload validation into a normalized [`WeatherReport`]
//! - [`WeatherService`], which ties the steps together
//!
//! It is used by `weather-cli`, but can also be reused by other binaries or services.

pub mod cache;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod model;
pub mod parser;
pub mod request;
pub mod service;

pub use cache::{CacheEntry, CacheKey, CacheSettings, Clock, ResponseCache, SystemClock};
pub use client::{ClientSettings, RawPayload, Transport, WeatherClient};
pub use config::Config;
pub use credentials::{API_KEY_ENV, CredentialResolver, CredentialSource, Credentials};
pub use error::{ErrorKind, WeatherError};
pub use model::{FetchedReport, Location, ReportOrigin, UnitSystem, WeatherReport};
pub use parser::ResponseParser;
pub use request::{ProviderRequest, WeatherRequestBuilder};
pub use service::{FetchOptions, ServiceSettings, WeatherService};
