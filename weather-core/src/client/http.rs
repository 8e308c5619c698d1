use async_trait::async_trait;
use reqwest::{Client, StatusCode, header::RETRY_AFTER};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{ClientSettings, RawPayload, Transport};
use crate::{
    error::{NetworkFailure, ProviderFailure, WeatherError},
    request::ProviderRequest,
};

const MAX_MESSAGE_LEN: usize = 200;

/// Single-attempt transport over reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(settings: &ClientSettings) -> Result<Self, WeatherError> {
        let http = Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|e| connection_error(e, settings.timeout))?;

        Ok(Self { http, timeout: settings.timeout })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ProviderRequest) -> Result<RawPayload, WeatherError> {
        debug!(
            endpoint = %request.endpoint,
            location = %request.location,
            units = %request.units,
            "Calling provider"
        );

        let res = self
            .http
            .get(request.endpoint.clone())
            .query(&request.query())
            .send()
            .await
            .map_err(|e| connection_error(e, self.timeout))?;

        let status = res.status();
        let retry_after = res
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);

        let body = res.text().await.map_err(|e| connection_error(e, self.timeout))?;

        if status.is_success() {
            return Ok(RawPayload(body));
        }

        Err(classify_status(status, &body, retry_after, &request.location))
    }
}

/// Map a non-success status to a classified failure.
pub fn classify_status(
    status: StatusCode,
    body: &str,
    retry_after: Option<Duration>,
    location: &str,
) -> WeatherError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            WeatherError::Auth { status: status.as_u16() }
        }
        StatusCode::TOO_MANY_REQUESTS => WeatherError::RateLimited { retry_after },
        StatusCode::NOT_FOUND => {
            WeatherError::Provider(ProviderFailure::LocationNotFound(location.to_string()))
        }
        s if s.is_server_error() => {
            WeatherError::Provider(ProviderFailure::UpstreamUnavailable { status: s.as_u16() })
        }
        s => WeatherError::Provider(ProviderFailure::Rejected {
            status: s.as_u16(),
            message: provider_message(body),
        }),
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// The provider's `message` field if the body is its JSON error shape,
/// otherwise the raw body, truncated either way.
fn provider_message(body: &str) -> String {
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| body.trim().to_string());
    truncate(&message)
}

fn truncate(text: &str) -> String {
    if text.chars().count() > MAX_MESSAGE_LEN {
        let cut: String = text.chars().take(MAX_MESSAGE_LEN).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

/// Only the delta-seconds form; HTTP dates are ignored.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// reqwest errors carry the full URL, API key included; drop it.
fn connection_error(err: reqwest::Error, timeout: Duration) -> WeatherError {
    if err.is_timeout() {
        WeatherError::Network(NetworkFailure::Timeout(timeout))
    } else {
        WeatherError::Network(NetworkFailure::Connection(err.without_url().to_string()))
    }
}
