use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc, time::Duration};
use tracing::{debug, warn};

use crate::{error::WeatherError, request::ProviderRequest};

pub mod http;
pub mod retry;

pub use http::HttpTransport;
pub use retry::{RetryDecision, RetryPolicy, Sleeper, TokioSleeper};

/// Body of a successful provider response, not yet validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPayload(pub String);

impl RawPayload {
    pub fn body(&self) -> &str {
        &self.0
    }
}

/// One network attempt, already classified. No retries at this level.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    async fn send(&self, request: &ProviderRequest) -> Result<RawPayload, WeatherError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSettings {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

/// Runs requests through a [`Transport`], retrying transient failures.
#[derive(Debug, Clone)]
pub struct WeatherClient {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl WeatherClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self { transport, policy, sleeper }
    }

    /// Production client: reqwest transport and real sleeps.
    pub fn from_settings(settings: &ClientSettings) -> Result<Self, WeatherError> {
        let transport = HttpTransport::new(settings)?;
        Ok(Self::new(Arc::new(transport), settings.retry, Arc::new(TokioSleeper)))
    }

    /// A complete payload or the last classified failure.
    pub async fn execute(&self, request: &ProviderRequest) -> Result<RawPayload, WeatherError> {
        let mut attempt = 1;
        loop {
            let err = match self.transport.send(request).await {
                Ok(payload) => {
                    debug!(attempt, "Provider call succeeded");
                    return Ok(payload);
                }
                Err(err) => err,
            };

            match self.policy.decide(attempt, &err) {
                RetryDecision::Retry(delay) => {
                    warn!(attempt, ?delay, error = %err, "Transient provider failure, retrying");
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::GiveUp => {
                    debug!(attempt, error = %err, "Giving up on provider call");
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        config::DEFAULT_ENDPOINT,
        credentials::CredentialResolver,
        error::{NetworkFailure, ProviderFailure},
        model::{Location, UnitSystem},
        request::WeatherRequestBuilder,
    };
    use std::sync::Mutex;

    /// Plays back scripted outcomes; repeats the last one once exhausted.
    #[derive(Debug)]
    pub(crate) struct ScriptedTransport {
        outcomes: Mutex<Vec<Result<RawPayload, WeatherError>>>,
        calls: Mutex<usize>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(outcomes: Vec<Result<RawPayload, WeatherError>>) -> Arc<Self> {
            Arc::new(Self { outcomes: Mutex::new(outcomes), calls: Mutex::new(0) })
        }

        pub(crate) fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, _request: &ProviderRequest) -> Result<RawPayload, WeatherError> {
            *self.calls.lock().unwrap() += 1;
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.len() > 1 {
                outcomes.remove(0)
            } else {
                outcomes[0].clone()
            }
        }
    }

    #[derive(Debug, Default)]
    pub(crate) struct RecordingSleeper(pub(crate) Mutex<Vec<Duration>>);

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.0.lock().unwrap().push(duration);
        }
    }

    fn request() -> ProviderRequest {
        let creds = CredentialResolver::default().resolve(Some("KEY")).unwrap();
        WeatherRequestBuilder::new(DEFAULT_ENDPOINT)
            .unwrap()
            .build(&Location::new("London"), UnitSystem::Metric, &creds)
            .unwrap()
    }

    fn unavailable() -> WeatherError {
        WeatherError::Provider(ProviderFailure::UpstreamUnavailable { status: 502 })
    }

    #[tokio::test]
    async fn always_unavailable_is_tried_one_plus_retry_limit_times() {
        let transport = ScriptedTransport::new(vec![Err(unavailable())]);
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = WeatherClient::new(transport.clone(), RetryPolicy::default(), sleeper.clone());

        let err = client.execute(&request()).await.unwrap_err();

        assert_eq!(err, unavailable());
        assert_eq!(transport.calls(), 3);
        assert_eq!(
            *sleeper.0.lock().unwrap(),
            vec![Duration::from_millis(500), Duration::from_secs(1)]
        );
    }

    #[tokio::test]
    async fn recovers_after_transient_failure() {
        let transport = ScriptedTransport::new(vec![
            Err(WeatherError::Network(NetworkFailure::Connection("reset".into()))),
            Ok(RawPayload("{}".into())),
        ]);
        let client = WeatherClient::new(
            transport.clone(),
            RetryPolicy::default(),
            Arc::new(RecordingSleeper::default()),
        );

        let payload = client.execute(&request()).await.expect("second attempt succeeds");
        assert_eq!(payload.body(), "{}");
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn auth_failure_is_not_retried() {
        let transport = ScriptedTransport::new(vec![Err(WeatherError::Auth { status: 401 })]);
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = WeatherClient::new(transport.clone(), RetryPolicy::default(), sleeper.clone());

        let err = client.execute(&request()).await.unwrap_err();
        assert_eq!(err, WeatherError::Auth { status: 401 });
        assert_eq!(transport.calls(), 1);
        assert!(sleeper.0.lock().unwrap().is_empty());
    }
}
