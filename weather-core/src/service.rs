use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::{
    cache::ResponseCache,
    client::WeatherClient,
    credentials::{CredentialResolver, Credentials},
    error::WeatherError,
    model::{FetchedReport, Location, ReportOrigin, UnitSystem, WeatherReport},
    parser::ResponseParser,
    request::WeatherRequestBuilder,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceSettings {
    /// Hand back an expired cache entry, tagged stale, when a fetch fails
    /// with a transient error.
    pub serve_stale_on_error: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Skip the cache read; the fresh result is still stored.
    pub bypass_cache: bool,
}

/// Per-invocation progress, reported through `tracing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    ResolvingCredentials,
    CheckingCache,
    BuildingRequest,
    Calling,
    Parsing,
    CachingResult,
}

/// Resolve credentials, consult the cache, call the provider, parse, store.
#[derive(Debug)]
pub struct WeatherService {
    resolver: CredentialResolver,
    builder: WeatherRequestBuilder,
    client: WeatherClient,
    cache: Arc<ResponseCache>,
    settings: ServiceSettings,
}

impl WeatherService {
    pub fn new(
        resolver: CredentialResolver,
        builder: WeatherRequestBuilder,
        client: WeatherClient,
        cache: Arc<ResponseCache>,
        settings: ServiceSettings,
    ) -> Self {
        Self { resolver, builder, client, cache, settings }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub async fn fetch(
        &self,
        location: &str,
        units: UnitSystem,
        explicit_key: Option<&str>,
    ) -> Result<FetchedReport, WeatherError> {
        let location = Location::new(location);
        self.fetch_with(&location, units, explicit_key, FetchOptions::default())
            .await
    }

    #[instrument(
        skip_all,
        fields(location = %location, units = %units, bypass_cache = options.bypass_cache)
    )]
    pub async fn fetch_with(
        &self,
        location: &Location,
        units: UnitSystem,
        explicit_key: Option<&str>,
        options: FetchOptions,
    ) -> Result<FetchedReport, WeatherError> {
        debug!(stage = ?Stage::ResolvingCredentials);
        let credentials = self.resolver.resolve(explicit_key)?;
        debug!(source = %credentials.source(), "Credentials resolved");

        debug!(stage = ?Stage::CheckingCache);
        let key = ResponseCache::key_for(location, units);
        if options.bypass_cache {
            debug!(%key, "Cache read bypassed");
        } else if let Some(report) = self.cache.get(&key).await {
            info!(%key, "Serving report from cache");
            return Ok(FetchedReport { report, origin: ReportOrigin::Cache });
        }

        match self.fetch_fresh(location, units, &credentials).await {
            Ok(report) => {
                debug!(stage = ?Stage::CachingResult);
                self.cache.put(key, report.clone()).await;
                Ok(FetchedReport { report, origin: ReportOrigin::Provider })
            }
            Err(err) if self.settings.serve_stale_on_error && err.is_transient() => {
                match self.cache.get_stale(&key).await {
                    Some(report) => {
                        warn!(%key, error = %err, "Fetch failed, serving stale report");
                        Ok(FetchedReport { report, origin: ReportOrigin::Stale })
                    }
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    async fn fetch_fresh(
        &self,
        location: &Location,
        units: UnitSystem,
        credentials: &Credentials,
    ) -> Result<WeatherReport, WeatherError> {
        debug!(stage = ?Stage::BuildingRequest);
        let request = self.builder.build(location, units, credentials)?;

        debug!(stage = ?Stage::Calling);
        let payload = self.client.execute(&request).await?;

        debug!(stage = ?Stage::Parsing);
        let report = ResponseParser::new(units).parse(&payload)?;
        info!(location = %report.display_name(), "Fetched fresh report");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::{CacheSettings, tests::ManualClock},
        client::{
            RawPayload, RetryPolicy,
            tests::{RecordingSleeper, ScriptedTransport},
        },
        config::DEFAULT_ENDPOINT,
        error::{LocationError, NetworkFailure, ProviderFailure},
    };
    use std::time::Duration;

    const LONDON: &str = r#"{
        "weather": [{ "id": 803, "main": "Clouds", "description": "broken clouds" }],
        "main": { "temp": 15.2, "feels_like": 14.6, "pressure": 1012, "humidity": 72 },
        "wind": { "speed": 4.1, "deg": 250 },
        "dt": 1700000000,
        "sys": { "country": "GB" },
        "name": "London"
    }"#;

    struct Harness {
        service: WeatherService,
        transport: Arc<ScriptedTransport>,
        clock: Arc<ManualClock>,
    }

    fn harness(
        outcomes: Vec<Result<RawPayload, WeatherError>>,
        resolver: CredentialResolver,
        settings: ServiceSettings,
    ) -> Harness {
        let transport = ScriptedTransport::new(outcomes);
        let clock = ManualClock::new();
        let client = WeatherClient::new(
            transport.clone(),
            RetryPolicy::default(),
            Arc::new(RecordingSleeper::default()),
        );
        let cache = Arc::new(ResponseCache::in_memory(CacheSettings::default(), clock.clone()));
        let service = WeatherService::new(
            resolver,
            WeatherRequestBuilder::new(DEFAULT_ENDPOINT).unwrap(),
            client,
            cache,
            settings,
        );
        Harness { service, transport, clock }
    }

    fn with_key() -> CredentialResolver {
        CredentialResolver::new(Some("KEY".into()), None)
    }

    #[tokio::test]
    async fn bypass_cache_still_refreshes_entry() {
        let h = harness(
            vec![Ok(RawPayload(LONDON.into()))],
            with_key(),
            ServiceSettings::default(),
        );
        let location = Location::new("London");

        h.service.fetch("London", UnitSystem::Metric, None).await.unwrap();
        let fetched = h
            .service
            .fetch_with(&location, UnitSystem::Metric, None, FetchOptions { bypass_cache: true })
            .await
            .unwrap();

        assert_eq!(fetched.origin, ReportOrigin::Provider);
        assert_eq!(h.transport.calls(), 2);
    }

    #[tokio::test]
    async fn invalid_location_fails_before_network() {
        let h = harness(
            vec![Ok(RawPayload(LONDON.into()))],
            with_key(),
            ServiceSettings::default(),
        );
        let err = h.service.fetch("   ", UnitSystem::Metric, None).await.unwrap_err();

        assert_eq!(err, WeatherError::InvalidLocation(LocationError::Empty));
        assert_eq!(h.transport.calls(), 0);
    }

    #[tokio::test]
    async fn stale_entry_served_only_when_opted_in() {
        let timeout = WeatherError::Network(NetworkFailure::Timeout(Duration::from_secs(10)));
        let outcomes = vec![Ok(RawPayload(LONDON.into())), Err(timeout.clone())];

        let stale_on = ServiceSettings { serve_stale_on_error: true };
        let h = harness(outcomes.clone(), with_key(), stale_on);
        h.service.fetch("London", UnitSystem::Metric, None).await.unwrap();
        h.clock.advance(Duration::from_secs(601));
        let fetched = h.service.fetch("London", UnitSystem::Metric, None).await.unwrap();
        assert_eq!(fetched.origin, ReportOrigin::Stale);
        assert_eq!(fetched.report.temperature.value, 15.2);

        let h = harness(outcomes, with_key(), ServiceSettings::default());
        h.service.fetch("London", UnitSystem::Metric, None).await.unwrap();
        h.clock.advance(Duration::from_secs(601));
        let err = h.service.fetch("London", UnitSystem::Metric, None).await.unwrap_err();
        assert_eq!(err, timeout);
    }

    #[tokio::test]
    async fn permanent_errors_are_never_masked_by_stale_data() {
        let not_found = WeatherError::Provider(ProviderFailure::LocationNotFound("London".into()));
        let h = harness(
            vec![Ok(RawPayload(LONDON.into())), Err(not_found.clone())],
            with_key(),
            ServiceSettings { serve_stale_on_error: true },
        );

        h.service.fetch("London", UnitSystem::Metric, None).await.unwrap();
        h.clock.advance(Duration::from_secs(601));
        let err = h.service.fetch("London", UnitSystem::Metric, None).await.unwrap_err();
        assert_eq!(err, not_found);
    }

    #[tokio::test]
    async fn malformed_payload_is_not_cached() {
        let h = harness(
            vec![Ok(RawPayload(r#"{"name":"London"}"#.into()))],
            with_key(),
            ServiceSettings::default(),
        );

        let err = h.service.fetch("London", UnitSystem::Metric, None).await.unwrap_err();
        assert!(matches!(err, WeatherError::MalformedResponse { .. }));
        assert!(h.service.cache().is_empty().await);
    }
}
