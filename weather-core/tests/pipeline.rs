//! End-to-end scenarios for `WeatherService::fetch`, with the network,
//! the clock and backoff sleeps replaced by in-process fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use weather_core::{
    CacheSettings, Clock, CredentialResolver, ProviderRequest, RawPayload, ReportOrigin,
    ResponseCache, ServiceSettings, Transport, UnitSystem, WeatherClient, WeatherError,
    WeatherRequestBuilder, WeatherService,
    client::{RetryPolicy, Sleeper},
    config::DEFAULT_ENDPOINT,
    error::ProviderFailure,
};

const LONDON_PAYLOAD: &str = r#"{
    "coord": { "lon": -0.1257, "lat": 51.5085 },
    "weather": [{ "id": 804, "main": "Clouds", "description": "overcast clouds", "icon": "04d" }],
    "base": "stations",
    "main": {
        "temp": 15.2, "feels_like": 14.7, "temp_min": 14.1, "temp_max": 16.0,
        "pressure": 1009, "humidity": 72
    },
    "visibility": 10000,
    "wind": { "speed": 5.66, "deg": 240 },
    "clouds": { "all": 100 },
    "dt": 1729260000,
    "sys": {
        "type": 2, "id": 2075535, "country": "GB",
        "sunrise": 1729233180, "sunset": 1729271011
    },
    "timezone": 3600,
    "id": 2643743,
    "name": "London",
    "cod": 200
}"#;

const LONDON_IMPERIAL_PAYLOAD: &str = r#"{
    "weather": [{ "id": 804, "main": "Clouds", "description": "overcast clouds" }],
    "main": { "temp": 59.4, "feels_like": 58.5, "pressure": 1009, "humidity": 72 },
    "wind": { "speed": 12.66, "deg": 240 },
    "dt": 1729260000,
    "sys": { "country": "GB" },
    "name": "London"
}"#;

#[derive(Debug)]
struct FakeProvider {
    respond: fn(&ProviderRequest) -> Result<RawPayload, WeatherError>,
    requests: Mutex<Vec<String>>,
}

impl FakeProvider {
    fn new(respond: fn(&ProviderRequest) -> Result<RawPayload, WeatherError>) -> Arc<Self> {
        Arc::new(Self { respond, requests: Mutex::new(Vec::new()) })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for FakeProvider {
    async fn send(&self, request: &ProviderRequest) -> Result<RawPayload, WeatherError> {
        let mut url = request.endpoint.clone();
        url.query_pairs_mut().extend_pairs(request.query());
        self.requests.lock().unwrap().push(url.to_string());
        (self.respond)(request)
    }
}

#[derive(Debug)]
struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += chrono::Duration::from_std(by).unwrap();
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

#[derive(Debug)]
struct NoSleep;

#[async_trait]
impl Sleeper for NoSleep {
    async fn sleep(&self, _duration: Duration) {}
}

struct Setup {
    service: WeatherService,
    provider: Arc<FakeProvider>,
    clock: Arc<FixedClock>,
}

fn setup(
    resolver: CredentialResolver,
    respond: fn(&ProviderRequest) -> Result<RawPayload, WeatherError>,
) -> Setup {
    let provider = FakeProvider::new(respond);
    let clock = Arc::new(FixedClock(Mutex::new(Utc::now())));
    let cache = ResponseCache::in_memory(CacheSettings::default(), clock.clone());
    let client = WeatherClient::new(provider.clone(), RetryPolicy::default(), Arc::new(NoSleep));
    let service = WeatherService::new(
        resolver,
        WeatherRequestBuilder::new(DEFAULT_ENDPOINT).unwrap(),
        client,
        Arc::new(cache),
        ServiceSettings::default(),
    );
    Setup { service, provider, clock }
}

fn env_key() -> CredentialResolver {
    CredentialResolver::new(Some("ENV_KEY".into()), Some("FILE_KEY".into()))
}

fn london(request: &ProviderRequest) -> Result<RawPayload, WeatherError> {
    assert_eq!(request.location, "London");
    Ok(RawPayload(LONDON_PAYLOAD.to_string()))
}

#[tokio::test]
async fn fetch_returns_provider_values() {
    let s = setup(env_key(), london);

    let fetched = s.service.fetch("London", UnitSystem::Metric, Some("VALID_KEY")).await.unwrap();

    assert_eq!(fetched.origin, ReportOrigin::Provider);
    assert_eq!(fetched.report.location_name, "London");
    assert_eq!(fetched.report.temperature.value, 15.2);
    assert_eq!(fetched.report.humidity_pct, 72);
    assert_eq!(fetched.report.condition.main, "Clouds");
    assert_eq!(fetched.report.units, UnitSystem::Metric);
}

#[tokio::test]
async fn second_fetch_within_ttl_makes_no_network_call() {
    let s = setup(env_key(), london);

    let first = s.service.fetch("London", UnitSystem::Metric, None).await.unwrap();
    s.clock.advance(Duration::from_secs(300));
    let second = s.service.fetch("london ", UnitSystem::Metric, None).await.unwrap();

    assert_eq!(s.provider.calls(), 1);
    assert_eq!(second.origin, ReportOrigin::Cache);
    assert_eq!(second.report, first.report);
}

#[tokio::test]
async fn fetch_after_ttl_goes_back_to_provider() {
    let s = setup(env_key(), london);

    s.service.fetch("London", UnitSystem::Metric, None).await.unwrap();
    s.clock.advance(Duration::from_secs(600));
    let again = s.service.fetch("London", UnitSystem::Metric, None).await.unwrap();

    assert_eq!(s.provider.calls(), 2);
    assert_eq!(again.origin, ReportOrigin::Provider);
}

#[tokio::test]
async fn different_units_do_not_share_cache_entries() {
    let s = setup(env_key(), |request| match request.units {
        UnitSystem::Imperial => Ok(RawPayload(LONDON_IMPERIAL_PAYLOAD.to_string())),
        _ => Ok(RawPayload(LONDON_PAYLOAD.to_string())),
    });

    let imperial = s.service.fetch("London", UnitSystem::Imperial, None).await.unwrap();
    let metric = s.service.fetch("London", UnitSystem::Metric, None).await.unwrap();

    assert_eq!(s.provider.calls(), 2);
    assert_eq!(metric.origin, ReportOrigin::Provider);
    assert_eq!(imperial.report.temperature.value, 59.4);
    assert_eq!(metric.report.temperature.value, 15.2);
}

#[tokio::test]
async fn unknown_location_fails_and_is_not_cached() {
    let s = setup(env_key(), |request| {
        Err(WeatherError::Provider(ProviderFailure::LocationNotFound(request.location.clone())))
    });

    let err = s.service.fetch("Nonexistentville1234", UnitSystem::Metric, None).await.unwrap_err();

    assert_eq!(
        err,
        WeatherError::Provider(ProviderFailure::LocationNotFound("Nonexistentville1234".into()))
    );
    assert_eq!(s.provider.calls(), 1);
    assert!(s.service.cache().is_empty().await);
}

#[tokio::test]
async fn missing_credentials_fail_before_any_network_call() {
    let s = setup(CredentialResolver::new(None, Some("   ".into())), london);

    let err = s.service.fetch("London", UnitSystem::Metric, None).await.unwrap_err();

    assert_eq!(err, WeatherError::MissingCredential);
    assert_eq!(s.provider.calls(), 0);
}

#[tokio::test]
async fn explicit_key_is_the_one_sent() {
    let s = setup(env_key(), london);

    s.service.fetch("London", UnitSystem::Metric, Some("EXPLICIT")).await.unwrap();

    let url = s.provider.requests.lock().unwrap()[0].clone();
    assert!(url.contains("appid=EXPLICIT"));
    assert!(!url.contains("ENV_KEY"));
}

#[tokio::test]
async fn upstream_outage_is_retried_then_surfaced() {
    let s = setup(env_key(), |_| {
        Err(WeatherError::Provider(ProviderFailure::UpstreamUnavailable { status: 503 }))
    });

    let err = s.service.fetch("London", UnitSystem::Metric, None).await.unwrap_err();

    assert_eq!(err, WeatherError::Provider(ProviderFailure::UpstreamUnavailable { status: 503 }));
    assert_eq!(s.provider.calls(), 1 + RetryPolicy::default().max_retries as usize);
}
