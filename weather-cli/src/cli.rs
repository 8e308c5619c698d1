use anyhow::Context;
use clap::{Parser, Subcommand};
use std::{collections::HashSet, sync::Arc, time::Duration};
use tracing::debug;
use weather_core::{
    CacheEntry, Config, CredentialResolver, ErrorKind, FetchOptions, Location, ResponseCache,
    ServiceSettings, SystemClock, UnitSystem, WeatherClient, WeatherError, WeatherRequestBuilder,
    WeatherService,
};

use crate::render;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather", version, about = "Weather CLI")]
pub struct Cli {
    /// Log pipeline progress to stderr (overrides RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store an API key and default units in the config file.
    Configure,

    /// Show current weather for a location.
    Fetch {
        /// City name, optionally as "City,CountryCode".
        location: String,

        /// ISO 3166 country code, e.g. GB or US.
        #[arg(short, long)]
        country: Option<String>,

        /// metric, imperial or standard; defaults to the configured units.
        #[arg(short, long)]
        units: Option<UnitSystem>,

        /// API key; takes precedence over OPENWEATHER_API_KEY and the config file.
        #[arg(long)]
        api_key: Option<String>,

        /// Skip cached data and ask the provider.
        #[arg(long)]
        no_cache: bool,

        /// Cache lifetime in seconds for this run.
        #[arg(long, value_name = "SECS")]
        cache_ttl: Option<u64>,

        /// On network trouble, fall back to an expired cached report.
        #[arg(long)]
        serve_stale: bool,
    },

    /// List cached reports.
    List {
        /// Case-insensitive substring of the location name.
        #[arg(long)]
        city: Option<String>,

        /// Exact country code.
        #[arg(long)]
        country: Option<String>,

        /// Minimum temperature, in each report's own units.
        #[arg(long)]
        min_temp: Option<f64>,

        /// Maximum temperature, in each report's own units.
        #[arg(long)]
        max_temp: Option<f64>,

        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },

    /// Show one cached report without contacting the provider.
    Show {
        /// Location as it was fetched, e.g. "London" or "London,GB".
        location: String,

        #[arg(short, long)]
        country: Option<String>,

        /// Unit system of the cached report; defaults to the configured units.
        #[arg(short, long)]
        units: Option<UnitSystem>,
    },

    /// Show cache statistics.
    Info,
}

/// Filters for `weather list`.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub city: Option<String>,
    pub country: Option<String>,
    pub min_temp: Option<f64>,
    pub max_temp: Option<f64>,
    pub limit: usize,
}

impl ListFilter {
    fn matches(&self, entry: &CacheEntry) -> bool {
        let report = &entry.report;
        let city_ok = self.city.as_ref().is_none_or(|city| {
            report.location_name.to_lowercase().contains(&city.trim().to_lowercase())
        });
        let country_ok = self.country.as_ref().is_none_or(|cc| {
            report.country.as_deref().is_some_and(|c| c.eq_ignore_ascii_case(cc.trim()))
        });
        let min_ok = self.min_temp.is_none_or(|min| report.temperature.value >= min);
        let max_ok = self.max_temp.is_none_or(|max| report.temperature.value <= max);
        city_ok && country_ok && min_ok && max_ok
    }

    /// Matching entries, newest observation first.
    pub fn apply(&self, mut entries: Vec<CacheEntry>) -> Vec<CacheEntry> {
        entries.retain(|e| self.matches(e));
        entries.sort_by(|a, b| b.report.observed_at.cmp(&a.report.observed_at));
        entries.truncate(self.limit);
        entries
    }
}

/// Process exit code for a failed command.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<WeatherError>().map(WeatherError::kind) {
        Some(ErrorKind::Configuration) => 2,
        Some(ErrorKind::Input) => 3,
        Some(ErrorKind::Transient) => 4,
        Some(ErrorKind::NotFound) => 5,
        Some(ErrorKind::Data) => 6,
        None => 1,
    }
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Fetch {
                location,
                country,
                units,
                api_key,
                no_cache,
                cache_ttl,
                serve_stale,
            } => {
                let config = Config::load()?;
                let units = units.unwrap_or_else(|| config.default_units());
                let cache = Arc::new(open_cache(&config, cache_ttl).await?);

                let service = WeatherService::new(
                    CredentialResolver::from_env(&config),
                    WeatherRequestBuilder::new(config.endpoint())?,
                    WeatherClient::from_settings(&config.client_settings())?,
                    cache,
                    ServiceSettings {
                        serve_stale_on_error: serve_stale || config.cache.serve_stale_on_error,
                    },
                );

                let location = Location::with_country(&location, country.as_deref());
                let fetched = service
                    .fetch_with(
                        &location,
                        units,
                        api_key.as_deref(),
                        FetchOptions { bypass_cache: no_cache },
                    )
                    .await?;

                render::print_detail(&fetched);
                Ok(())
            }
            Command::List { city, country, min_temp, max_temp, limit } => {
                let config = Config::load()?;
                let cache = open_cache(&config, None).await?;
                let filter = ListFilter { city, country, min_temp, max_temp, limit };

                let entries = filter.apply(cache.entries().await);
                render::print_table(&entries, |e| cache.is_fresh(e));
                Ok(())
            }
            Command::Show { location, country, units } => {
                let config = Config::load()?;
                let units = units.unwrap_or_else(|| config.default_units());
                let cache = open_cache(&config, None).await?;

                let location = Location::with_country(&location, country.as_deref());
                let entry = find_cached(&cache, &location, units).await?;
                render::print_cached(&entry, cache.is_fresh(&entry));
                Ok(())
            }
            Command::Info => {
                let config = Config::load()?;
                let cache = open_cache(&config, None).await?;
                let entries = cache.entries().await;

                let locations: HashSet<String> =
                    entries.iter().map(|e| e.report.display_name().to_lowercase()).collect();
                let stats = render::CacheStats {
                    entries: entries.len(),
                    fresh: entries.iter().filter(|e| cache.is_fresh(e)).count(),
                    unique_locations: locations.len(),
                    average_temp_c: average(
                        entries.iter().map(|e| e.report.temperature.to_celsius()),
                    ),
                    path: cache.path().map(|p| p.display().to_string()),
                    ttl: cache.settings().ttl,
                };
                render::print_info(&stats);
                Ok(())
            }
        }
    }
}

async fn open_cache(config: &Config, ttl_override: Option<u64>) -> anyhow::Result<ResponseCache> {
    let mut settings = config.cache_settings();
    if let Some(secs) = ttl_override {
        settings.ttl = Duration::from_secs(secs);
    }

    let clock = Arc::new(SystemClock);
    if config.cache.persist {
        let path = Config::cache_file_path()?;
        debug!(path = %path.display(), ttl_secs = settings.ttl.as_secs(), "opening cache file");
        Ok(ResponseCache::open(path, settings, clock).await)
    } else {
        debug!(ttl_secs = settings.ttl.as_secs(), "using in-memory cache");
        Ok(ResponseCache::in_memory(settings, clock))
    }
}

async fn find_cached(
    cache: &ResponseCache,
    location: &Location,
    units: UnitSystem,
) -> anyhow::Result<CacheEntry> {
    let key = ResponseCache::key_for(location, units);
    cache.entry(&key).await.with_context(|| {
        format!("No cached {units} report for '{location}'; run `weather fetch` first")
    })
}

fn configure() -> anyhow::Result<()> {
    let mut config = Config::load()?;

    let api_key = inquire::Password::new("OpenWeather API key:")
        .without_confirmation()
        .with_display_mode(inquire::PasswordDisplayMode::Masked)
        .prompt()
        .context("Failed to read API key")?;
    config.set_api_key(&api_key);

    let units = inquire::Select::new("Default units:", UnitSystem::all().to_vec())
        .with_starting_cursor(
            UnitSystem::all().iter().position(|u| *u == config.default_units()).unwrap_or(0),
        )
        .prompt()
        .context("Failed to read default units")?;
    config.units = Some(units);

    config.save()?;
    println!("Configuration saved to {}", Config::config_file_path()?.display());
    if !config.has_api_key() {
        println!("No API key stored; set OPENWEATHER_API_KEY or pass --api-key.");
    }
    Ok(())
}

fn average(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}
