use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Longest location string accepted, counted in characters after trimming.
pub const MAX_LOCATION_LEN: usize = 200;

/// A user-supplied place name, e.g. `London` or `London,GB`.
///
/// The raw text is kept for the outbound request; [`Location::normalized`]
/// is what cache keys are built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    raw: String,
}

impl Location {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// Build the `City,CC` form the provider understands.
    pub fn with_country(city: &str, country_code: Option<&str>) -> Self {
        match country_code.map(str::trim).filter(|cc| !cc.is_empty()) {
            Some(cc) => Self::new(format!("{},{}", city.trim(), cc)),
            None => Self::new(city),
        }
    }

    /// Text sent to the provider.
    pub fn query(&self) -> &str {
        self.raw.trim()
    }

    pub fn normalized(&self) -> String {
        self.raw.trim().to_lowercase()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.query())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
    Standard,
}

impl UnitSystem {
    /// Token used in the provider's `units` query parameter and in cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitSystem::Metric => "metric",
            UnitSystem::Imperial => "imperial",
            UnitSystem::Standard => "standard",
        }
    }

    pub const fn all() -> &'static [UnitSystem] {
        &[UnitSystem::Metric, UnitSystem::Imperial, UnitSystem::Standard]
    }

    pub fn temperature_unit(&self) -> TemperatureUnit {
        match self {
            UnitSystem::Metric => TemperatureUnit::Celsius,
            UnitSystem::Imperial => TemperatureUnit::Fahrenheit,
            UnitSystem::Standard => TemperatureUnit::Kelvin,
        }
    }

    pub fn speed_unit(&self) -> SpeedUnit {
        match self {
            UnitSystem::Imperial => SpeedUnit::MilesPerHour,
            UnitSystem::Metric | UnitSystem::Standard => SpeedUnit::MetersPerSecond,
        }
    }
}

impl fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitSystem {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "metric" => Ok(UnitSystem::Metric),
            "imperial" => Ok(UnitSystem::Imperial),
            "standard" => Ok(UnitSystem::Standard),
            _ => Err(anyhow::anyhow!(
                "Unknown unit system '{value}'. Supported: metric, imperial, standard."
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
    Kelvin,
}

impl TemperatureUnit {
    pub fn symbol(&self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "°C",
            TemperatureUnit::Fahrenheit => "°F",
            TemperatureUnit::Kelvin => "K",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Temperature {
    pub value: f64,
    pub unit: TemperatureUnit,
}

impl Temperature {
    pub fn new(value: f64, unit: TemperatureUnit) -> Self {
        Self { value, unit }
    }

    pub fn to_celsius(&self) -> f64 {
        match self.unit {
            TemperatureUnit::Celsius => self.value,
            TemperatureUnit::Fahrenheit => (self.value - 32.0) * 5.0 / 9.0,
            TemperatureUnit::Kelvin => self.value - 273.15,
        }
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}{}", self.value, self.unit.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeedUnit {
    #[serde(rename = "m/s")]
    MetersPerSecond,
    #[serde(rename = "mph")]
    MilesPerHour,
}

impl SpeedUnit {
    pub fn symbol(&self) -> &'static str {
        match self {
            SpeedUnit::MetersPerSecond => "m/s",
            SpeedUnit::MilesPerHour => "mph",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wind {
    pub speed: f64,
    pub unit: SpeedUnit,
    /// Meteorological degrees, 0..=360.
    pub direction_deg: u16,
}

impl Wind {
    pub fn speed_mps(&self) -> f64 {
        match self.unit {
            SpeedUnit::MetersPerSecond => self.speed,
            SpeedUnit::MilesPerHour => self.speed * 0.447_04,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Provider condition id, e.g. 803.
    pub code: u16,
    /// Condition group, e.g. "Clouds".
    pub main: String,
    /// Human-readable text, e.g. "broken clouds".
    pub description: String,
}

/// Normalized current-conditions report.
///
/// Only ever built by the parser from a payload that passed validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub location_name: String,
    pub country: Option<String>,
    pub observed_at: DateTime<Utc>,
    pub units: UnitSystem,
    pub temperature: Temperature,
    pub feels_like: Temperature,
    pub temp_min: Option<Temperature>,
    pub temp_max: Option<Temperature>,
    pub humidity_pct: u8,
    pub pressure_hpa: f64,
    pub wind: Wind,
    pub clouds_pct: Option<u8>,
    pub condition: Condition,
}

impl WeatherReport {
    /// `London, GB`, or just the name when the provider reports no country.
    pub fn display_name(&self) -> String {
        match &self.country {
            Some(cc) => format!("{}, {}", self.location_name, cc),
            None => self.location_name.clone(),
        }
    }
}

/// Where a report handed back by the service came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOrigin {
    Provider,
    Cache,
    /// Expired cache entry served because a fresh fetch failed.
    Stale,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedReport {
    pub report: WeatherReport,
    pub origin: ReportOrigin,
}
