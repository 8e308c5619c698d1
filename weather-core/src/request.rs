use std::fmt;

use url::Url;

use crate::{
    credentials::Credentials,
    error::{LocationError, WeatherError},
    model::{Location, MAX_LOCATION_LEN, UnitSystem},
};

/// A fully described outbound call: endpoint plus query parameters.
///
/// The provider is always asked for JSON (`mode=json`).
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderRequest {
    pub endpoint: Url,
    pub location: String,
    pub units: UnitSystem,
    api_key: String,
}

impl ProviderRequest {
    pub fn query(&self) -> [(&'static str, &str); 4] {
        [
            ("q", self.location.as_str()),
            ("appid", self.api_key.as_str()),
            ("units", self.units.as_str()),
            ("mode", "json"),
        ]
    }

    /// Endpoint with the query string attached. Contains the API key, so it
    /// exists for assertions only.
    #[cfg(test)]
    pub fn url(&self) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().extend_pairs(self.query());
        url
    }
}

impl fmt::Debug for ProviderRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRequest")
            .field("endpoint", &self.endpoint.as_str())
            .field("location", &self.location)
            .field("units", &self.units)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct WeatherRequestBuilder {
    endpoint: Url,
}

impl WeatherRequestBuilder {
    pub fn new(endpoint: &str) -> anyhow::Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| anyhow::anyhow!("Invalid provider endpoint '{endpoint}': {e}"))?;
        Ok(Self { endpoint })
    }

    pub fn build(
        &self,
        location: &Location,
        units: UnitSystem,
        credentials: &Credentials,
    ) -> Result<ProviderRequest, WeatherError> {
        let query = location.query();
        if query.is_empty() {
            return Err(WeatherError::InvalidLocation(LocationError::Empty));
        }

        let len = query.chars().count();
        if len > MAX_LOCATION_LEN {
            return Err(WeatherError::InvalidLocation(LocationError::TooLong {
                len,
                max: MAX_LOCATION_LEN,
            }));
        }

        Ok(ProviderRequest {
            endpoint: self.endpoint.clone(),
            location: query.to_string(),
            units,
            api_key: credentials.api_key().to_string(),
        })
    }
}
