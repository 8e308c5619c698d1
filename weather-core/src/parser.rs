//! Validates a provider payload and turns it into a [`WeatherReport`].
//!
//! The payload is walked as a JSON tree rather than deserialized into
//! structs, so a failure names the exact field that was missing, mistyped or
//! out of range. Nothing is defaulted: a missing required field is an error.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::{
    client::RawPayload,
    error::WeatherError,
    model::{Condition, Temperature, UnitSystem, WeatherReport, Wind},
};

/// Plausible air temperature, in °C.
const TEMP_RANGE_C: (f64, f64) = (-100.0, 60.0);
/// Sea-level pressure, in hPa.
const PRESSURE_RANGE_HPA: (f64, f64) = (300.0, 1200.0);
/// Wind speed, in m/s.
const WIND_RANGE_MPS: (f64, f64) = (0.0, 150.0);

#[derive(Debug, Clone, Copy)]
pub struct ResponseParser {
    units: UnitSystem,
}

impl ResponseParser {
    /// Parser expecting values in `units`, the system the request asked for.
    pub fn new(units: UnitSystem) -> Self {
        Self { units }
    }

    pub fn parse(&self, payload: &RawPayload) -> Result<WeatherReport, WeatherError> {
        let root: Value = serde_json::from_str(payload.body())
            .map_err(|e| WeatherError::malformed("payload", format!("is not valid JSON: {e}")))?;
        let root = as_object(&root, "payload")?;

        let location_name = string(root, "name", "name")?;
        if location_name.trim().is_empty() {
            return Err(WeatherError::malformed("name", "is empty"));
        }

        let country = match root.get("sys").and_then(|sys| sys.get("country")) {
            None | Some(Value::Null) => None,
            Some(Value::String(cc)) if cc.trim().is_empty() => None,
            Some(Value::String(cc)) => Some(cc.clone()),
            Some(_) => return Err(WeatherError::malformed("country", "is not a string")),
        };

        let dt = required(root, "dt", "timestamp")?
            .as_i64()
            .ok_or_else(|| WeatherError::malformed("timestamp", "is not an integer"))?;
        let observed_at: DateTime<Utc> = DateTime::from_timestamp(dt, 0)
            .ok_or_else(|| WeatherError::malformed("timestamp", format!("{dt} is out of range")))?;

        let main = as_object(required(root, "main", "main")?, "main")?;
        let temperature = self.temperature(main, "temp", "temperature")?;
        let feels_like = self.temperature(main, "feels_like", "feels_like")?;
        let temp_min = self.optional_temperature(main, "temp_min")?;
        let temp_max = self.optional_temperature(main, "temp_max")?;
        let humidity_pct = percent(number(main, "humidity", "humidity")?, "humidity")?;
        let pressure_hpa =
            in_range(number(main, "pressure", "pressure")?, PRESSURE_RANGE_HPA, "pressure")?;

        let wind = as_object(required(root, "wind", "wind")?, "wind")?;
        let direction =
            in_range(number(wind, "deg", "wind_direction")?, (0.0, 360.0), "wind_direction")?;
        let wind = Wind {
            speed: number(wind, "speed", "wind_speed")?,
            unit: self.units.speed_unit(),
            direction_deg: direction.round() as u16,
        };
        in_range(wind.speed_mps(), WIND_RANGE_MPS, "wind_speed")?;

        let clouds_pct = match root.get("clouds").and_then(|c| c.get("all")) {
            None | Some(Value::Null) => None,
            Some(v) => Some(percent(
                v.as_f64().ok_or_else(|| WeatherError::malformed("clouds", "is not a number"))?,
                "clouds",
            )?),
        };

        let condition = condition(root)?;

        Ok(WeatherReport {
            location_name: location_name.to_string(),
            country,
            observed_at,
            units: self.units,
            temperature,
            feels_like,
            temp_min,
            temp_max,
            humidity_pct,
            pressure_hpa,
            wind,
            clouds_pct,
            condition,
        })
    }

    /// Reads a temperature in the requested units and checks it is
    /// physically plausible once converted to °C.
    fn temperature(
        &self,
        obj: &Map<String, Value>,
        key: &str,
        field: &str,
    ) -> Result<Temperature, WeatherError> {
        let value = number(obj, key, field)?;
        let temp = Temperature::new(value, self.units.temperature_unit());
        let celsius = temp.to_celsius();
        if celsius < TEMP_RANGE_C.0 || celsius > TEMP_RANGE_C.1 {
            return Err(WeatherError::malformed(
                field,
                format!("{temp} is implausible for {} units", self.units),
            ));
        }
        Ok(temp)
    }

    fn optional_temperature(
        &self,
        obj: &Map<String, Value>,
        key: &str,
    ) -> Result<Option<Temperature>, WeatherError> {
        match obj.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.temperature(obj, key, key).map(Some),
        }
    }
}

fn condition(root: &Map<String, Value>) -> Result<Condition, WeatherError> {
    let first = required(root, "weather", "condition")?
        .as_array()
        .ok_or_else(|| WeatherError::malformed("condition", "is not an array"))?
        .first()
        .ok_or_else(|| WeatherError::malformed("condition", "is empty"))?;
    let first = as_object(first, "condition")?;

    let code = first
        .get("id")
        .and_then(Value::as_u64)
        .and_then(|id| u16::try_from(id).ok())
        .ok_or_else(|| WeatherError::malformed("condition_code", "is missing or not a valid id"))?;

    Ok(Condition {
        code,
        main: string(first, "main", "condition")?.to_string(),
        description: string(first, "description", "condition_description")?.to_string(),
    })
}

fn required<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    field: &str,
) -> Result<&'a Value, WeatherError> {
    match obj.get(key) {
        None | Some(Value::Null) => Err(WeatherError::malformed(field, "is missing")),
        Some(v) => Ok(v),
    }
}

fn as_object<'a>(value: &'a Value, field: &str) -> Result<&'a Map<String, Value>, WeatherError> {
    value.as_object().ok_or_else(|| WeatherError::malformed(field, "is not an object"))
}

fn string<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    field: &str,
) -> Result<&'a str, WeatherError> {
    required(obj, key, field)?
        .as_str()
        .ok_or_else(|| WeatherError::malformed(field, "is not a string"))
}

fn number(obj: &Map<String, Value>, key: &str, field: &str) -> Result<f64, WeatherError> {
    let value = required(obj, key, field)?
        .as_f64()
        .ok_or_else(|| WeatherError::malformed(field, "is not a number"))?;
    if !value.is_finite() {
        return Err(WeatherError::malformed(field, "is not finite"));
    }
    Ok(value)
}

fn in_range(value: f64, (lo, hi): (f64, f64), field: &str) -> Result<f64, WeatherError> {
    if value < lo || value > hi {
        return Err(WeatherError::malformed(field, format!("{value} is outside {lo}..={hi}")));
    }
    Ok(value)
}

fn percent(value: f64, field: &str) -> Result<u8, WeatherError> {
    if value.fract() != 0.0 {
        return Err(WeatherError::malformed(field, format!("{value} is not a whole percentage")));
    }
    Ok(in_range(value, (0.0, 100.0), field)? as u8)
}
