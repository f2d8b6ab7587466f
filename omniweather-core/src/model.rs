use std::{borrow::Cow, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Parameters shared by every provider operation.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub units: Units,
    pub lang: String,
}

impl WeatherQuery {
    /// Metric units, English text.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            units: Units::default(),
            lang: "en".to_string(),
        }
    }

    #[must_use]
    pub fn with_units(mut self, units: Units) -> Self {
        self.units = units;
        self
    }

    #[must_use]
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }
}

/// Unit system requested from the provider. Values are stored as the provider returns them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    /// °C, hPa, m/s (or the provider's metric flavour).
    #[default]
    Metric,
    /// °F, mph.
    Imperial,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Metric => "metric",
            Units::Imperial => "imperial",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Units {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "metric" => Ok(Units::Metric),
            "imperial" => Ok(Units::Imperial),
            other => Err(format!("Unknown units '{other}'. Expected metric or imperial.")),
        }
    }
}

/// Whether a record describes the present, the past or the future.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Current,
    Historical,
    Forecast,
}

impl RecordKind {
    /// Kind derived from the timestamp alone: strictly after `now` is a forecast,
    /// anything else (including a missing timestamp) is historical.
    pub fn classify(timestamp: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        match timestamp {
            Some(ts) if ts > now => RecordKind::Forecast,
            _ => RecordKind::Historical,
        }
    }
}

/// Attribution for the organisation a record came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub short_name: Cow<'static, str>,
    pub name: Cow<'static, str>,
    pub credit_url: Cow<'static, str>,
}

impl Source {
    pub const fn new_static(
        short_name: &'static str,
        name: &'static str,
        credit_url: &'static str,
    ) -> Self {
        Self {
            short_name: Cow::Borrowed(short_name),
            name: Cow::Borrowed(name),
            credit_url: Cow::Borrowed(credit_url),
        }
    }
}

/// One weather observation or forecast, normalized across providers.
///
/// Every measurement is optional: a provider that does not report a value leaves it
/// unset rather than defaulting it. Humidity, cloud cover and precipitation
/// probability are fractions in `0.0..=1.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherRecord {
    latitude: Option<f64>,
    longitude: Option<f64>,
    temperature: Option<f64>,
    feels_like: Option<f64>,
    temperature_min: Option<f64>,
    temperature_max: Option<f64>,
    humidity: Option<f64>,
    pressure: Option<f64>,
    wind_speed: Option<f64>,
    wind_direction: Option<f64>,
    precipitation: Option<f64>,
    precipitation_probability: Option<f64>,
    cloud_cover: Option<f64>,
    utc_date_time: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    kind: RecordKind,
    #[serde(default)]
    sources: Vec<Source>,
}

impl WeatherRecord {
    pub fn new(kind: RecordKind) -> Self {
        Self {
            latitude: None,
            longitude: None,
            temperature: None,
            feels_like: None,
            temperature_min: None,
            temperature_max: None,
            humidity: None,
            pressure: None,
            wind_speed: None,
            wind_direction: None,
            precipitation: None,
            precipitation_probability: None,
            cloud_cover: None,
            utc_date_time: None,
            kind,
            sources: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_location(mut self, latitude: Option<f64>, longitude: Option<f64>) -> Self {
        self.latitude = latitude;
        self.longitude = longitude;
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, value: Option<f64>) -> Self {
        self.temperature = value;
        self
    }

    #[must_use]
    pub fn with_feels_like(mut self, value: Option<f64>) -> Self {
        self.feels_like = value;
        self
    }

    #[must_use]
    pub fn with_temperature_min(mut self, value: Option<f64>) -> Self {
        self.temperature_min = value;
        self
    }

    #[must_use]
    pub fn with_temperature_max(mut self, value: Option<f64>) -> Self {
        self.temperature_max = value;
        self
    }

    /// Fraction, not percent.
    #[must_use]
    pub fn with_humidity(mut self, value: Option<f64>) -> Self {
        self.humidity = value;
        self
    }

    #[must_use]
    pub fn with_pressure(mut self, value: Option<f64>) -> Self {
        self.pressure = value;
        self
    }

    #[must_use]
    pub fn with_wind_speed(mut self, value: Option<f64>) -> Self {
        self.wind_speed = value;
        self
    }

    #[must_use]
    pub fn with_wind_direction(mut self, value: Option<f64>) -> Self {
        self.wind_direction = value;
        self
    }

    #[must_use]
    pub fn with_precipitation(mut self, value: Option<f64>) -> Self {
        self.precipitation = value;
        self
    }

    #[must_use]
    pub fn with_precipitation_probability(mut self, value: Option<f64>) -> Self {
        self.precipitation_probability = value;
        self
    }

    #[must_use]
    pub fn with_cloud_cover(mut self, value: Option<f64>) -> Self {
        self.cloud_cover = value;
        self
    }

    #[must_use]
    pub fn with_utc_date_time(mut self, value: Option<DateTime<Utc>>) -> Self {
        self.utc_date_time = value;
        self
    }

    #[must_use]
    pub fn with_kind(mut self, kind: RecordKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn with_sources(mut self, sources: &[Source]) -> Self {
        self.sources.extend_from_slice(sources);
        self
    }

    pub fn latitude(&self) -> Option<f64> {
        self.latitude
    }

    pub fn longitude(&self) -> Option<f64> {
        self.longitude
    }

    pub fn temperature(&self) -> Option<f64> {
        self.temperature
    }

    pub fn feels_like(&self) -> Option<f64> {
        self.feels_like
    }

    pub fn temperature_min(&self) -> Option<f64> {
        self.temperature_min
    }

    pub fn temperature_max(&self) -> Option<f64> {
        self.temperature_max
    }

    pub fn humidity(&self) -> Option<f64> {
        self.humidity
    }

    pub fn pressure(&self) -> Option<f64> {
        self.pressure
    }

    pub fn wind_speed(&self) -> Option<f64> {
        self.wind_speed
    }

    pub fn wind_direction(&self) -> Option<f64> {
        self.wind_direction
    }

    pub fn precipitation(&self) -> Option<f64> {
        self.precipitation
    }

    pub fn precipitation_probability(&self) -> Option<f64> {
        self.precipitation_probability
    }

    pub fn cloud_cover(&self) -> Option<f64> {
        self.cloud_cover
    }

    pub fn utc_date_time(&self) -> Option<DateTime<Utc>> {
        self.utc_date_time
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }
}

/// Percent (0-100) to fraction (0-1).
pub fn percent_to_fraction(value: Option<f64>) -> Option<f64> {
    value.map(|v| v / 100.0)
}
