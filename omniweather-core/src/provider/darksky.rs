use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::{
    collection::WeatherRecordCollection,
    error::WeatherError,
    forecast_window::ForecastWindow,
    model::{RecordKind, Source, Units, WeatherQuery, WeatherRecord},
    provider::{WeatherProvider, unix_to_utc},
    transport::Transport,
};

const BASE_URL: &str = "https://api.darksky.net";

pub const SOURCES: [Source; 1] = [Source::new_static(
    "darksky",
    "Dark Sky",
    "https://darksky.net/poweredby/",
)];

#[derive(Clone)]
pub struct DarkSky {
    transport: Arc<dyn Transport>,
    api_key: String,
    base_url: String,
}

impl DarkSky {
    pub fn new(transport: Arc<dyn Transport>, api_key: String) -> Self {
        Self {
            transport,
            api_key,
            base_url: BASE_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn forecast_window() -> ForecastWindow {
        ForecastWindow::new(Duration::hours(12))
    }

    fn map_units(units: Units) -> &'static str {
        match units {
            Units::Metric => "si",
            Units::Imperial => "us",
        }
    }

    /// Time Machine request: the `currently` block at one instant.
    async fn fetch_at(
        &self,
        query: &WeatherQuery,
        at: DateTime<Utc>,
        kind: RecordKind,
    ) -> Result<WeatherRecord, WeatherError> {
        let url = format!(
            "{}/forecast/{}/{},{},{}?lang={}&units={}&exclude=minutely,hourly,daily",
            self.base_url,
            self.api_key,
            query.latitude,
            query.longitude,
            at.timestamp(),
            query.lang,
            Self::map_units(query.units),
        );

        let body = self.transport.send(Method::GET, &url).await?;
        let parsed: DsResponse = serde_json::from_str(&body)?;
        let (latitude, longitude) = parsed.location(query);

        let currently = parsed.currently.ok_or_else(|| {
            WeatherError::UnexpectedResponse("Dark Sky response has no `currently` block".into())
        })?;

        Ok(map_record(kind, currently, latitude, longitude))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DsDataPoint {
    time: Option<i64>,
    temperature: Option<f64>,
    temperature_min: Option<f64>,
    temperature_max: Option<f64>,
    apparent_temperature: Option<f64>,
    humidity: Option<f64>,
    pressure: Option<f64>,
    wind_speed: Option<f64>,
    wind_bearing: Option<f64>,
    precip_intensity: Option<f64>,
    precip_probability: Option<f64>,
    cloud_cover: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DsDataBlock {
    #[serde(default)]
    data: Vec<DsDataPoint>,
}

#[derive(Debug, Deserialize)]
struct DsResponse {
    latitude: Option<f64>,
    longitude: Option<f64>,
    currently: Option<DsDataPoint>,
    minutely: Option<DsDataBlock>,
    hourly: Option<DsDataBlock>,
    daily: Option<DsDataBlock>,
}

impl DsResponse {
    /// Coordinates echoed by the API win over the requested ones.
    fn location(&self, query: &WeatherQuery) -> (f64, f64) {
        (
            self.latitude.unwrap_or(query.latitude),
            self.longitude.unwrap_or(query.longitude),
        )
    }
}

/// Humidity, cloud cover and precipitation probability already arrive as fractions.
fn map_record(kind: RecordKind, raw: DsDataPoint, latitude: f64, longitude: f64) -> WeatherRecord {
    WeatherRecord::new(kind)
        .with_sources(&SOURCES)
        .with_location(Some(latitude), Some(longitude))
        .with_temperature(raw.temperature)
        .with_temperature_min(raw.temperature_min)
        .with_temperature_max(raw.temperature_max)
        .with_feels_like(raw.apparent_temperature)
        .with_humidity(raw.humidity)
        .with_pressure(raw.pressure)
        .with_wind_speed(raw.wind_speed)
        .with_wind_direction(raw.wind_bearing)
        .with_precipitation(raw.precip_intensity)
        .with_precipitation_probability(raw.precip_probability)
        .with_cloud_cover(raw.cloud_cover)
        .with_utc_date_time(raw.time.and_then(unix_to_utc))
}

#[async_trait]
impl WeatherProvider for DarkSky {
    #[instrument(
        skip(self, query),
        fields(provider = "darksky", lat = %query.latitude, lon = %query.longitude)
    )]
    async fn get_current_weather_data(
        &self,
        query: &WeatherQuery,
    ) -> Result<WeatherRecord, WeatherError> {
        self.fetch_at(query, Utc::now(), RecordKind::Current).await
    }

    #[instrument(
        skip(self, query),
        fields(provider = "darksky", lat = %query.latitude, lon = %query.longitude)
    )]
    async fn get_forecast(
        &self,
        query: &WeatherQuery,
        at: DateTime<Utc>,
    ) -> Result<Option<WeatherRecord>, WeatherError> {
        Self::forecast_window().resolve(self, query, at).await
    }

    #[instrument(
        skip(self, query),
        fields(provider = "darksky", lat = %query.latitude, lon = %query.longitude)
    )]
    async fn get_historical(
        &self,
        query: &WeatherQuery,
        at: DateTime<Utc>,
    ) -> Result<Option<WeatherRecord>, WeatherError> {
        self.fetch_at(query, at, RecordKind::Historical)
            .await
            .map(Some)
    }

    #[instrument(
        skip(self, query),
        fields(provider = "darksky", lat = %query.latitude, lon = %query.longitude)
    )]
    async fn get_forecast_collection(
        &self,
        query: &WeatherQuery,
    ) -> Result<WeatherRecordCollection, WeatherError> {
        let url = format!(
            "{}/forecast/{}/{},{}?lang={}&units={}",
            self.base_url,
            self.api_key,
            query.latitude,
            query.longitude,
            query.lang,
            Self::map_units(query.units),
        );

        let body = self.transport.send(Method::GET, &url).await?;
        let parsed: DsResponse = serde_json::from_str(&body)?;
        let (latitude, longitude) = parsed.location(query);

        let mut collection = WeatherRecordCollection::new();

        if let Some(currently) = parsed.currently {
            collection.push(map_record(RecordKind::Current, currently, latitude, longitude));
        }

        for block in [parsed.minutely, parsed.hourly, parsed.daily]
            .into_iter()
            .flatten()
        {
            collection.extend(
                block
                    .data
                    .into_iter()
                    .map(|point| map_record(RecordKind::Forecast, point, latitude, longitude)),
            );
        }

        debug!(records = collection.len(), "Mapped Dark Sky forecast");
        Ok(collection)
    }
}
