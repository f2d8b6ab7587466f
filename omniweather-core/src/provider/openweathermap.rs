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
    model::{RecordKind, Source, WeatherQuery, WeatherRecord, percent_to_fraction},
    provider::{WeatherProvider, unix_to_utc},
    transport::Transport,
};

const BASE_URL: &str = "https://api.openweathermap.org";

pub const SOURCES: [Source; 1] = [Source::new_static(
    "openweathermap",
    "OpenWeather",
    "https://openweathermap.org",
)];

/// OpenWeather free tier: current weather plus the 5 day / 3 hour forecast.
#[derive(Clone)]
pub struct OpenWeatherMap {
    transport: Arc<dyn Transport>,
    api_key: String,
    base_url: String,
}

impl OpenWeatherMap {
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
        ForecastWindow::new(Duration::minutes(90))
    }

    /// OpenWeather understands `metric` and `imperial` as is.
    fn url(&self, endpoint: &str, query: &WeatherQuery) -> String {
        format!(
            "{}/data/2.5/{}?lat={}&lon={}&appid={}&units={}&lang={}",
            self.base_url,
            endpoint,
            query.latitude,
            query.longitude,
            self.api_key,
            query.units,
            query.lang,
        )
    }
}

#[derive(Debug, Default, Deserialize)]
struct OwCoord {
    lat: Option<f64>,
    lon: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: Option<f64>,
    feels_like: Option<f64>,
    temp_min: Option<f64>,
    temp_max: Option<f64>,
    pressure: Option<f64>,
    humidity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: Option<f64>,
    deg: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwClouds {
    all: Option<f64>,
}

/// Shape shared by `/weather` and each `/forecast` list entry.
#[derive(Debug, Deserialize)]
struct OwEntry {
    coord: Option<OwCoord>,
    dt: Option<i64>,
    main: Option<OwMain>,
    wind: Option<OwWind>,
    clouds: Option<OwClouds>,
    pop: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwCity {
    coord: Option<OwCoord>,
}

#[derive(Debug, Deserialize)]
struct OwForecastResponse {
    city: Option<OwCity>,
    list: Vec<OwEntry>,
}

fn map_record(kind: RecordKind, raw: OwEntry, latitude: f64, longitude: f64) -> WeatherRecord {
    let coord = raw.coord.unwrap_or_default();

    let mut record = WeatherRecord::new(kind)
        .with_sources(&SOURCES)
        .with_location(
            Some(coord.lat.unwrap_or(latitude)),
            Some(coord.lon.unwrap_or(longitude)),
        )
        .with_precipitation_probability(raw.pop)
        .with_utc_date_time(raw.dt.and_then(unix_to_utc));

    if let Some(main) = raw.main {
        record = record
            .with_temperature(main.temp)
            .with_feels_like(main.feels_like)
            .with_temperature_min(main.temp_min)
            .with_temperature_max(main.temp_max)
            .with_pressure(main.pressure)
            .with_humidity(percent_to_fraction(main.humidity));
    }

    if let Some(wind) = raw.wind {
        record = record
            .with_wind_speed(wind.speed)
            .with_wind_direction(wind.deg);
    }

    if let Some(clouds) = raw.clouds {
        record = record.with_cloud_cover(percent_to_fraction(clouds.all));
    }

    record
}

#[async_trait]
impl WeatherProvider for OpenWeatherMap {
    #[instrument(
        skip(self, query),
        fields(provider = "openweathermap", lat = %query.latitude, lon = %query.longitude)
    )]
    async fn get_current_weather_data(
        &self,
        query: &WeatherQuery,
    ) -> Result<WeatherRecord, WeatherError> {
        let body = self
            .transport
            .send(Method::GET, &self.url("weather", query))
            .await?;
        let parsed: OwEntry = serde_json::from_str(&body)?;

        Ok(map_record(
            RecordKind::Current,
            parsed,
            query.latitude,
            query.longitude,
        ))
    }

    #[instrument(
        skip(self, query),
        fields(provider = "openweathermap", lat = %query.latitude, lon = %query.longitude)
    )]
    async fn get_forecast(
        &self,
        query: &WeatherQuery,
        at: DateTime<Utc>,
    ) -> Result<Option<WeatherRecord>, WeatherError> {
        Self::forecast_window().resolve(self, query, at).await
    }

    /// The free API has no history endpoint.
    async fn get_historical(
        &self,
        _query: &WeatherQuery,
        _at: DateTime<Utc>,
    ) -> Result<Option<WeatherRecord>, WeatherError> {
        Err(WeatherError::HistoricalDataNotAvailable)
    }

    #[instrument(
        skip(self, query),
        fields(provider = "openweathermap", lat = %query.latitude, lon = %query.longitude)
    )]
    async fn get_forecast_collection(
        &self,
        query: &WeatherQuery,
    ) -> Result<WeatherRecordCollection, WeatherError> {
        let body = self
            .transport
            .send(Method::GET, &self.url("forecast", query))
            .await?;
        let parsed: OwForecastResponse = serde_json::from_str(&body)?;

        // Forecasts are snapped to a city; its coordinates take precedence.
        let city = parsed
            .city
            .and_then(|c| c.coord)
            .unwrap_or_default();
        let latitude = city.lat.unwrap_or(query.latitude);
        let longitude = city.lon.unwrap_or(query.longitude);

        let collection: WeatherRecordCollection = parsed
            .list
            .into_iter()
            .map(|entry| map_record(RecordKind::Forecast, entry, latitude, longitude))
            .collect();

        debug!(records = collection.len(), "Mapped OpenWeather forecast");
        Ok(collection)
    }
}
