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
    model::{RecordKind, Source, Units, WeatherQuery, WeatherRecord, percent_to_fraction},
    provider::{WeatherProvider, build_url, unix_to_utc},
    transport::Transport,
};

const BASE_URL: &str = "https://weather.visualcrossing.com";

pub const SOURCES: [Source; 1] = [Source::new_static(
    "visualcrossing",
    "Visual Crossing",
    "https://www.visualcrossing.com/",
)];

/// Visual Crossing Timeline API. Days nest their hours.
#[derive(Clone)]
pub struct VisualCrossing {
    transport: Arc<dyn Transport>,
    api_key: String,
    base_url: String,
}

impl VisualCrossing {
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
        ForecastWindow::new(Duration::hours(1))
    }

    fn map_units(units: Units) -> &'static str {
        match units {
            Units::Metric => "metric",
            Units::Imperial => "us",
        }
    }

    /// Without `at` the API returns its default 15 day forecast.
    async fn fetch_timeline(
        &self,
        query: &WeatherQuery,
        at: Option<DateTime<Utc>>,
    ) -> Result<WeatherRecordCollection, WeatherError> {
        let mut base = format!(
            "{}/VisualCrossingWebServices/rest/services/timeline/{},{}",
            self.base_url, query.latitude, query.longitude
        );
        if let Some(at) = at {
            base.push_str(&format!("/{}", at.timestamp()));
        }

        let url = build_url(
            &base,
            &[
                ("key", self.api_key.clone()),
                ("lang", query.lang.clone()),
                ("unitGroup", Self::map_units(query.units).to_string()),
            ],
        )?;

        let body = self.transport.send(Method::GET, &url).await?;
        let parsed: VcResponse = serde_json::from_str(&body)?;

        let latitude = parsed.latitude.unwrap_or(query.latitude);
        let longitude = parsed.longitude.unwrap_or(query.longitude);
        let now = Utc::now();

        let mut collection = WeatherRecordCollection::new();
        for day in parsed.days {
            collection.extend(
                day.hours
                    .into_iter()
                    .map(|hour| map_hour(hour, day.tempmin, day.tempmax, latitude, longitude, now)),
            );
        }

        debug!(records = collection.len(), "Mapped Visual Crossing timeline");
        Ok(collection)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VcHour {
    datetime_epoch: Option<i64>,
    temp: Option<f64>,
    feelslike: Option<f64>,
    humidity: Option<f64>,
    pressure: Option<f64>,
    windspeed: Option<f64>,
    winddir: Option<f64>,
    precip: Option<f64>,
    precipprob: Option<f64>,
    cloudcover: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct VcDay {
    tempmin: Option<f64>,
    tempmax: Option<f64>,
    #[serde(default)]
    hours: Vec<VcHour>,
}

#[derive(Debug, Deserialize)]
struct VcResponse {
    latitude: Option<f64>,
    longitude: Option<f64>,
    days: Vec<VcDay>,
}

/// Every hour carries its day's min/max temperature.
fn map_hour(
    raw: VcHour,
    tempmin: Option<f64>,
    tempmax: Option<f64>,
    latitude: f64,
    longitude: f64,
    now: DateTime<Utc>,
) -> WeatherRecord {
    let timestamp = raw.datetime_epoch.and_then(unix_to_utc);

    WeatherRecord::new(RecordKind::classify(timestamp, now))
        .with_sources(&SOURCES)
        .with_location(Some(latitude), Some(longitude))
        .with_temperature(raw.temp)
        .with_feels_like(raw.feelslike)
        .with_temperature_min(tempmin)
        .with_temperature_max(tempmax)
        .with_humidity(percent_to_fraction(raw.humidity))
        .with_pressure(raw.pressure)
        .with_wind_speed(raw.windspeed)
        .with_wind_direction(raw.winddir)
        .with_precipitation(raw.precip)
        .with_precipitation_probability(percent_to_fraction(raw.precipprob))
        .with_cloud_cover(percent_to_fraction(raw.cloudcover))
        .with_utc_date_time(timestamp)
}

#[async_trait]
impl WeatherProvider for VisualCrossing {
    #[instrument(
        skip(self, query),
        fields(provider = "visualcrossing", lat = %query.latitude, lon = %query.longitude)
    )]
    async fn get_current_weather_data(
        &self,
        query: &WeatherQuery,
    ) -> Result<WeatherRecord, WeatherError> {
        let now = Utc::now();
        let collection = self.fetch_timeline(query, Some(now)).await?;

        collection
            .into_closest(now)
            .map(|record| record.with_kind(RecordKind::Current))
            .ok_or_else(|| {
                WeatherError::UnexpectedResponse("Visual Crossing returned no hours".into())
            })
    }

    #[instrument(
        skip(self, query),
        fields(provider = "visualcrossing", lat = %query.latitude, lon = %query.longitude)
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
        fields(provider = "visualcrossing", lat = %query.latitude, lon = %query.longitude)
    )]
    async fn get_historical(
        &self,
        query: &WeatherQuery,
        at: DateTime<Utc>,
    ) -> Result<Option<WeatherRecord>, WeatherError> {
        let collection = self.fetch_timeline(query, Some(at)).await?;

        collection
            .into_closest(at)
            .map(Some)
            .ok_or(WeatherError::HistoricalDataNotAvailable)
    }

    #[instrument(
        skip(self, query),
        fields(provider = "visualcrossing", lat = %query.latitude, lon = %query.longitude)
    )]
    async fn get_forecast_collection(
        &self,
        query: &WeatherQuery,
    ) -> Result<WeatherRecordCollection, WeatherError> {
        self.fetch_timeline(query, None).await
    }
}
