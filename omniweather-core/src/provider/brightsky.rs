use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use reqwest::Method;
use serde::{Deserialize, Deserializer};
use tracing::instrument;

use crate::{
    collection::WeatherRecordCollection,
    error::WeatherError,
    forecast_window::ForecastWindow,
    model::{RecordKind, Source, Units, WeatherQuery, WeatherRecord, percent_to_fraction},
    provider::{WeatherProvider, build_url, parse_utc},
    transport::Transport,
};

const BASE_URL: &str = "https://api.brightsky.dev";

pub const SOURCES: [Source; 2] = [
    Source::new_static("brightsky", "Bright Sky", "https://brightsky.dev/"),
    Source::new_static("dwd", "Deutscher Wetterdienst", "https://www.dwd.de/"),
];

/// Bright Sky, a free JSON front end for Deutscher Wetterdienst data. No API key.
#[derive(Clone)]
pub struct BrightSky {
    transport: Arc<dyn Transport>,
    base_url: String,
}

impl BrightSky {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            base_url: BASE_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn forecast_window() -> ForecastWindow {
        ForecastWindow::new(Duration::days(10))
    }

    /// How far ahead the forecast collection reaches.
    fn forecast_span() -> Duration {
        Duration::days(10)
    }

    fn map_units(units: Units) -> &'static str {
        match units {
            Units::Imperial => "si",
            Units::Metric => "dwd",
        }
    }

    async fn fetch_hours(
        &self,
        query: &WeatherQuery,
        date: DateTime<Utc>,
        last_date: Option<DateTime<Utc>>,
    ) -> Result<WeatherRecordCollection, WeatherError> {
        let mut params = vec![("date", format_date(date))];
        if let Some(last) = last_date {
            params.push(("last_date", format_date(last)));
        }
        params.extend([
            ("lat", query.latitude.to_string()),
            ("lon", query.longitude.to_string()),
            ("units", Self::map_units(query.units).to_string()),
        ]);

        let url = build_url(&format!("{}/weather", self.base_url), &params)?;
        let body = self.transport.send(Method::GET, &url).await?;
        let parsed: BsWeatherResponse = serde_json::from_str(&body)?;

        let now = Utc::now();
        Ok(parsed
            .weather
            .into_iter()
            .map(|hour| map_record(query, hour, None, now))
            .collect())
    }
}

fn format_date(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Hourly (`/weather`) and ten-minute (`/current_weather`) payloads name some fields
/// differently; both spellings are accepted.
///
/// The outer `Option` of a primary field records whether the key was present at all,
/// so an explicit `null` does not fall through to the `_10` spelling.
#[derive(Debug, Deserialize)]
struct BsRecord {
    timestamp: Option<String>,
    temperature: Option<f64>,
    relative_humidity: Option<f64>,
    pressure_msl: Option<f64>,
    #[serde(default, deserialize_with = "present")]
    wind_speed: Option<Option<f64>>,
    wind_speed_10: Option<f64>,
    #[serde(default, deserialize_with = "present")]
    wind_direction: Option<Option<f64>>,
    wind_direction_10: Option<f64>,
    #[serde(default, deserialize_with = "present")]
    precipitation: Option<Option<f64>>,
    precipitation_10: Option<f64>,
    cloud_cover: Option<f64>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Option<f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<f64>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
struct BsCurrentResponse {
    weather: BsRecord,
}

#[derive(Debug, Deserialize)]
struct BsWeatherResponse {
    #[serde(default)]
    weather: Vec<BsRecord>,
}

fn map_record(
    query: &WeatherQuery,
    raw: BsRecord,
    kind: Option<RecordKind>,
    now: DateTime<Utc>,
) -> WeatherRecord {
    let timestamp = raw.timestamp.as_deref().and_then(parse_utc);
    let kind = kind.unwrap_or_else(|| RecordKind::classify(timestamp, now));

    WeatherRecord::new(kind)
        .with_sources(&SOURCES)
        .with_location(Some(query.latitude), Some(query.longitude))
        .with_utc_date_time(timestamp)
        .with_temperature(raw.temperature)
        .with_humidity(percent_to_fraction(raw.relative_humidity))
        .with_pressure(raw.pressure_msl)
        .with_wind_speed(raw.wind_speed.unwrap_or(raw.wind_speed_10))
        .with_wind_direction(raw.wind_direction.unwrap_or(raw.wind_direction_10))
        .with_precipitation(raw.precipitation.unwrap_or(raw.precipitation_10))
        .with_cloud_cover(percent_to_fraction(raw.cloud_cover))
}

#[async_trait]
impl WeatherProvider for BrightSky {
    #[instrument(
        skip(self, query),
        fields(provider = "brightsky", lat = %query.latitude, lon = %query.longitude)
    )]
    async fn get_current_weather_data(
        &self,
        query: &WeatherQuery,
    ) -> Result<WeatherRecord, WeatherError> {
        let url = build_url(
            &format!("{}/current_weather", self.base_url),
            &[
                ("lat", query.latitude.to_string()),
                ("lon", query.longitude.to_string()),
                ("units", Self::map_units(query.units).to_string()),
            ],
        )?;

        let body = self.transport.send(Method::GET, &url).await?;
        let parsed: BsCurrentResponse = serde_json::from_str(&body)?;

        // The ten-minute observation usually lags a little behind now; it is still current.
        Ok(map_record(
            query,
            parsed.weather,
            Some(RecordKind::Current),
            Utc::now(),
        ))
    }

    #[instrument(
        skip(self, query),
        fields(provider = "brightsky", lat = %query.latitude, lon = %query.longitude)
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
        fields(provider = "brightsky", lat = %query.latitude, lon = %query.longitude)
    )]
    async fn get_historical(
        &self,
        query: &WeatherQuery,
        at: DateTime<Utc>,
    ) -> Result<Option<WeatherRecord>, WeatherError> {
        let collection = self.fetch_hours(query, at, None).await?;

        collection
            .into_closest(at)
            .map(Some)
            .ok_or(WeatherError::HistoricalDataNotAvailable)
    }

    #[instrument(
        skip(self, query),
        fields(provider = "brightsky", lat = %query.latitude, lon = %query.longitude)
    )]
    async fn get_forecast_collection(
        &self,
        query: &WeatherQuery,
    ) -> Result<WeatherRecordCollection, WeatherError> {
        let now = Utc::now();
        self.fetch_hours(query, now, Some(now + Self::forecast_span()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::test_support::{transport_returning, transport_unused};
    use chrono::TimeZone;
    use std::sync::Mutex;

    const CURRENT: &str = r#"{
        "weather": {
            "timestamp": "2023-08-07T12:30:00+00:00",
            "source_id": 1234,
            "cloud_cover": 87,
            "condition": "dry",
            "pressure_msl": 1015.2,
            "relative_humidity": 56,
            "temperature": 18.4,
            "wind_direction_10": 230,
            "wind_speed_10": 11.2,
            "precipitation_10": 0.0
        }
    }"#;

    const HOURLY: &str = r#"{
        "weather": [
            {
                "timestamp": "2020-04-21T00:00:00+02:00",
                "cloud_cover": 0,
                "pressure_msl": 1021.3,
                "relative_humidity": 48,
                "temperature": 7.4,
                "wind_direction": 60,
                "wind_speed": 7.6,
                "wind_direction_10": 999,
                "precipitation": 0.1
            },
            {
                "timestamp": "2020-04-21T01:00:00+02:00",
                "cloud_cover": null,
                "pressure_msl": 1021.1,
                "relative_humidity": 52,
                "temperature": 6.9,
                "wind_direction": 70,
                "wind_speed": 6.5,
                "precipitation": 0.0
            }
        ],
        "sources": []
    }"#;

    fn urls() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[tokio::test]
    async fn current_uses_ten_minute_fields_and_forces_current() {
        let seen = urls();
        let provider = BrightSky::new(transport_returning(CURRENT, seen.clone()));

        let record = provider
            .get_current_weather_data(&WeatherQuery::new(52.52, 13.4))
            .await
            .unwrap();

        assert_eq!(record.kind(), RecordKind::Current);
        assert_eq!(record.temperature(), Some(18.4));
        assert_eq!(record.humidity(), Some(0.56));
        assert_eq!(record.cloud_cover(), Some(0.87));
        assert_eq!(record.wind_speed(), Some(11.2));
        assert_eq!(record.wind_direction(), Some(230.0));
        assert_eq!(record.precipitation(), Some(0.0));
        assert_eq!(record.pressure(), Some(1015.2));
        assert_eq!(record.latitude(), Some(52.52));
        assert_eq!(
            record.utc_date_time(),
            Some(Utc.with_ymd_and_hms(2023, 8, 7, 12, 30, 0).unwrap())
        );
        assert_eq!(record.sources(), &SOURCES[..]);

        assert_eq!(
            seen.lock().unwrap().as_slice(),
            ["https://api.brightsky.dev/current_weather?lat=52.52&lon=13.4&units=dwd"]
        );
    }

    #[tokio::test]
    async fn historical_picks_closest_hour_and_prefers_primary_field_names() {
        let seen = urls();
        let provider = BrightSky::new(transport_returning(HOURLY, seen.clone()));
        let at = Utc.with_ymd_and_hms(2020, 4, 20, 22, 10, 0).unwrap();

        let record = provider
            .get_historical(&WeatherQuery::new(52.0, 7.6).with_units(Units::Imperial), at)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(record.kind(), RecordKind::Historical);
        assert_eq!(record.temperature(), Some(7.4));
        assert_eq!(record.wind_direction(), Some(60.0));
        assert_eq!(record.cloud_cover(), Some(0.0));
        assert_eq!(
            record.utc_date_time(),
            Some(Utc.with_ymd_and_hms(2020, 4, 20, 22, 0, 0).unwrap())
        );

        let url = seen.lock().unwrap()[0].clone();
        assert_eq!(
            url,
            "https://api.brightsky.dev/weather?date=2020-04-20T22%3A10%3A00%2B00%3A00&lat=52&lon=7.6&units=si"
        );
    }

    #[tokio::test]
    async fn null_values_stay_unset() {
        let provider = BrightSky::new(transport_returning(HOURLY, urls()));
        let at = Utc.with_ymd_and_hms(2020, 4, 20, 23, 0, 0).unwrap();

        let record = provider
            .get_historical(&WeatherQuery::new(52.0, 7.6), at)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(record.temperature(), Some(6.9));
        assert_eq!(record.cloud_cover(), None);
    }

    #[tokio::test]
    async fn explicit_null_primary_field_does_not_fall_back() {
        let provider = BrightSky::new(transport_returning(
            r#"{"weather": {
                "timestamp": "2023-08-07T12:30:00+00:00",
                "wind_speed": null,
                "wind_speed_10": 11.2,
                "wind_direction_10": 230
            }}"#,
            urls(),
        ));

        let record = provider
            .get_current_weather_data(&WeatherQuery::new(52.52, 13.4))
            .await
            .unwrap();

        assert_eq!(record.wind_speed(), None);
        assert_eq!(record.wind_direction(), Some(230.0));
        assert_eq!(record.precipitation(), None);
    }

    #[tokio::test]
    async fn historical_without_hours_is_not_available() {
        let provider = BrightSky::new(transport_returning(r#"{"weather": []}"#, urls()));
        let err = provider
            .get_historical(&WeatherQuery::new(52.0, 7.6), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, WeatherError::HistoricalDataNotAvailable));
    }

    #[tokio::test]
    async fn forecast_collection_requests_ten_days() {
        let seen = urls();
        let provider = BrightSky::new(transport_returning(HOURLY, seen.clone()));

        let collection = provider
            .get_forecast_collection(&WeatherQuery::new(52.0, 7.6))
            .await
            .unwrap();
        assert_eq!(collection.len(), 2);

        let url = seen.lock().unwrap()[0].clone();
        assert!(url.starts_with("https://api.brightsky.dev/weather?date="));
        assert!(url.contains("&last_date="));
        assert!(url.ends_with("&lat=52&lon=7.6&units=dwd"));
    }

    #[tokio::test]
    async fn forecast_for_past_date_fails_without_request() {
        let provider = BrightSky::new(transport_unused());
        let err = provider
            .get_forecast(&WeatherQuery::new(52.0, 7.6), Utc::now() - Duration::hours(1))
            .await
            .unwrap_err();
        assert!(matches!(err, WeatherError::DateNotInFuture));
    }

    #[tokio::test]
    async fn malformed_json_is_a_decode_error() {
        let provider = BrightSky::new(transport_returning("<html>", urls()));
        let err = provider
            .get_current_weather_data(&WeatherQuery::new(52.0, 7.6))
            .await
            .unwrap_err();
        assert!(matches!(err, WeatherError::Decode(_)));
    }
}
