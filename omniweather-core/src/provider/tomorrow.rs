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
    provider::{WeatherProvider, parse_utc},
    transport::Transport,
};

const BASE_URL: &str = "https://api.tomorrow.io";

pub const SOURCES: [Source; 1] = [Source::new_static(
    "tomorrow",
    "tomorrow.io",
    "https://www.tomorrow.io/",
)];

const FIELDS: [&str; 14] = [
    "temperature",
    "windSpeed",
    "windDirection",
    "precipitationIntensity",
    "precipitationProbability",
    "pressureSeaLevel",
    "humidity",
    "precipitationType",
    "windGust",
    "temperatureApparent",
    "cloudCover",
    "cloudBase",
    "cloudCeiling",
    "weatherCode",
];

/// Tomorrow.io Timelines API.
#[derive(Clone)]
pub struct Tomorrow {
    transport: Arc<dyn Transport>,
    api_key: String,
    base_url: String,
}

impl Tomorrow {
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

    /// The timeline only ever contains future hours, so no future check is needed.
    pub fn forecast_window() -> ForecastWindow {
        ForecastWindow::new(Duration::hours(1)).without_future_check()
    }

    /// Oldest data the timeline endpoint still serves.
    pub fn history_limit() -> Duration {
        Duration::hours(5) + Duration::minutes(45)
    }

    /// The API wants repeated keys (`fields=a&fields=b`) and unescaped values.
    fn timelines_url(
        &self,
        query: &WeatherQuery,
        timesteps: &[&str],
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> String {
        let mut parts = vec![format!("location={},{}", query.latitude, query.longitude)];
        parts.extend(FIELDS.iter().map(|f| format!("fields={f}")));
        parts.push(format!("units={}", query.units));
        parts.extend(timesteps.iter().map(|t| format!("timesteps={t}")));
        if let Some(start) = start {
            parts.push(format!("startTime={}", format_time(start)));
        }
        parts.push(format!("apikey={}", self.api_key));
        if let Some(end) = end {
            parts.push(format!("endTime={}", format_time(end)));
        }

        format!("{}/v4/timelines?{}", self.base_url, parts.join("&"))
    }

    async fn fetch_timelines(&self, url: &str) -> Result<TmResponse, WeatherError> {
        let body = self.transport.send(Method::GET, url).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn fetch_collection(
        &self,
        query: &WeatherQuery,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<WeatherRecordCollection, WeatherError> {
        let url = self.timelines_url(query, &["current", "1h"], Some(start), end);
        let parsed = self.fetch_timelines(&url).await?;
        let now = Utc::now();

        let mut collection = WeatherRecordCollection::new();
        for timeline in parsed.data.map(|d| d.timelines).unwrap_or_default() {
            let kind = (timeline.timestep.as_deref() == Some("current"))
                .then_some(RecordKind::Current);
            collection.extend(
                timeline
                    .intervals
                    .into_iter()
                    .filter_map(|interval| map_interval(query, interval, kind, now)),
            );
        }

        debug!(records = collection.len(), "Mapped Tomorrow.io timelines");
        Ok(collection)
    }
}

fn format_time(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[derive(Debug, Deserialize)]
struct TmResponse {
    data: Option<TmData>,
}

#[derive(Debug, Deserialize)]
struct TmData {
    #[serde(default)]
    timelines: Vec<TmTimeline>,
}

#[derive(Debug, Deserialize)]
struct TmTimeline {
    timestep: Option<String>,
    #[serde(default)]
    intervals: Vec<TmInterval>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TmInterval {
    start_time: Option<String>,
    values: Option<TmValues>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TmValues {
    temperature: Option<f64>,
    temperature_apparent: Option<f64>,
    humidity: Option<f64>,
    pressure_sea_level: Option<f64>,
    wind_speed: Option<f64>,
    wind_direction: Option<f64>,
    precipitation_intensity: Option<f64>,
    precipitation_probability: Option<f64>,
    cloud_cover: Option<f64>,
}

/// Intervals without a start time are dropped.
fn map_interval(
    query: &WeatherQuery,
    raw: TmInterval,
    kind: Option<RecordKind>,
    now: DateTime<Utc>,
) -> Option<WeatherRecord> {
    let timestamp = parse_utc(raw.start_time.as_deref()?)?;
    let kind = kind.unwrap_or_else(|| RecordKind::classify(Some(timestamp), now));

    let mut record = WeatherRecord::new(kind)
        .with_sources(&SOURCES)
        .with_location(Some(query.latitude), Some(query.longitude))
        .with_utc_date_time(Some(timestamp));

    if let Some(values) = raw.values {
        record = record
            .with_temperature(values.temperature)
            .with_feels_like(values.temperature_apparent)
            .with_humidity(percent_to_fraction(values.humidity))
            .with_pressure(values.pressure_sea_level)
            .with_wind_speed(values.wind_speed)
            .with_wind_direction(values.wind_direction)
            .with_precipitation(values.precipitation_intensity)
            .with_precipitation_probability(percent_to_fraction(values.precipitation_probability))
            .with_cloud_cover(percent_to_fraction(values.cloud_cover));
    }

    Some(record)
}

#[async_trait]
impl WeatherProvider for Tomorrow {
    #[instrument(
        skip(self, query),
        fields(provider = "tomorrow", lat = %query.latitude, lon = %query.longitude)
    )]
    async fn get_current_weather_data(
        &self,
        query: &WeatherQuery,
    ) -> Result<WeatherRecord, WeatherError> {
        let url = self.timelines_url(query, &["current"], None, None);
        let parsed = self.fetch_timelines(&url).await?;

        let interval = parsed
            .data
            .and_then(|d| d.timelines.into_iter().next())
            .and_then(|t| t.intervals.into_iter().next())
            .ok_or_else(|| {
                WeatherError::UnexpectedResponse("Tomorrow.io returned no current interval".into())
            })?;

        map_interval(query, interval, Some(RecordKind::Current), Utc::now()).ok_or_else(|| {
            WeatherError::UnexpectedResponse(
                "Tomorrow.io current interval has no start time".into(),
            )
        })
    }

    #[instrument(
        skip(self, query),
        fields(provider = "tomorrow", lat = %query.latitude, lon = %query.longitude)
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
        fields(provider = "tomorrow", lat = %query.latitude, lon = %query.longitude)
    )]
    async fn get_historical(
        &self,
        query: &WeatherQuery,
        at: DateTime<Utc>,
    ) -> Result<Option<WeatherRecord>, WeatherError> {
        let now = Utc::now();
        if at < now - Self::history_limit() {
            return Err(WeatherError::HistoricalDataNotAvailable);
        }

        let collection = self.fetch_collection(query, at, Some(now)).await?;

        collection
            .into_closest(at)
            .map(Some)
            .ok_or(WeatherError::HistoricalDataNotAvailable)
    }

    #[instrument(
        skip(self, query),
        fields(provider = "tomorrow", lat = %query.latitude, lon = %query.longitude)
    )]
    async fn get_forecast_collection(
        &self,
        query: &WeatherQuery,
    ) -> Result<WeatherRecordCollection, WeatherError> {
        self.fetch_collection(query, Utc::now(), None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::test_support::{transport_returning, transport_unused};
    use chrono::TimeZone;
    use std::sync::Mutex;

    const CURRENT: &str = r#"{
        "data": { "timelines": [ {
            "timestep": "current",
            "startTime": "2021-03-20T14:42:00Z",
            "intervals": [ {
                "startTime": "2021-03-20T14:42:00Z",
                "values": {
                    "temperature": 9.63,
                    "temperatureApparent": 8.1,
                    "humidity": 87,
                    "pressureSeaLevel": 1023.5,
                    "windSpeed": 3.5,
                    "windDirection": 190.2,
                    "precipitationIntensity": 0.1,
                    "precipitationProbability": 25,
                    "cloudCover": 100
                }
            } ]
        } ] }
    }"#;

    const TIMELINES: &str = r#"{
        "data": { "timelines": [
            {
                "timestep": "1h",
                "intervals": [
                    { "startTime": "2021-03-20T14:00:00Z", "values": { "temperature": 9.0 } },
                    { "startTime": "2021-03-20T15:00:00Z", "values": { "temperature": 10.0 } },
                    { "values": { "temperature": 99.0 } }
                ]
            },
            {
                "timestep": "current",
                "intervals": [
                    { "startTime": "2021-03-20T14:42:00Z", "values": { "temperature": 9.63 } }
                ]
            }
        ] }
    }"#;

    fn urls() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[tokio::test]
    async fn current_normalizes_percentages() {
        let seen = urls();
        let provider = Tomorrow::new(transport_returning(CURRENT, seen.clone()), "KEY".into());

        let record = provider
            .get_current_weather_data(&WeatherQuery::new(42.3478, -71.0466))
            .await
            .unwrap();

        assert_eq!(record.kind(), RecordKind::Current);
        assert_eq!(record.humidity(), Some(0.87));
        assert_eq!(record.cloud_cover(), Some(1.0));
        assert_eq!(record.precipitation_probability(), Some(0.25));
        assert_eq!(record.feels_like(), Some(8.1));
        assert_eq!(record.pressure(), Some(1023.5));
        assert_eq!(record.wind_direction(), Some(190.2));
        assert_eq!(
            record.utc_date_time(),
            Some(Utc.with_ymd_and_hms(2021, 3, 20, 14, 42, 0).unwrap())
        );

        let url = seen.lock().unwrap()[0].clone();
        assert!(url.starts_with(
            "https://api.tomorrow.io/v4/timelines?location=42.3478,-71.0466&fields=temperature&fields=windSpeed&"
        ));
        assert!(url.ends_with("&fields=weatherCode&units=metric&timesteps=current&apikey=KEY"));
    }

    #[tokio::test]
    async fn current_without_intervals_fails() {
        let provider = Tomorrow::new(
            transport_returning(r#"{"data": {"timelines": []}}"#, urls()),
            "KEY".into(),
        );
        let err = provider
            .get_current_weather_data(&WeatherQuery::new(1.0, 2.0))
            .await
            .unwrap_err();
        assert!(matches!(err, WeatherError::UnexpectedResponse(_)));
    }

    #[tokio::test]
    async fn collection_tags_current_timeline_and_skips_untimed_intervals() {
        let seen = urls();
        let provider = Tomorrow::new(transport_returning(TIMELINES, seen.clone()), "KEY".into());

        let collection = provider
            .get_forecast_collection(&WeatherQuery::new(1.0, 2.0))
            .await
            .unwrap();

        let kinds: Vec<_> = collection.iter().map(|r| r.kind()).collect();
        assert_eq!(
            kinds,
            vec![RecordKind::Historical, RecordKind::Historical, RecordKind::Current]
        );
        assert_eq!(
            collection.max_date(),
            Some(Utc.with_ymd_and_hms(2021, 3, 20, 15, 0, 0).unwrap())
        );

        let url = seen.lock().unwrap()[0].clone();
        assert!(url.contains("&timesteps=current&timesteps=1h&startTime="));
        assert!(!url.contains("endTime="));
    }

    #[tokio::test]
    async fn history_older_than_limit_fails_without_request() {
        let provider = Tomorrow::new(transport_unused(), "KEY".into());
        let err = provider
            .get_historical(&WeatherQuery::new(1.0, 2.0), Utc::now() - Duration::hours(6))
            .await
            .unwrap_err();
        assert!(matches!(err, WeatherError::HistoricalDataNotAvailable));
    }

    #[tokio::test]
    async fn recent_history_queries_bounded_window() {
        let seen = urls();
        let provider = Tomorrow::new(transport_returning(TIMELINES, seen.clone()), "KEY".into());
        let at = Utc::now() - Duration::hours(1);

        let record = provider
            .get_historical(&WeatherQuery::new(1.0, 2.0), at)
            .await
            .unwrap()
            .unwrap();
        // Fixture data is old; the latest hour is nearest.
        assert_eq!(record.temperature(), Some(10.0));

        let url = seen.lock().unwrap()[0].clone();
        let start = format!("&startTime={}&apikey=KEY&endTime=", format_time(at));
        assert!(url.contains(&start), "unexpected parameter order: {url}");
    }

    #[tokio::test]
    async fn forecast_skips_future_check() {
        let provider = Tomorrow::new(transport_returning(TIMELINES, urls()), "KEY".into());
        let at = Utc.with_ymd_and_hms(2021, 3, 20, 14, 10, 0).unwrap();

        let record = provider
            .get_forecast(&WeatherQuery::new(1.0, 2.0), at)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.temperature(), Some(9.0));
    }

    #[test]
    fn time_format_is_zulu_seconds() {
        let t = Utc.with_ymd_and_hms(2021, 3, 20, 4, 5, 6).unwrap();
        assert_eq!(format_time(t), "2021-03-20T04:05:06Z");
    }
}
