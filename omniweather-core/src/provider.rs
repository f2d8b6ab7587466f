use crate::{
    Config, WeatherQuery, WeatherRecord,
    collection::WeatherRecordCollection,
    error::WeatherError,
    provider::{
        brightsky::BrightSky, chain::ChainProvider, darksky::DarkSky,
        openweathermap::OpenWeatherMap, tomorrow::Tomorrow, visualcrossing::VisualCrossing,
    },
    transport::Transport,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use std::sync::Arc;
use tracing::debug;

pub mod brightsky;
pub mod chain;
pub mod darksky;
pub mod openweathermap;
pub mod tomorrow;
pub mod visualcrossing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    BrightSky,
    DarkSky,
    OpenWeatherMap,
    Tomorrow,
    VisualCrossing,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::BrightSky => "brightsky",
            ProviderId::DarkSky => "darksky",
            ProviderId::OpenWeatherMap => "openweathermap",
            ProviderId::Tomorrow => "tomorrow",
            ProviderId::VisualCrossing => "visualcrossing",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[
            ProviderId::BrightSky,
            ProviderId::DarkSky,
            ProviderId::OpenWeatherMap,
            ProviderId::Tomorrow,
            ProviderId::VisualCrossing,
        ]
    }

    /// Bright Sky is the only keyless API.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, ProviderId::BrightSky)
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "brightsky" => Ok(ProviderId::BrightSky),
            "darksky" => Ok(ProviderId::DarkSky),
            "openweathermap" => Ok(ProviderId::OpenWeatherMap),
            "tomorrow" => Ok(ProviderId::Tomorrow),
            "visualcrossing" => Ok(ProviderId::VisualCrossing),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: brightsky, darksky, \
                 openweathermap, tomorrow, visualcrossing."
            )),
        }
    }
}

/// The operations every weather API is mapped onto.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn get_current_weather_data(
        &self,
        query: &WeatherQuery,
    ) -> Result<WeatherRecord, WeatherError>;

    async fn get_forecast(
        &self,
        query: &WeatherQuery,
        at: DateTime<Utc>,
    ) -> Result<Option<WeatherRecord>, WeatherError>;

    async fn get_historical(
        &self,
        query: &WeatherQuery,
        at: DateTime<Utc>,
    ) -> Result<Option<WeatherRecord>, WeatherError>;

    async fn get_forecast_collection(
        &self,
        query: &WeatherQuery,
    ) -> Result<WeatherRecordCollection, WeatherError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateRequest {
    Current,
    Past(DateTime<Utc>),
    Future(DateTime<Utc>),
}

pub fn classify_date(now: DateTime<Utc>, when: Option<DateTime<Utc>>) -> DateRequest {
    match when {
        None => DateRequest::Current,
        Some(dt) if dt > now => DateRequest::Future(dt),
        Some(dt) => DateRequest::Past(dt),
    }
}

/// Current weather when `when` is absent, otherwise historical or forecast data
/// depending on which side of now it falls.
pub async fn fetch_weather(
    provider: &dyn WeatherProvider,
    query: &WeatherQuery,
    when: Option<DateTime<Utc>>,
) -> Result<Option<WeatherRecord>, WeatherError> {
    match classify_date(Utc::now(), when) {
        DateRequest::Current => provider.get_current_weather_data(query).await.map(Some),
        DateRequest::Past(dt) => provider.get_historical(query, dt).await,
        DateRequest::Future(dt) => provider.get_forecast(query, dt).await,
    }
}

/// Construct a provider from config and explicit ProviderId.
pub fn provider_from_config(
    id: ProviderId,
    config: &Config,
    transport: Arc<dyn Transport>,
) -> anyhow::Result<Box<dyn WeatherProvider>> {
    let api_key = || {
        config
            .provider_api_key(id)
            .map(str::to_owned)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "No API key configured for provider '{id}'.\n\
                     Hint: run `omniweather configure {id}` and enter your API key."
                )
            })
    };

    let boxed: Box<dyn WeatherProvider> = match id {
        ProviderId::BrightSky => Box::new(BrightSky::new(transport)),
        ProviderId::DarkSky => Box::new(DarkSky::new(transport, api_key()?)),
        ProviderId::OpenWeatherMap => Box::new(OpenWeatherMap::new(transport, api_key()?)),
        ProviderId::Tomorrow => Box::new(Tomorrow::new(transport, api_key()?)),
        ProviderId::VisualCrossing => Box::new(VisualCrossing::new(transport, api_key()?)),
    };

    Ok(boxed)
}

/// Construct the configured provider chain, first entry tried first.
pub fn chain_from_config(
    config: &Config,
    transport: Arc<dyn Transport>,
) -> anyhow::Result<Box<dyn WeatherProvider>> {
    let ids = config.chain_ids()?;
    debug!(chain = ?ids, "Building provider chain");

    let providers = ids
        .into_iter()
        .map(|id| provider_from_config(id, config, Arc::clone(&transport)))
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(ChainProvider::from_providers(providers)?)
}

/// Append form-encoded query parameters to `base`.
pub(crate) fn build_url(base: &str, params: &[(&str, String)]) -> Result<String, WeatherError> {
    Url::parse_with_params(base, params)
        .map(String::from)
        .map_err(|e| WeatherError::InvalidUrl(format!("'{base}': {e}")))
}

pub(crate) fn unix_to_utc(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
}

pub(crate) fn parse_utc(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
