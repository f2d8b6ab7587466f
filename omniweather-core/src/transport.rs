//! HTTP plumbing shared by all providers.
//!
//! Providers only see the [`Transport`] trait, so tests can swap the network out.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::WeatherError;

/// Sends one request and hands back the raw response body.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, method: Method, url: &str) -> Result<String, WeatherError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

const fn default_timeout() -> u64 {
    30
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
        }
    }
}

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, WeatherError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { http })
    }

    pub fn with_defaults() -> Result<Self, WeatherError> {
        Self::new(&TransportConfig::default())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, method: Method, url: &str) -> Result<String, WeatherError> {
        debug!(%method, url = %redact(url), "Sending weather request");

        let res = self.http.request(method, url).send().await?;

        let status = res.status();
        if let Some(err) = WeatherError::from_status(status) {
            warn!(%status, url = %redact(url), "Weather request failed");
            return Err(err);
        }

        let body = res.text().await?;
        if body.is_empty() {
            return Err(WeatherError::Server("empty response body".to_string()));
        }

        Ok(body)
    }
}

/// Hide credentials before a URL ends up in the logs.
pub(crate) fn redact(url: &str) -> String {
    const SECRET_PARAMS: [&str; 3] = ["appid=", "apikey=", "key="];

    let (base, query) = url.split_once('?').unwrap_or((url, ""));
    let base = redact_path_key(base);
    if query.is_empty() {
        return base;
    }

    let query = query
        .split('&')
        .map(|pair| {
            match SECRET_PARAMS.iter().find(|p| pair.starts_with(*p)) {
                Some(param) => format!("{param}***"),
                None => pair.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("&");

    format!("{base}?{query}")
}

/// Dark Sky carries its key as the path segment after `/forecast/`.
fn redact_path_key(base: &str) -> String {
    match base.split_once("/forecast/") {
        Some((head, tail)) => match tail.split_once('/') {
            Some((_, rest)) => format!("{head}/forecast/***/{rest}"),
            None => format!("{head}/forecast/***"),
        },
        None => base.to_string(),
    }
}
