use reqwest::StatusCode;
use thiserror::Error;

/// Every failure a provider (or a chain of providers) can report.
#[derive(Debug, Error)]
pub enum WeatherError {
    /// The HTTP client failed before a response was received.
    #[error("Transport failed: {0}")]
    Transport(String),

    /// A request URL could not be built, usually from a malformed base URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// HTTP 401 or 403.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// HTTP 429.
    #[error("Quota exceeded")]
    QuotaExceeded,

    /// Any other status >= 300, or an empty body on success.
    #[error("Server error: {0}")]
    Server(String),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The body was valid JSON but lacked an element the provider cannot do without.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Requested date is not in the future")]
    DateNotInFuture,

    #[error("Forecast has no maximum date")]
    NoMaxDate,

    #[error("Forecast not possible for the requested date")]
    ForecastNotPossible,

    #[error("Historical data not available for the requested date")]
    HistoricalDataNotAvailable,

    #[error("A provider chain needs at least one provider")]
    NoProviders,
}

impl WeatherError {
    /// Map a non-success HTTP status onto the error taxonomy.
    ///
    /// Returns `None` for statuses below 300.
    pub fn from_status(status: StatusCode) -> Option<Self> {
        match status.as_u16() {
            401 | 403 => Some(Self::InvalidCredentials),
            429 => Some(Self::QuotaExceeded),
            code if code >= 300 => Some(Self::Server(format!("HTTP {status}"))),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for WeatherError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
