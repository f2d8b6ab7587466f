//! Core library for `omniweather`.
//!
//! This crate defines:
//! - One weather data model shared by every provider
//! - Mappers for BrightSky, DarkSky, OpenWeatherMap, Tomorrow.io and VisualCrossing
//! - A chain provider that falls back from one API to the next
//! - Configuration & credentials handling
//!
//! It is used by `omniweather-cli`, but can also be reused by other binaries or services.

pub mod collection;
pub mod config;
pub mod error;
pub mod forecast_window;
pub mod model;
pub mod provider;
pub mod transport;

pub use collection::WeatherRecordCollection;
pub use config::{Config, ProviderConfig};
pub use error::WeatherError;
pub use forecast_window::ForecastWindow;
pub use model::{RecordKind, Source, Units, WeatherQuery, WeatherRecord};
pub use provider::{
    ProviderId, WeatherProvider, chain::ChainProvider, chain_from_config, fetch_weather,
    provider_from_config,
};
pub use transport::{HttpTransport, Transport, TransportConfig};
