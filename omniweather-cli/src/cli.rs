use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::{Args, Parser, Subcommand};
use inquire::{Password, PasswordDisplayMode};
use omniweather_core::{
    Config, HttpTransport, ProviderId, Units, WeatherProvider, WeatherQuery, WeatherRecord,
    WeatherRecordCollection, chain_from_config, fetch_weather,
};
use tracing::debug;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "omniweather", version, about = "One CLI for many weather APIs")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure credentials for a provider and append it to the chain.
    Configure {
        /// Provider short name, e.g. "openweathermap" or "brightsky".
        provider: String,
    },

    /// Move a configured provider to the front of the chain.
    Primary {
        provider: String,
    },

    /// Show current, historical or forecast weather for a location.
    Show {
        #[command(flatten)]
        location: LocationArgs,

        /// Optional date/time (RFC 3339, "YYYY-MM-DD HH:MM" or "YYYY-MM-DD", UTC);
        /// if absent, means "now".
        #[arg(long)]
        date: Option<String>,
    },

    /// Print every record of the forecast collection.
    Forecast {
        #[command(flatten)]
        location: LocationArgs,
    },
}

#[derive(Debug, Args)]
pub struct LocationArgs {
    #[arg(long, allow_hyphen_values = true)]
    lat: f64,

    #[arg(long, allow_hyphen_values = true)]
    lon: f64,

    /// metric or imperial; falls back to the configured default.
    #[arg(long)]
    units: Option<Units>,

    /// Language code passed to providers that localise text.
    #[arg(long)]
    lang: Option<String>,

    /// Print JSON instead of text.
    #[arg(long)]
    json: bool,
}

impl LocationArgs {
    fn query(&self, config: &Config) -> WeatherQuery {
        let units = self.units.or(config.units).unwrap_or_default();
        let lang = self
            .lang
            .clone()
            .or_else(|| config.lang.clone())
            .unwrap_or_else(|| "en".to_string());

        WeatherQuery::new(self.lat, self.lon)
            .with_units(units)
            .with_lang(lang)
    }
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure { provider } => configure(&provider),
            Command::Primary { provider } => primary(&provider),
            Command::Show { location, date } => show(&location, date.as_deref()).await,
            Command::Forecast { location } => forecast(&location).await,
        }
    }
}

fn configure(provider: &str) -> anyhow::Result<()> {
    let id = ProviderId::try_from(provider)?;
    let mut config = Config::load()?;

    if id.requires_api_key() {
        let api_key = Password::new(&format!("API key for {id}:"))
            .with_display_mode(PasswordDisplayMode::Masked)
            .without_confirmation()
            .prompt()
            .context("Failed to read API key")?;

        let api_key = api_key.trim().to_string();
        if api_key.is_empty() {
            bail!("API key must not be empty");
        }
        config.upsert_provider_api_key(id, api_key);
    } else {
        config.add_provider(id);
    }

    config.save()?;
    println!("Provider '{id}' configured. Chain: {}", config.chain.join(" -> "));
    Ok(())
}

fn primary(provider: &str) -> anyhow::Result<()> {
    let id = ProviderId::try_from(provider)?;
    let mut config = Config::load()?;

    if !config.is_provider_configured(id) {
        bail!(
            "Provider '{id}' is not configured.\n\
             Hint: run `omniweather configure {id}` first."
        );
    }

    config.set_primary_provider(id);
    config.save()?;
    println!("Primary provider set to '{id}'.");
    Ok(())
}

async fn show(location: &LocationArgs, date: Option<&str>) -> anyhow::Result<()> {
    let when = date.map(parse_date).transpose()?;
    let config = Config::load()?;
    let query = location.query(&config);

    let transport = Arc::new(HttpTransport::new(&config.transport)?);
    let provider = chain_from_config(&config, transport)?;

    debug!(?when, "Fetching weather");
    let record = fetch_weather(provider.as_ref(), &query, when).await?;

    match (record, location.json) {
        (Some(record), true) => println!("{}", serde_json::to_string_pretty(&record)?),
        (Some(record), false) => print!("{}", render_record(&record)),
        (None, true) => println!("null"),
        (None, false) => println!("No weather data available."),
    }
    Ok(())
}

async fn forecast(location: &LocationArgs) -> anyhow::Result<()> {
    let config = Config::load()?;
    let query = location.query(&config);

    let transport = Arc::new(HttpTransport::new(&config.transport)?);
    let provider = chain_from_config(&config, transport)?;
    let collection = provider.get_forecast_collection(&query).await?;

    if location.json {
        println!("{}", serde_json::to_string_pretty(&collection)?);
    } else {
        print!("{}", render_collection(&collection));
    }
    Ok(())
}

/// Accepts RFC 3339, or a naive date (and time) taken as UTC.
pub fn parse_date(input: &str) -> anyhow::Result<DateTime<Utc>> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M") {
        return Ok(naive.and_utc());
    }
    if let Some(naive) = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(naive.and_utc());
    }

    bail!("Invalid date '{input}'. Use RFC 3339, \"YYYY-MM-DD HH:MM\" or \"YYYY-MM-DD\".")
}

fn render_record(record: &WeatherRecord) -> String {
    let mut out = String::new();

    let kind = serde_json::to_value(record.kind())
        .ok()
        .and_then(|v| v.as_str().map(str::to_owned))
        .unwrap_or_default();
    let when = record
        .utc_date_time()
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "unknown time".to_string());
    out.push_str(&format!("{kind} weather at {when}\n"));

    let fields = [
        ("Temperature", record.temperature(), ""),
        ("Feels like", record.feels_like(), ""),
        ("Min", record.temperature_min(), ""),
        ("Max", record.temperature_max(), ""),
        ("Pressure", record.pressure(), " hPa"),
        ("Wind speed", record.wind_speed(), ""),
        ("Wind direction", record.wind_direction(), "°"),
        ("Precipitation", record.precipitation(), ""),
    ];
    for (label, value, unit) in fields {
        if let Some(value) = value {
            out.push_str(&format!("  {label}: {value:.1}{unit}\n"));
        }
    }

    let fractions = [
        ("Humidity", record.humidity()),
        ("Precipitation probability", record.precipitation_probability()),
        ("Cloud cover", record.cloud_cover()),
    ];
    for (label, value) in fractions {
        if let Some(value) = value {
            out.push_str(&format!("  {label}: {:.0}%\n", value * 100.0));
        }
    }

    if !record.sources().is_empty() {
        let names: Vec<&str> = record.sources().iter().map(|s| s.name.as_ref()).collect();
        out.push_str(&format!("  Source: {}\n", names.join(", ")));
    }

    out
}

fn render_collection(collection: &WeatherRecordCollection) -> String {
    if collection.is_empty() {
        return "No forecast data available.\n".to_string();
    }

    collection
        .iter()
        .map(|record| {
            let when = record
                .utc_date_time()
                .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "----------------".to_string());
            let temperature = record
                .temperature()
                .map(|t| format!("{t:.1}"))
                .unwrap_or_else(|| "-".to_string());
            format!("{when}  {temperature}\n")
        })
        .collect()
}
