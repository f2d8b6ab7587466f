//! Fallback across providers.
//!
//! A [`ChainProvider`] asks its primary provider first and only falls back to the
//! secondary when the primary fails or has nothing to offer. Longer lists are
//! folded into nested chains, so providers are tried left to right.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::{
    collection::WeatherRecordCollection,
    error::WeatherError,
    model::{WeatherQuery, WeatherRecord},
    provider::WeatherProvider,
};

pub struct ChainProvider {
    primary: Box<dyn WeatherProvider>,
    secondary: Box<dyn WeatherProvider>,
}

impl std::fmt::Debug for ChainProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainProvider").finish_non_exhaustive()
    }
}

impl ChainProvider {
    pub fn new(primary: Box<dyn WeatherProvider>, secondary: Box<dyn WeatherProvider>) -> Self {
        Self { primary, secondary }
    }

    /// Compose providers so the first one that succeeds wins.
    ///
    /// A single provider is returned unchanged.
    pub fn from_providers(
        mut providers: Vec<Box<dyn WeatherProvider>>,
    ) -> Result<Box<dyn WeatherProvider>, WeatherError> {
        while providers.len() > 1 {
            let (Some(secondary), Some(primary)) = (providers.pop(), providers.pop()) else {
                break;
            };
            providers.push(Box::new(ChainProvider::new(primary, secondary)));
        }

        providers.pop().ok_or(WeatherError::NoProviders)
    }
}

/// Primary failures only mean "try the next one".
fn recover<T>(result: Result<T, WeatherError>, operation: &str) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(operation, error = %err, "Primary provider failed, falling back");
            None
        }
    }
}

#[async_trait]
impl WeatherProvider for ChainProvider {
    async fn get_current_weather_data(
        &self,
        query: &WeatherQuery,
    ) -> Result<WeatherRecord, WeatherError> {
        let primary = self.primary.get_current_weather_data(query).await;
        match recover(primary, "current") {
            Some(record) => Ok(record),
            None => self.secondary.get_current_weather_data(query).await,
        }
    }

    async fn get_forecast(
        &self,
        query: &WeatherQuery,
        at: DateTime<Utc>,
    ) -> Result<Option<WeatherRecord>, WeatherError> {
        let primary = self.primary.get_forecast(query, at).await;
        if let Some(record) = recover(primary, "forecast").flatten() {
            return Ok(Some(record));
        }

        self.secondary
            .get_forecast(query, at)
            .await?
            .map(Some)
            .ok_or(WeatherError::ForecastNotPossible)
    }

    async fn get_historical(
        &self,
        query: &WeatherQuery,
        at: DateTime<Utc>,
    ) -> Result<Option<WeatherRecord>, WeatherError> {
        let primary = self.primary.get_historical(query, at).await;
        if let Some(record) = recover(primary, "historical").flatten() {
            return Ok(Some(record));
        }

        self.secondary
            .get_historical(query, at)
            .await?
            .map(Some)
            .ok_or(WeatherError::HistoricalDataNotAvailable)
    }

    async fn get_forecast_collection(
        &self,
        query: &WeatherQuery,
    ) -> Result<WeatherRecordCollection, WeatherError> {
        let primary = self.primary.get_forecast_collection(query).await;
        match recover(primary, "forecast_collection") {
            Some(collection) => Ok(collection),
            None => self.secondary.get_forecast_collection(query).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{model::RecordKind, provider::MockWeatherProvider};
    use chrono::Duration;

    fn record(temperature: f64) -> WeatherRecord {
        WeatherRecord::new(RecordKind::Current).with_temperature(Some(temperature))
    }

    fn succeeding(temperature: f64) -> Box<dyn WeatherProvider> {
        let mut p = MockWeatherProvider::new();
        p.expect_get_current_weather_data()
            .times(1)
            .returning(move |_| Ok(record(temperature)));
        Box::new(p)
    }

    fn failing_current() -> Box<dyn WeatherProvider> {
        let mut p = MockWeatherProvider::new();
        p.expect_get_current_weather_data()
            .times(1)
            .returning(|_| Err(WeatherError::QuotaExceeded));
        Box::new(p)
    }

    fn untouched() -> Box<dyn WeatherProvider> {
        let mut p = MockWeatherProvider::new();
        p.expect_get_current_weather_data().never();
        p.expect_get_forecast().never();
        p.expect_get_historical().never();
        p.expect_get_forecast_collection().never();
        Box::new(p)
    }

    fn query() -> WeatherQuery {
        WeatherQuery::new(52.52, 13.4)
    }

    #[test]
    fn empty_list_is_an_error() {
        assert!(matches!(
            ChainProvider::from_providers(Vec::new()),
            Err(WeatherError::NoProviders)
        ));
    }

    #[tokio::test]
    async fn single_provider_is_used_directly() {
        let chain = ChainProvider::from_providers(vec![succeeding(1.0)]).unwrap();
        let r = chain.get_current_weather_data(&query()).await.unwrap();
        assert_eq!(r.temperature(), Some(1.0));
    }

    #[tokio::test]
    async fn first_success_short_circuits() {
        let chain =
            ChainProvider::from_providers(vec![succeeding(1.0), untouched(), untouched()]).unwrap();
        let r = chain.get_current_weather_data(&query()).await.unwrap();
        assert_eq!(r.temperature(), Some(1.0));
    }

    #[tokio::test]
    async fn falls_through_in_order() {
        let chain = ChainProvider::from_providers(vec![
            failing_current(),
            failing_current(),
            succeeding(3.0),
        ])
        .unwrap();
        let r = chain.get_current_weather_data(&query()).await.unwrap();
        assert_eq!(r.temperature(), Some(3.0));
    }

    #[tokio::test]
    async fn last_error_is_propagated_for_current() {
        let mut last = MockWeatherProvider::new();
        last.expect_get_current_weather_data()
            .times(1)
            .returning(|_| Err(WeatherError::InvalidCredentials));

        let chain = ChainProvider::from_providers(vec![
            failing_current(),
            failing_current(),
            Box::new(last),
        ])
        .unwrap();
        let err = chain.get_current_weather_data(&query()).await.unwrap_err();
        assert!(matches!(err, WeatherError::InvalidCredentials));
    }

    #[tokio::test]
    async fn forecast_falls_back_on_none_and_on_error() {
        let mut none = MockWeatherProvider::new();
        none.expect_get_forecast().times(1).returning(|_, _| Ok(None));

        let mut broken = MockWeatherProvider::new();
        broken
            .expect_get_forecast()
            .times(1)
            .returning(|_, _| Err(WeatherError::NoMaxDate));

        let mut good = MockWeatherProvider::new();
        good.expect_get_forecast()
            .times(1)
            .returning(|_, at| Ok(Some(record(7.0).with_utc_date_time(Some(at)))));

        let chain =
            ChainProvider::from_providers(vec![Box::new(none), Box::new(broken), Box::new(good)])
                .unwrap();
        let at = Utc::now() + Duration::hours(3);
        let r = chain.get_forecast(&query(), at).await.unwrap().unwrap();
        assert_eq!(r.temperature(), Some(7.0));
        assert_eq!(r.utc_date_time(), Some(at));
    }

    #[tokio::test]
    async fn forecast_without_any_result_is_not_possible() {
        let mut a = MockWeatherProvider::new();
        a.expect_get_forecast().times(1).returning(|_, _| Ok(None));
        let mut b = MockWeatherProvider::new();
        b.expect_get_forecast().times(1).returning(|_, _| Ok(None));

        let chain = ChainProvider::new(Box::new(a), Box::new(b));
        let err = chain.get_forecast(&query(), Utc::now()).await.unwrap_err();
        assert!(matches!(err, WeatherError::ForecastNotPossible));
    }

    #[tokio::test]
    async fn secondary_errors_are_not_swallowed() {
        let mut a = MockWeatherProvider::new();
        a.expect_get_historical()
            .times(1)
            .returning(|_, _| Err(WeatherError::Transport("offline".into())));
        let mut b = MockWeatherProvider::new();
        b.expect_get_historical()
            .times(1)
            .returning(|_, _| Err(WeatherError::QuotaExceeded));

        let chain = ChainProvider::new(Box::new(a), Box::new(b));
        let err = chain
            .get_historical(&query(), Utc::now() - Duration::days(1))
            .await
            .unwrap_err();
        assert!(matches!(err, WeatherError::QuotaExceeded));
    }

    #[tokio::test]
    async fn historical_without_any_result_is_not_available() {
        let mut a = MockWeatherProvider::new();
        a.expect_get_historical().times(1).returning(|_, _| Ok(None));
        let mut b = MockWeatherProvider::new();
        b.expect_get_historical().times(1).returning(|_, _| Ok(None));

        let chain = ChainProvider::new(Box::new(a), Box::new(b));
        let err = chain.get_historical(&query(), Utc::now()).await.unwrap_err();
        assert!(matches!(err, WeatherError::HistoricalDataNotAvailable));
    }

    #[tokio::test]
    async fn forecast_collection_prefers_primary() {
        let mut a = MockWeatherProvider::new();
        a.expect_get_forecast_collection().times(1).returning(|_| {
            Ok([record(1.0), record(2.0)].into_iter().collect())
        });

        let chain = ChainProvider::new(Box::new(a), untouched());
        let c = chain.get_forecast_collection(&query()).await.unwrap();
        assert_eq!(c.len(), 2);
    }

    #[tokio::test]
    async fn forecast_collection_falls_back() {
        let mut a = MockWeatherProvider::new();
        a.expect_get_forecast_collection()
            .times(1)
            .returning(|_| Err(WeatherError::Server("HTTP 500".into())));
        let mut b = MockWeatherProvider::new();
        b.expect_get_forecast_collection()
            .times(1)
            .returning(|_| Ok(WeatherRecordCollection::new()));

        let chain = ChainProvider::new(Box::new(a), Box::new(b));
        assert!(chain.get_forecast_collection(&query()).await.unwrap().is_empty());
    }
}
