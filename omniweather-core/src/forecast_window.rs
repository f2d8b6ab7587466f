//! Point forecasts derived from a provider's forecast collection.
//!
//! The last timestamp of a forecast collection plus a provider specific tolerance
//! marks the furthest instant a forecast can be answered for.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::{
    collection::WeatherRecordCollection,
    error::WeatherError,
    model::{WeatherQuery, WeatherRecord},
    provider::WeatherProvider,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForecastWindow {
    tolerance: Duration,
    require_future: bool,
}

impl ForecastWindow {
    pub fn new(tolerance: Duration) -> Self {
        Self {
            tolerance,
            require_future: true,
        }
    }

    /// For APIs that only ever return future data themselves.
    #[must_use]
    pub fn without_future_check(mut self) -> Self {
        self.require_future = false;
        self
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    pub fn check_requested(
        &self,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), WeatherError> {
        if self.require_future && at <= now {
            return Err(WeatherError::DateNotInFuture);
        }
        Ok(())
    }

    /// Nearest record to `at`, provided `at` lies within `max_date + tolerance`.
    pub fn select(
        &self,
        collection: WeatherRecordCollection,
        at: DateTime<Utc>,
    ) -> Result<Option<WeatherRecord>, WeatherError> {
        let max_date = collection.max_date().ok_or(WeatherError::NoMaxDate)?;

        // A horizon past the last representable instant bounds nothing.
        let limit = max_date.checked_add_signed(self.tolerance);
        if let Some(limit) = limit.filter(|limit| at > *limit) {
            debug!(%at, %limit, "Requested forecast beyond horizon");
            return Err(WeatherError::ForecastNotPossible);
        }

        Ok(collection.into_closest(at))
    }

    /// Check the request, fetch the provider's forecast collection and pick the nearest record.
    pub async fn resolve<P>(
        &self,
        provider: &P,
        query: &WeatherQuery,
        at: DateTime<Utc>,
    ) -> Result<Option<WeatherRecord>, WeatherError>
    where
        P: WeatherProvider + ?Sized,
    {
        self.check_requested(at, Utc::now())?;

        let collection = provider.get_forecast_collection(query).await?;
        debug!(records = collection.len(), "Fetched forecast collection");

        self.select(collection, at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RecordKind;
    use chrono::TimeZone;

    fn d() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 18, 0, 0).unwrap()
    }

    fn collection() -> WeatherRecordCollection {
        (0..4)
            .map(|h| {
                WeatherRecord::new(RecordKind::Forecast)
                    .with_utc_date_time(Some(d() - Duration::hours(3 - h)))
                    .with_temperature(Some(h as f64))
            })
            .collect()
    }

    #[test]
    fn boundary_is_inclusive() {
        let window = ForecastWindow::new(Duration::minutes(90));

        let hit = window.select(collection(), d() + Duration::minutes(90)).unwrap();
        assert_eq!(hit.and_then(|r| r.temperature()), Some(3.0));

        let err = window
            .select(collection(), d() + Duration::minutes(90) + Duration::seconds(1))
            .unwrap_err();
        assert!(matches!(err, WeatherError::ForecastNotPossible));
    }

    #[test]
    fn horizon_near_max_instant_does_not_overflow() {
        let window = ForecastWindow::new(Duration::hours(12));
        let last = DateTime::<Utc>::MAX_UTC - Duration::hours(1);
        let collection: WeatherRecordCollection = [WeatherRecord::new(RecordKind::Forecast)
            .with_utc_date_time(Some(last))
            .with_temperature(Some(9.0))]
        .into_iter()
        .collect();

        let hit = window.select(collection, d()).unwrap();
        assert_eq!(hit.and_then(|r| r.temperature()), Some(9.0));
    }

    #[test]
    fn empty_collection_has_no_max_date() {
        let window = ForecastWindow::new(Duration::hours(1));
        let err = window.select(WeatherRecordCollection::new(), d()).unwrap_err();
        assert!(matches!(err, WeatherError::NoMaxDate));
    }

    #[test]
    fn inside_window_picks_nearest() {
        let window = ForecastWindow::new(Duration::hours(12));
        let hit = window.select(collection(), d() - Duration::minutes(100)).unwrap();
        assert_eq!(hit.and_then(|r| r.temperature()), Some(1.0));
    }

    #[test]
    fn past_dates_rejected_unless_disabled() {
        let window = ForecastWindow::new(Duration::hours(1));
        let now = d();

        assert!(matches!(
            window.check_requested(now - Duration::minutes(1), now),
            Err(WeatherError::DateNotInFuture)
        ));
        assert!(matches!(
            window.check_requested(now, now),
            Err(WeatherError::DateNotInFuture)
        ));
        assert!(window.check_requested(now + Duration::minutes(1), now).is_ok());

        let lenient = window.without_future_check();
        assert!(lenient.check_requested(now - Duration::days(1), now).is_ok());
    }
}
