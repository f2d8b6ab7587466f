use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::model::WeatherRecord;

/// Ordered records from a single provider response.
///
/// Keeps the latest timestamp seen so far, so `max_date` is O(1).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeatherRecordCollection {
    records: Vec<WeatherRecord>,
    max_date: Option<DateTime<Utc>>,
}

impl WeatherRecordCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: WeatherRecord) {
        if let Some(ts) = record.utc_date_time() {
            if self.max_date.is_none_or(|max| ts > max) {
                self.max_date = Some(ts);
            }
        }
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, WeatherRecord> {
        self.records.iter()
    }

    /// Latest timestamp among the records; `None` if no record carries one.
    pub fn max_date(&self) -> Option<DateTime<Utc>> {
        self.max_date
    }

    /// Record whose timestamp is nearest to `at`, measured in whole seconds.
    ///
    /// Records without a timestamp are never returned. On a tie the earlier record wins.
    pub fn closest(&self, at: DateTime<Utc>) -> Option<&WeatherRecord> {
        self.closest_index(at).map(|i| &self.records[i])
    }

    /// Owned variant of [`closest`](Self::closest).
    pub fn into_closest(mut self, at: DateTime<Utc>) -> Option<WeatherRecord> {
        self.closest_index(at).map(|i| self.records.swap_remove(i))
    }

    fn closest_index(&self, at: DateTime<Utc>) -> Option<usize> {
        let mut best: Option<(usize, i64)> = None;
        for (i, record) in self.records.iter().enumerate() {
            let Some(ts) = record.utc_date_time() else {
                continue;
            };
            let distance = (ts - at).num_seconds().abs();
            if best.is_none_or(|(_, d)| distance < d) {
                best = Some((i, distance));
            }
        }
        best.map(|(i, _)| i)
    }
}

impl FromIterator<WeatherRecord> for WeatherRecordCollection {
    fn from_iter<I: IntoIterator<Item = WeatherRecord>>(iter: I) -> Self {
        let mut collection = Self::new();
        collection.extend(iter);
        collection
    }
}

impl Extend<WeatherRecord> for WeatherRecordCollection {
    fn extend<I: IntoIterator<Item = WeatherRecord>>(&mut self, iter: I) {
        for record in iter {
            self.push(record);
        }
    }
}

impl IntoIterator for WeatherRecordCollection {
    type Item = WeatherRecord;
    type IntoIter = std::vec::IntoIter<WeatherRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a WeatherRecordCollection {
    type Item = &'a WeatherRecord;
    type IntoIter = std::slice::Iter<'a, WeatherRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl Serialize for WeatherRecordCollection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.records)
    }
}

impl<'de> Deserialize<'de> for WeatherRecordCollection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<WeatherRecord>::deserialize(deserializer).map(Self::from_iter)
    }
}
