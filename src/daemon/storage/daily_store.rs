use chrono::{DateTime, NaiveDate, Utc};

use crate::utils::time::date_to_key;

use super::{
    activity_storage::{ActivityStorage, DailyActivityMap},
    entities::DailyActivityData,
};

/// In-memory owner of all daily aggregates. Days are created lazily and only removed by
/// [DailyAggregateStore::clear].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DailyAggregateStore {
    days: DailyActivityMap,
}

impl DailyAggregateStore {
    pub fn new(days: DailyActivityMap) -> Self {
        Self { days }
    }

    pub async fn load(storage: &impl ActivityStorage) -> Self {
        Self::new(storage.load_daily().await)
    }

    /// Copy of every record, handed to the persistence queue.
    pub fn snapshot(&self) -> DailyActivityMap {
        self.days.clone()
    }

    pub fn days(&self) -> &DailyActivityMap {
        &self.days
    }

    pub fn get(&self, date_key: &str) -> Option<&DailyActivityData> {
        self.days.get(date_key)
    }

    pub fn get_for_date(&self, date: NaiveDate) -> Option<&DailyActivityData> {
        self.get(&date_to_key(date))
    }

    pub fn get_or_create(&mut self, date_key: &str) -> &mut DailyActivityData {
        self.days
            .entry(date_key.to_string())
            .or_insert_with(|| DailyActivityData::new(date_key))
    }

    pub fn record_focus_session(&mut self, date_key: &str, start: DateTime<Utc>, duration: u32) {
        self.get_or_create(date_key)
            .record_focus_session(start, duration);
    }

    pub fn record_rest_session(&mut self, date_key: &str, start: DateTime<Utc>, duration: u32) {
        self.get_or_create(date_key)
            .record_rest_session(start, duration);
    }

    pub fn update_hour(&mut self, date_key: &str, hour: u32, seconds: u32) {
        self.get_or_create(date_key).update_hour(hour, seconds);
    }

    pub fn set_minute_history(&mut self, date_key: &str, hour: u32, minutes: &[u32]) {
        self.get_or_create(date_key)
            .set_minute_history(hour, minutes);
    }

    pub fn clear(&mut self) {
        self.days.clear();
    }
}
