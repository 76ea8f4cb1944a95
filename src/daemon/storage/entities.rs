use std::collections::BTreeMap;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

pub const MINUTES_PER_HOUR: usize = 60;
pub const HOURS_PER_DAY: usize = 24;
/// A single minute can't hold more than 60 seconds of activity.
pub const MAX_SECONDS_PER_MINUTE: u32 = 60;
pub const MAX_SECONDS_PER_HOUR: u32 = 3600;

/// Live per-minute state of the hour in progress. Written on every save so that a restart within
/// the same hour continues where it left off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "SnapshotRecord")]
pub struct ActivitySnapshot {
    pub minute_activity: Vec<u32>,
    pub work_time: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_tick_hour: Option<u32>,
    pub fatigue_heat: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_tick_day: Option<String>,
}

impl Default for ActivitySnapshot {
    fn default() -> Self {
        Self {
            minute_activity: vec![0; MINUTES_PER_HOUR],
            work_time: 0,
            last_tick_hour: None,
            fatigue_heat: vec![0.; MINUTES_PER_HOUR],
            last_tick_day: None,
        }
    }
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SnapshotRecord {
    #[serde(deserialize_with = "lenient::deserialize")]
    minute_activity: Option<Vec<u32>>,
    #[serde(deserialize_with = "lenient::deserialize")]
    work_time: Option<u32>,
    #[serde(deserialize_with = "lenient::deserialize")]
    last_tick_hour: Option<u32>,
    #[serde(deserialize_with = "lenient::deserialize")]
    fatigue_heat: Option<Vec<f64>>,
    #[serde(deserialize_with = "lenient::deserialize")]
    last_tick_day: Option<String>,
}

impl From<SnapshotRecord> for ActivitySnapshot {
    fn from(record: SnapshotRecord) -> Self {
        let minute_activity = exact_length(record.minute_activity, MINUTES_PER_HOUR)
            .into_iter()
            .map(|v| v.min(MAX_SECONDS_PER_MINUTE))
            .collect();
        let fatigue_heat = exact_length(record.fatigue_heat, MINUTES_PER_HOUR)
            .into_iter()
            .map(clamp_heat)
            .collect();
        ActivitySnapshot {
            minute_activity,
            work_time: record.work_time.unwrap_or(0),
            last_tick_hour: record.last_tick_hour.filter(|h| (*h as usize) < HOURS_PER_DAY),
            fatigue_heat,
            last_tick_day: record.last_tick_day,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Focus,
    Rest,
}

/// A finished stretch of focus or rest. Sessions are never modified after being recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(with = "chrono::serde::ts_seconds")]
    pub start_time: DateTime<Utc>,
    pub duration_sec: u32,
    pub kind: SessionKind,
}

/// Everything that is known about a single calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "DailyRecord")]
pub struct DailyActivityData {
    date_key: String,
    /// Seconds of activity per hour of the day.
    hourly: Vec<u32>,
    /// Per-minute activity of finished hours.
    minute_history: BTreeMap<u32, Vec<u32>>,
    peak_hour: Option<u32>,
    total_active_seconds: u32,
    sessions: Vec<Session>,
    focus_session_count: u32,
    rest_session_count: u32,
    total_rest_seconds: u32,
}

impl DailyActivityData {
    pub fn new(date_key: impl Into<String>) -> Self {
        Self {
            date_key: date_key.into(),
            hourly: vec![0; HOURS_PER_DAY],
            minute_history: BTreeMap::new(),
            peak_hour: None,
            total_active_seconds: 0,
            sessions: vec![],
            focus_session_count: 0,
            rest_session_count: 0,
            total_rest_seconds: 0,
        }
    }

    pub fn date_key(&self) -> &str {
        &self.date_key
    }

    pub(crate) fn set_date_key(&mut self, date_key: String) {
        self.date_key = date_key;
    }

    pub fn hourly(&self) -> &[u32] {
        &self.hourly
    }

    pub fn minute_history(&self) -> &BTreeMap<u32, Vec<u32>> {
        &self.minute_history
    }

    pub fn minute_history_for(&self, hour: u32) -> Option<&[u32]> {
        self.minute_history.get(&hour).map(Vec::as_slice)
    }

    pub fn peak_hour(&self) -> Option<u32> {
        self.peak_hour
    }

    pub fn total_active_seconds(&self) -> u32 {
        self.total_active_seconds
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn focus_session_count(&self) -> u32 {
        self.focus_session_count
    }

    pub fn rest_session_count(&self) -> u32 {
        self.rest_session_count
    }

    pub fn total_rest_seconds(&self) -> u32 {
        self.total_rest_seconds
    }

    /// Sets activity of an hour. The value replaces whatever was there, so calling it again with
    /// the same arguments changes nothing.
    pub fn update_hour(&mut self, hour: u32, seconds: u32) {
        let Some(slot) = self.hourly.get_mut(hour as usize) else {
            return;
        };
        *slot = seconds.min(MAX_SECONDS_PER_HOUR);
        self.recalculate();
    }

    pub fn set_minute_history(&mut self, hour: u32, minutes: &[u32]) {
        if hour as usize >= HOURS_PER_DAY {
            return;
        }
        self.minute_history.insert(hour, minutes.to_vec());
    }

    pub fn record_focus_session(&mut self, start_time: DateTime<Utc>, duration_sec: u32) {
        self.focus_session_count += 1;
        self.sessions.push(Session {
            start_time,
            duration_sec,
            kind: SessionKind::Focus,
        });
    }

    pub fn record_rest_session(&mut self, start_time: DateTime<Utc>, duration_sec: u32) {
        self.rest_session_count += 1;
        self.total_rest_seconds = self.total_rest_seconds.saturating_add(duration_sec);
        self.sessions.push(Session {
            start_time,
            duration_sec,
            kind: SessionKind::Rest,
        });
    }

    /// Hour with the earliest stored minute history.
    pub fn earliest_recorded_hour(&self) -> Option<u32> {
        self.minute_history.keys().next().copied()
    }

    pub fn cumulative_focus_seconds(&self) -> u32 {
        self.total_active_seconds
    }

    pub fn cumulative_rest_seconds(&self) -> u32 {
        self.total_rest_seconds
    }

    /// Active time divided by rest time. A day without any rest but with activity is reported as
    /// 99 so that it stands out.
    pub fn focus_rest_ratio(&self) -> f64 {
        if self.total_rest_seconds == 0 {
            return if self.total_active_seconds > 0 { 99. } else { 0. };
        }
        self.total_active_seconds as f64 / self.total_rest_seconds as f64
    }

    /// Peak hour formatted like `3:00 PM`.
    pub fn peak_time(&self) -> Option<String> {
        let time = NaiveTime::from_hms_opt(self.peak_hour?, 0, 0)?;
        Some(time.format("%-I:00 %p").to_string())
    }

    fn recalculate(&mut self) {
        self.total_active_seconds = self.hourly.iter().sum();
        // Ties resolve to the latest hour.
        self.peak_hour = self
            .hourly
            .iter()
            .enumerate()
            .max_by_key(|(_, seconds)| **seconds)
            .filter(|(_, seconds)| **seconds > 0)
            .map(|(hour, _)| hour as u32);
    }
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DailyRecord {
    #[serde(deserialize_with = "lenient::deserialize")]
    date_key: Option<String>,
    #[serde(deserialize_with = "lenient::deserialize")]
    hourly: Option<Vec<u32>>,
    #[serde(deserialize_with = "lenient::deserialize")]
    minute_history: Option<BTreeMap<u32, Vec<u32>>>,
    #[serde(deserialize_with = "lenient::deserialize")]
    sessions: Option<Vec<Session>>,
    #[serde(deserialize_with = "lenient::deserialize")]
    focus_session_count: Option<u32>,
    #[serde(deserialize_with = "lenient::deserialize")]
    rest_session_count: Option<u32>,
    #[serde(deserialize_with = "lenient::deserialize")]
    total_rest_seconds: Option<u32>,
}

impl From<DailyRecord> for DailyActivityData {
    fn from(record: DailyRecord) -> Self {
        let sessions = record.sessions.unwrap_or_default();
        let count = |kind| sessions.iter().filter(|s| s.kind == kind).count() as u32;
        let focus_session_count = record
            .focus_session_count
            .unwrap_or_else(|| count(SessionKind::Focus));
        let rest_session_count = record
            .rest_session_count
            .unwrap_or_else(|| count(SessionKind::Rest));
        let total_rest_seconds = record.total_rest_seconds.unwrap_or_else(|| {
            sessions
                .iter()
                .filter(|s| s.kind == SessionKind::Rest)
                .fold(0u32, |total, s| total.saturating_add(s.duration_sec))
        });
        let minute_history = record
            .minute_history
            .unwrap_or_default()
            .into_iter()
            .filter(|(hour, _)| (*hour as usize) < HOURS_PER_DAY)
            .map(|(hour, minutes)| (hour, exact_length(Some(minutes), MINUTES_PER_HOUR)))
            .collect();

        let mut hourly = exact_length(record.hourly, HOURS_PER_DAY);
        for seconds in &mut hourly {
            *seconds = (*seconds).min(MAX_SECONDS_PER_HOUR);
        }

        let mut data = DailyActivityData {
            date_key: record.date_key.unwrap_or_default(),
            hourly,
            minute_history,
            peak_hour: None,
            total_active_seconds: 0,
            sessions,
            focus_session_count,
            rest_session_count,
            total_rest_seconds,
        };
        // Derived values are never trusted from disk.
        data.recalculate();
        data
    }
}

/// Values of the wrong length are replaced as a whole rather than padded, a partially written
/// array can't be trusted.
fn exact_length<T: Default + Clone>(values: Option<Vec<T>>, len: usize) -> Vec<T> {
    match values {
        Some(values) if values.len() == len => values,
        _ => vec![T::default(); len],
    }
}

fn clamp_heat(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0., 1.)
    } else {
        0.
    }
}

/// Deserializes a field, turning values of the wrong type into `None` instead of failing the
/// whole document. Combine with `#[serde(default)]` to also cover missing fields.
pub(crate) mod lenient {
    use serde::{de::DeserializeOwned, Deserialize, Deserializer};

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(serde_json::from_value(value).ok())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_snapshot_with_wrong_lengths_is_normalized() -> Result<()> {
        let snapshot: ActivitySnapshot = serde_json::from_str(
            r#"{"minuteActivity": [1, 2, 3], "workTime": 42, "lastTickHour": 7, "fatigueHeat": [0.5]}"#,
        )?;
        assert_eq!(snapshot.minute_activity, vec![0; 60]);
        assert_eq!(snapshot.fatigue_heat, vec![0.; 60]);
        assert_eq!(snapshot.work_time, 42);
        assert_eq!(snapshot.last_tick_hour, Some(7));

        let encoded = serde_json::to_string(&snapshot)?;
        let decoded: ActivitySnapshot = serde_json::from_str(&encoded)?;
        assert_eq!(decoded, snapshot);
        Ok(())
    }

    #[test]
    fn test_snapshot_fields_default_individually() -> Result<()> {
        let mut minutes = vec![0u32; 60];
        minutes[3] = 500;
        let json = serde_json::json!({
            "minuteActivity": minutes,
            "workTime": "not a number",
            "lastTickHour": 31,
            "extra": true,
        });
        let snapshot: ActivitySnapshot = serde_json::from_value(json)?;
        assert_eq!(snapshot.minute_activity[3], 60);
        assert_eq!(snapshot.work_time, 0);
        assert_eq!(snapshot.last_tick_hour, None);
        Ok(())
    }

    #[test]
    fn test_update_hour_keeps_totals() {
        let mut day = DailyActivityData::new("2024-05-01");
        day.update_hour(9, 1200);
        day.update_hour(14, 3000);
        day.update_hour(14, 3000);
        day.update_hour(30, 10);

        assert_eq!(day.total_active_seconds(), 4200);
        assert_eq!(day.total_active_seconds(), day.hourly().iter().sum::<u32>());
        assert_eq!(day.peak_hour(), Some(14));
        assert_eq!(day.peak_time().as_deref(), Some("2:00 PM"));

        day.update_hour(14, 0);
        day.update_hour(9, 0);
        assert_eq!(day.peak_hour(), None);
        assert_eq!(day.total_active_seconds(), 0);
    }

    #[test]
    fn test_sessions_update_counters() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let mut day = DailyActivityData::new("2024-05-01");
        day.record_focus_session(start, 1500);
        day.record_rest_session(start, 120);
        day.record_rest_session(start, 180);

        assert_eq!(day.focus_session_count(), 1);
        assert_eq!(day.rest_session_count(), 2);
        assert_eq!(day.total_rest_seconds(), 300);
        assert_eq!(day.sessions().len(), 3);
        assert_eq!(day.sessions()[0].kind, SessionKind::Focus);
    }

    #[test]
    fn test_focus_rest_ratio() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let mut day = DailyActivityData::new("2024-05-01");
        assert_eq!(day.focus_rest_ratio(), 0.);
        day.update_hour(9, 600);
        assert_eq!(day.focus_rest_ratio(), 99.);
        day.record_rest_session(start, 300);
        assert_eq!(day.focus_rest_ratio(), 2.);
    }

    #[test]
    fn test_daily_record_recomputes_derived_values() -> Result<()> {
        let mut hourly = vec![0u32; 24];
        hourly[10] = 42;
        hourly[11] = 100;
        let full_hour = vec![1u32; 60];
        let json = serde_json::json!({
            "dateKey": "2024-05-01",
            "hourly": hourly,
            "minuteHistory": { "10": [1, 2], "40": full_hour },
            "peakHour": 3,
            "totalActiveSeconds": 7,
            "sessions": [
                { "startTime": 1714550400, "durationSec": 120, "kind": "rest" },
            ],
        });
        let day: DailyActivityData = serde_json::from_value(json)?;

        assert_eq!(day.total_active_seconds(), 142);
        assert_eq!(day.peak_hour(), Some(11));
        assert_eq!(day.minute_history_for(10), Some(vec![0; 60].as_slice()));
        assert_eq!(day.minute_history_for(40), None);
        assert_eq!(day.rest_session_count(), 1);
        assert_eq!(day.total_rest_seconds(), 120);
        Ok(())
    }

    #[test]
    fn test_daily_record_caps_corrupt_hours() -> Result<()> {
        let mut hourly = vec![0u32; 24];
        hourly[0] = u32::MAX;
        hourly[1] = 1;
        let json = serde_json::json!({
            "dateKey": "2024-05-01",
            "hourly": hourly,
            "sessions": [
                { "startTime": 1714550400, "durationSec": u32::MAX, "kind": "rest" },
                { "startTime": 1714554000, "durationSec": 10, "kind": "rest" },
            ],
        });
        let mut day: DailyActivityData = serde_json::from_value(json)?;

        assert_eq!(day.hourly()[0], MAX_SECONDS_PER_HOUR);
        assert_eq!(day.total_active_seconds(), MAX_SECONDS_PER_HOUR + 1);
        assert_eq!(day.peak_hour(), Some(0));
        assert_eq!(day.total_rest_seconds(), u32::MAX);

        day.update_hour(2, 5000);
        assert_eq!(day.hourly()[2], MAX_SECONDS_PER_HOUR);
        assert_eq!(day.total_active_seconds(), 2 * MAX_SECONDS_PER_HOUR + 1);
        Ok(())
    }
}
