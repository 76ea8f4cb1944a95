use chrono::{DateTime, NaiveDate, TimeZone};

/// This is the standard way of converting a date to a key in mintick. Daily aggregates and the
/// snapshot both use it.
pub fn date_to_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Reverse of [date_to_key]. Returns `None` for keys written by something else.
pub fn key_to_date(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key, "%Y-%m-%d").ok()
}

/// Whole seconds from `from` to `to`. Clocks can be moved backwards, so negative values are
/// clamped to zero.
pub fn seconds_between<Tz: TimeZone>(from: &DateTime<Tz>, to: &DateTime<Tz>) -> u32 {
    let seconds = to.clone().signed_duration_since(from.clone()).num_seconds();
    seconds.clamp(0, u32::MAX as i64) as u32
}

/// Formats seconds as `MM:SS`, minutes are not wrapped into hours.
pub fn format_clock(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Formats seconds as `1h2m3s`, skipping leading zero units.
pub fn format_duration(seconds: u32) -> String {
    let hours = seconds / 3600;
    let minutes = seconds / 60 % 60;
    let seconds = seconds % 60;
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}
