//! Timestamp utilities for the time dimension

use chrono::{DateTime, Datelike, Timelike, Utc};

/// Storage format of `start_time` in both `time` and `songplays`
pub const START_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Convert epoch milliseconds to a UTC timestamp
///
/// Returns `None` when the value is outside chrono's representable range.
pub fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
}

/// Render a timestamp the way `start_time` is stored
pub fn format_start_time(ts: &DateTime<Utc>) -> String {
    ts.format(START_TIME_FORMAT).to_string()
}

/// Calendar fields derived from one timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarParts {
    pub hour: i64,
    /// Day of year, 1..=366
    pub day: i64,
    /// ISO-8601 week number
    pub week: i64,
    pub month: i64,
    pub year: i64,
    /// Days since Monday (Monday = 0)
    pub weekday: i64,
}

impl CalendarParts {
    pub fn from_datetime(ts: &DateTime<Utc>) -> Self {
        Self {
            hour: ts.hour() as i64,
            day: ts.ordinal() as i64,
            week: ts.iso_week().week() as i64,
            month: ts.month() as i64,
            year: ts.year() as i64,
            weekday: ts.weekday().num_days_from_monday() as i64,
        }
    }
}
