//! Canonical row tuples, one type per warehouse table

use chrono::{DateTime, Utc};
use serde::Serialize;
use sparkify_common::time::{format_start_time, CalendarParts};
use sparkify_common::Table;
use sqlx::query_builder::Separated;
use sqlx::Sqlite;

/// A row that can be bulk-appended into its table's staging relation
///
/// `push_binds` must bind one value per entry of `TABLE.columns()`, in order.
pub trait StageRow {
    const TABLE: Table;

    fn push_binds<'args>(&'args self, b: &mut Separated<'_, 'args, Sqlite, &'static str>);
}

/// NaN cannot be stored; it is written as NULL
pub(crate) fn non_nan(value: Option<f64>) -> Option<f64> {
    value.filter(|v| !v.is_nan())
}

/// Song dimension row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SongRow {
    pub song_id: String,
    pub title: Option<String>,
    pub artist_id: String,
    pub year: Option<i64>,
    pub duration: Option<f64>,
}

impl StageRow for SongRow {
    const TABLE: Table = Table::Songs;

    fn push_binds<'args>(&'args self, b: &mut Separated<'_, 'args, Sqlite, &'static str>) {
        b.push_bind(&self.song_id)
            .push_bind(&self.title)
            .push_bind(&self.artist_id)
            .push_bind(self.year)
            .push_bind(non_nan(self.duration));
    }
}

/// Artist dimension row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtistRow {
    pub artist_id: String,
    pub name: Option<String>,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl StageRow for ArtistRow {
    const TABLE: Table = Table::Artists;

    fn push_binds<'args>(&'args self, b: &mut Separated<'_, 'args, Sqlite, &'static str>) {
        b.push_bind(&self.artist_id)
            .push_bind(&self.name)
            .push_bind(&self.location)
            .push_bind(non_nan(self.latitude))
            .push_bind(non_nan(self.longitude));
    }
}

/// User dimension row; one per (user_id, level)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRow {
    pub user_id: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub level: Option<String>,
}

impl StageRow for UserRow {
    const TABLE: Table = Table::Users;

    fn push_binds<'args>(&'args self, b: &mut Separated<'_, 'args, Sqlite, &'static str>) {
        b.push_bind(self.user_id)
            .push_bind(&self.first_name)
            .push_bind(&self.last_name)
            .push_bind(&self.gender)
            .push_bind(&self.level);
    }
}

/// Time dimension row, derived from one event timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeRow {
    pub start_time: String,
    pub hour: i64,
    pub day: i64,
    pub week: i64,
    pub month: i64,
    pub year: i64,
    pub weekday: i64,
}

impl TimeRow {
    pub fn from_datetime(ts: &DateTime<Utc>) -> Self {
        let parts = CalendarParts::from_datetime(ts);
        Self {
            start_time: format_start_time(ts),
            hour: parts.hour,
            day: parts.day,
            week: parts.week,
            month: parts.month,
            year: parts.year,
            weekday: parts.weekday,
        }
    }
}

impl StageRow for TimeRow {
    const TABLE: Table = Table::Time;

    fn push_binds<'args>(&'args self, b: &mut Separated<'_, 'args, Sqlite, &'static str>) {
        b.push_bind(&self.start_time)
            .push_bind(self.hour)
            .push_bind(self.day)
            .push_bind(self.week)
            .push_bind(self.month)
            .push_bind(self.year)
            .push_bind(self.weekday);
    }
}

/// Songplay still carrying the attributes used to find its song and artist
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtoSongplay {
    pub start_time: String,
    pub user_id: Option<i64>,
    pub level: Option<String>,
    pub session_id: Option<i64>,
    pub location: Option<String>,
    pub user_agent: Option<String>,
    pub song_title: Option<String>,
    pub artist_name: Option<String>,
    pub length: Option<f64>,
}

impl ProtoSongplay {
    /// Attach dimension keys; `None` leaves both keys null
    pub fn into_songplay(self, ids: Option<(String, String)>) -> SongplayRow {
        let (song_id, artist_id) = match ids {
            Some((song_id, artist_id)) => (Some(song_id), Some(artist_id)),
            None => (None, None),
        };

        SongplayRow {
            start_time: self.start_time,
            user_id: self.user_id,
            level: self.level,
            song_id,
            artist_id,
            session_id: self.session_id,
            location: self.location,
            user_agent: self.user_agent,
        }
    }
}

/// Songplay fact row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SongplayRow {
    pub start_time: String,
    pub user_id: Option<i64>,
    pub level: Option<String>,
    pub song_id: Option<String>,
    pub artist_id: Option<String>,
    pub session_id: Option<i64>,
    pub location: Option<String>,
    pub user_agent: Option<String>,
}

impl SongplayRow {
    pub fn is_resolved(&self) -> bool {
        self.song_id.is_some() && self.artist_id.is_some()
    }
}

impl StageRow for SongplayRow {
    const TABLE: Table = Table::Songplays;

    fn push_binds<'args>(&'args self, b: &mut Separated<'_, 'args, Sqlite, &'static str>) {
        b.push_bind(&self.start_time)
            .push_bind(self.user_id)
            .push_bind(&self.level)
            .push_bind(&self.song_id)
            .push_bind(&self.artist_id)
            .push_bind(self.session_id)
            .push_bind(&self.location)
            .push_bind(&self.user_agent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparkify_common::time::millis_to_datetime;

    #[test]
    fn test_time_row_from_timestamp() {
        let ts = millis_to_datetime(1_541_440_000_000).unwrap();
        let row = TimeRow::from_datetime(&ts);
        assert_eq!(row.start_time, "2018-11-05 17:46:40.000");
        assert_eq!((row.hour, row.day, row.week), (17, 309, 45));
        assert_eq!((row.month, row.year, row.weekday), (11, 2018, 0));
    }

    #[test]
    fn test_unresolved_songplay_has_both_keys_null() {
        let proto = ProtoSongplay {
            start_time: "2018-11-05 17:46:40.000".to_string(),
            user_id: Some(7),
            level: Some("free".to_string()),
            session_id: Some(3),
            location: None,
            user_agent: None,
            song_title: Some("Nobody's Song".to_string()),
            artist_name: Some("Nobody".to_string()),
            length: Some(100.0),
        };

        let row = proto.clone().into_songplay(None);
        assert!(row.song_id.is_none() && row.artist_id.is_none());
        assert!(!row.is_resolved());

        let row = proto.into_songplay(Some(("S1".to_string(), "A1".to_string())));
        assert_eq!(row.song_id.as_deref(), Some("S1"));
        assert_eq!(row.artist_id.as_deref(), Some("A1"));
        assert!(row.is_resolved());
    }

    #[test]
    fn test_column_counts_match_catalogue() {
        // push_binds binds one value per staged column
        assert_eq!(SongRow::TABLE.columns().len(), 5);
        assert_eq!(ArtistRow::TABLE.columns().len(), 5);
        assert_eq!(UserRow::TABLE.columns().len(), 5);
        assert_eq!(TimeRow::TABLE.columns().len(), 7);
        assert_eq!(SongplayRow::TABLE.columns().len(), 8);
    }
}
