//! Session-log extractor
//!
//! An activity file is JSON lines, one event per line. Only play events
//! (`page == "NextSong"`) survive; each yields one Time row, one User row and
//! one proto-Songplay row whose song/artist keys are resolved later.

use super::{de_opt_int, non_blank, non_nan};
use crate::models::{ProtoSongplay, TimeRow, UserRow};
use serde::Deserialize;
use sparkify_common::time::{format_start_time, millis_to_datetime};
use sparkify_common::{Error, Result};

/// Event type that marks a song play
pub const NEXT_SONG_PAGE: &str = "NextSong";

/// One raw session-log event
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    #[serde(default, deserialize_with = "de_opt_int")]
    pub ts: Option<i64>,
    pub page: Option<String>,
    #[serde(default, deserialize_with = "de_opt_int")]
    pub user_id: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub level: Option<String>,
    pub song: Option<String>,
    pub artist: Option<String>,
    pub length: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_int")]
    pub session_id: Option<i64>,
    pub location: Option<String>,
    pub user_agent: Option<String>,
}

impl LogEvent {
    pub fn is_song_play(&self) -> bool {
        self.page.as_deref() == Some(NEXT_SONG_PAGE)
    }
}

/// Rows extracted from one activity file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityRows {
    pub time: Vec<TimeRow>,
    pub users: Vec<UserRow>,
    pub songplays: Vec<ProtoSongplay>,
    /// Events read from the file, all page types
    pub events_total: usize,
    /// Play events kept
    pub events_kept: usize,
}

/// Parse every non-blank line of an activity file
pub fn parse_events(source: &str, content: &str) -> Result<Vec<LogEvent>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str::<LogEvent>(line)
                .map_err(|e| Error::malformed(source, format!("line {}: {}", idx + 1, e)))
        })
        .collect()
}

/// Extract all rows from one activity file's content
///
/// A play event without a usable timestamp fails the whole file.
pub fn extract_activity(source: &str, content: &str) -> Result<ActivityRows> {
    let events = parse_events(source, content)?;
    let mut rows = ActivityRows {
        events_total: events.len(),
        ..Default::default()
    };

    for event in events.into_iter().filter(LogEvent::is_song_play) {
        let millis = event
            .ts
            .ok_or_else(|| Error::malformed(source, "play event without ts"))?;
        let ts = millis_to_datetime(millis)
            .ok_or_else(|| Error::malformed(source, format!("timestamp out of range: {}", millis)))?;
        let start_time = format_start_time(&ts);

        let level = non_blank(event.level);

        rows.time.push(TimeRow::from_datetime(&ts));
        rows.users.push(UserRow {
            user_id: event.user_id,
            first_name: non_blank(event.first_name),
            last_name: non_blank(event.last_name),
            gender: non_blank(event.gender),
            level: level.clone(),
        });
        rows.songplays.push(ProtoSongplay {
            start_time,
            user_id: event.user_id,
            level,
            session_id: event.session_id,
            location: non_blank(event.location),
            user_agent: non_blank(event.user_agent),
            song_title: non_blank(event.song),
            artist_name: non_blank(event.artist),
            length: non_nan(event.length),
        });
    }

    rows.events_kept = rows.songplays.len();
    Ok(rows)
}
