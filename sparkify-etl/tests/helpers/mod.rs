//! Test Helper Utilities
//!
//! Shared fixtures for sparkify-etl integration tests

#![allow(dead_code)]

use anyhow::Result;
use serde_json::{json, Value};
use sparkify_common::db::init_database;
use sqlx::SqlitePool;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Create temporary on-disk warehouse with the schema applied
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let db_url = format!("sqlite://{}", temp_dir.path().join("warehouse.db").display());
    let pool = init_database(&db_url).await?;
    Ok((temp_dir, pool))
}

/// Raw source directories laid out like the real data set
pub struct Fixtures {
    _dir: TempDir,
    pub catalog: PathBuf,
    pub activity: PathBuf,
}

impl Fixtures {
    pub fn new() -> Result<Self> {
        let dir = TempDir::new()?;
        let catalog = dir.path().join("song_data");
        let activity = dir.path().join("log_data");
        fs::create_dir_all(&catalog)?;
        fs::create_dir_all(&activity)?;
        Ok(Self {
            _dir: dir,
            catalog,
            activity,
        })
    }

    /// Write one catalog file (one JSON object)
    pub fn write_song(&self, name: &str, song: &Value) -> PathBuf {
        let path = self.catalog.join(name);
        write_file(&path, &song.to_string());
        path
    }

    /// Write one activity file (JSON lines)
    pub fn write_log(&self, name: &str, events: &[Value]) -> PathBuf {
        let content: Vec<String> = events.iter().map(Value::to_string).collect();
        let path = self.activity.join(name);
        write_file(&path, &content.join("\n"));
        path
    }

    /// Write an activity file with arbitrary content
    pub fn write_raw_log(&self, name: &str, content: &str) -> PathBuf {
        let path = self.activity.join(name);
        write_file(&path, content);
        path
    }
}

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// Catalog record with the fields of the real song files
pub fn song_record(
    song_id: &str,
    title: &str,
    artist_id: &str,
    artist_name: &str,
    duration: f64,
    year: i64,
) -> Value {
    json!({
        "num_songs": 1,
        "artist_id": artist_id,
        "artist_latitude": null,
        "artist_longitude": null,
        "artist_location": "",
        "artist_name": artist_name,
        "song_id": song_id,
        "title": title,
        "duration": duration,
        "year": year,
    })
}

/// Song-play event as found in the session logs
pub fn play_event(ts: i64, user_id: &str, level: &str, song: &str, artist: &str, length: f64) -> Value {
    json!({
        "artist": artist,
        "auth": "Logged In",
        "firstName": "Lily",
        "gender": "F",
        "itemInSession": 0,
        "lastName": "Koch",
        "length": length,
        "level": level,
        "location": "Chicago-Naperville-Elgin, IL-IN-WI",
        "method": "PUT",
        "page": "NextSong",
        "registration": 1541048010796.0,
        "sessionId": 818,
        "song": song,
        "status": 200,
        "ts": ts,
        "userAgent": "Mozilla/5.0 (X11; Linux x86_64)",
        "userId": user_id,
    })
}

/// Navigation event that must be filtered out
pub fn home_event(ts: i64, user_id: &str) -> Value {
    json!({
        "artist": null,
        "auth": "Logged In",
        "firstName": "Lily",
        "gender": "F",
        "itemInSession": 1,
        "lastName": "Koch",
        "length": null,
        "level": "paid",
        "location": "Chicago-Naperville-Elgin, IL-IN-WI",
        "method": "GET",
        "page": "Home",
        "registration": 1541048010796.0,
        "sessionId": 818,
        "song": null,
        "status": 200,
        "ts": ts,
        "userAgent": "Mozilla/5.0 (X11; Linux x86_64)",
        "userId": user_id,
    })
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}
