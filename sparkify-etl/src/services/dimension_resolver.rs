//! Dimension key resolution for songplays
//!
//! A play event names its song by title, artist name and length. The
//! resolver finds the matching `(song_id, artist_id)` in the merged songs
//! and artists tables by exact equality on all three. Duration is compared
//! without tolerance. When several catalog entries match, the one with the
//! lowest `(song_id, artist_id)` is used. No match leaves both keys null.

use crate::models::{ProtoSongplay, SongplayRow};
use crate::workflow::barrier::DimensionsReady;
use sparkify_common::{Error, Result};
use sqlx::SqliteConnection;
use std::collections::HashMap;
use tracing::debug;

const LOOKUP_SQL: &str = r#"
    SELECT songs.song_id, songs.artist_id
    FROM songs
    INNER JOIN artists ON songs.artist_id = artists.artist_id
    WHERE songs.title = ? AND artists.name = ? AND songs.duration = ?
    ORDER BY songs.song_id, songs.artist_id
    LIMIT 1
"#;

/// (title, artist name, duration bits)
type LookupKey = (String, String, u64);

/// Resolved `(song_id, artist_id)`
pub type DimensionKeys = (String, String);

/// Memoizing song/artist key resolver
///
/// Songs and artists do not change while activity files are processed, so
/// one resolver is shared by every file of an activity phase.
#[derive(Debug, Default)]
pub struct DimensionResolver {
    cache: HashMap<LookupKey, Option<DimensionKeys>>,
    queries: u64,
}

impl DimensionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Database round-trips issued so far
    pub fn queries(&self) -> u64 {
        self.queries
    }

    /// Forget memoized results
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Look up the keys for one (title, artist, duration) triple
    pub async fn lookup(
        &mut self,
        conn: &mut SqliteConnection,
        title: &str,
        artist: &str,
        duration: f64,
        _ready: &DimensionsReady,
    ) -> Result<Option<DimensionKeys>> {
        let key = (title.to_string(), artist.to_string(), duration.to_bits());
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit.clone());
        }

        let found: Option<DimensionKeys> = sqlx::query_as(LOOKUP_SQL)
            .bind(title)
            .bind(artist)
            .bind(duration)
            .fetch_optional(&mut *conn)
            .await
            .map_err(Error::from_storage)?;
        self.queries += 1;

        if found.is_none() {
            debug!("No catalog match for '{}' by '{}' ({})", title, artist, duration);
        }

        self.cache.insert(key, found.clone());
        Ok(found)
    }

    /// Attach dimension keys to one proto-songplay
    ///
    /// Events missing title, artist or length stay unresolved without a query.
    pub async fn resolve(
        &mut self,
        conn: &mut SqliteConnection,
        proto: ProtoSongplay,
        ready: &DimensionsReady,
    ) -> Result<SongplayRow> {
        let keys = match (&proto.song_title, &proto.artist_name, proto.length) {
            (Some(title), Some(artist), Some(length)) => {
                self.lookup(conn, title, artist, length, ready).await?
            }
            _ => None,
        };
        Ok(proto.into_songplay(keys))
    }

    pub async fn resolve_all(
        &mut self,
        conn: &mut SqliteConnection,
        protos: Vec<ProtoSongplay>,
        ready: &DimensionsReady,
    ) -> Result<Vec<SongplayRow>> {
        let mut rows = Vec::with_capacity(protos.len());
        for proto in protos {
            rows.push(self.resolve(conn, proto, ready).await?);
        }
        Ok(rows)
    }
}
