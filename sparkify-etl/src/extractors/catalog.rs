//! Song-catalog extractor
//!
//! A catalog file holds one JSON object per song (normally exactly one per
//! file). Each object yields one Song row and one Artist row.

use super::{de_opt_int, non_blank, non_nan};
use crate::models::{ArtistRow, SongRow};
use serde::Deserialize;
use sparkify_common::{Error, Result};

/// Raw catalog record as found on disk
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogRecord {
    pub song_id: Option<String>,
    pub title: Option<String>,
    pub artist_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_int")]
    pub year: Option<i64>,
    pub duration: Option<f64>,
    pub artist_name: Option<String>,
    pub artist_location: Option<String>,
    pub artist_latitude: Option<f64>,
    pub artist_longitude: Option<f64>,
}

/// Rows extracted from one catalog file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogRows {
    pub songs: Vec<SongRow>,
    pub artists: Vec<ArtistRow>,
}

/// Parse every JSON object in a catalog file
pub fn parse_catalog(source: &str, content: &str) -> Result<Vec<CatalogRecord>> {
    let records = serde_json::Deserializer::from_str(content)
        .into_iter::<CatalogRecord>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::malformed(source, e.to_string()))?;

    if records.is_empty() {
        return Err(Error::malformed(source, "no catalog record found"));
    }

    Ok(records)
}

/// Split one catalog record into its Song and Artist rows
pub fn extract_record(source: &str, record: CatalogRecord) -> Result<(SongRow, ArtistRow)> {
    let song_id = non_blank(record.song_id)
        .ok_or_else(|| Error::malformed(source, "missing song_id"))?;
    let artist_id = non_blank(record.artist_id)
        .ok_or_else(|| Error::malformed(source, format!("song {} has no artist_id", song_id)))?;

    let song = SongRow {
        song_id,
        title: non_blank(record.title),
        artist_id: artist_id.clone(),
        year: record.year,
        duration: non_nan(record.duration),
    };

    let artist = ArtistRow {
        artist_id,
        name: non_blank(record.artist_name),
        location: non_blank(record.artist_location),
        latitude: non_nan(record.artist_latitude),
        longitude: non_nan(record.artist_longitude),
    };

    Ok((song, artist))
}

/// Extract all rows from one catalog file's content
///
/// Fails without emitting rows if any record in the file is unusable.
pub fn extract_catalog(source: &str, content: &str) -> Result<CatalogRows> {
    let mut rows = CatalogRows::default();

    for record in parse_catalog(source, content)? {
        let (song, artist) = extract_record(source, record)?;
        rows.songs.push(song);
        rows.artists.push(artist);
    }

    Ok(rows)
}
