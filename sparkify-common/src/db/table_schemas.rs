//! Table catalogue
//!
//! Single source of truth for the warehouse tables as the loader sees them:
//! SQL name, the columns a staging relation carries, the natural key, and
//! how each column behaves when an incoming row collides with an existing one.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Per-column conflict behaviour used by the merge engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    /// Part of the natural key
    Key,
    /// Keep existing text unless it is NULL, empty or the literal `None`
    FillForwardText,
    /// Keep existing number unless it is NULL or NaN
    FillForwardNumeric,
    /// Never touched once the row exists
    Keep,
}

/// Column as seen by staging and merge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub rule: FieldRule,
}

impl ColumnDef {
    const fn new(name: &'static str, sql_type: &'static str, rule: FieldRule) -> Self {
        Self { name, sql_type, rule }
    }
}

const SONG_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("song_id", "TEXT", FieldRule::Key),
    ColumnDef::new("title", "TEXT", FieldRule::FillForwardText),
    ColumnDef::new("artist_id", "TEXT", FieldRule::FillForwardText),
    ColumnDef::new("year", "INTEGER", FieldRule::FillForwardNumeric),
    ColumnDef::new("duration", "REAL", FieldRule::FillForwardNumeric),
];

const ARTIST_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("artist_id", "TEXT", FieldRule::Key),
    ColumnDef::new("name", "TEXT", FieldRule::FillForwardText),
    ColumnDef::new("location", "TEXT", FieldRule::FillForwardText),
    ColumnDef::new("latitude", "REAL", FieldRule::FillForwardNumeric),
    ColumnDef::new("longitude", "REAL", FieldRule::FillForwardNumeric),
];

const USER_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("user_id", "INTEGER", FieldRule::Key),
    ColumnDef::new("first_name", "TEXT", FieldRule::Keep),
    ColumnDef::new("last_name", "TEXT", FieldRule::Keep),
    ColumnDef::new("gender", "TEXT", FieldRule::Keep),
    ColumnDef::new("level", "TEXT", FieldRule::Key),
];

const TIME_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("start_time", "TEXT", FieldRule::Key),
    ColumnDef::new("hour", "INTEGER", FieldRule::Keep),
    ColumnDef::new("day", "INTEGER", FieldRule::Keep),
    ColumnDef::new("week", "INTEGER", FieldRule::Keep),
    ColumnDef::new("month", "INTEGER", FieldRule::Keep),
    ColumnDef::new("year", "INTEGER", FieldRule::Keep),
    ColumnDef::new("weekday", "INTEGER", FieldRule::Keep),
];

// songplay_id is a surrogate assigned on insert and never staged
const SONGPLAY_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("start_time", "TEXT", FieldRule::Keep),
    ColumnDef::new("user_id", "INTEGER", FieldRule::Keep),
    ColumnDef::new("level", "TEXT", FieldRule::Keep),
    ColumnDef::new("song_id", "TEXT", FieldRule::Keep),
    ColumnDef::new("artist_id", "TEXT", FieldRule::Keep),
    ColumnDef::new("session_id", "INTEGER", FieldRule::Keep),
    ColumnDef::new("location", "TEXT", FieldRule::Keep),
    ColumnDef::new("user_agent", "TEXT", FieldRule::Keep),
];

/// Warehouse tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Songs,
    Artists,
    Users,
    Time,
    Songplays,
}

impl Table {
    pub const ALL: [Table; 5] = [
        Table::Songs,
        Table::Artists,
        Table::Users,
        Table::Time,
        Table::Songplays,
    ];

    /// Dimension tables, in merge order
    pub const DIMENSIONS: [Table; 4] = [Table::Artists, Table::Songs, Table::Users, Table::Time];

    /// SQL table name
    pub fn name(&self) -> &'static str {
        match self {
            Table::Songs => "songs",
            Table::Artists => "artists",
            Table::Users => "users",
            Table::Time => "time",
            Table::Songplays => "songplays",
        }
    }

    /// Columns carried by the staging relation, in insert order
    pub fn columns(&self) -> &'static [ColumnDef] {
        match self {
            Table::Songs => SONG_COLUMNS,
            Table::Artists => ARTIST_COLUMNS,
            Table::Users => USER_COLUMNS,
            Table::Time => TIME_COLUMNS,
            Table::Songplays => SONGPLAY_COLUMNS,
        }
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns().iter().map(|c| c.name).collect()
    }

    /// Natural key columns (empty for the fact table)
    pub fn natural_key(&self) -> Vec<&'static str> {
        self.columns()
            .iter()
            .filter(|c| c.rule == FieldRule::Key)
            .map(|c| c.name)
            .collect()
    }

    /// Surrogate key column, if the table has one
    pub fn surrogate_key(&self) -> Option<&'static str> {
        match self {
            Table::Songplays => Some("songplay_id"),
            _ => None,
        }
    }

    pub fn is_dimension(&self) -> bool {
        !matches!(self, Table::Songplays)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Table {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Table::ALL
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidInput(format!("Unknown table: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_keys() {
        assert_eq!(Table::Songs.natural_key(), vec!["song_id"]);
        assert_eq!(Table::Artists.natural_key(), vec!["artist_id"]);
        assert_eq!(Table::Users.natural_key(), vec!["user_id", "level"]);
        assert_eq!(Table::Time.natural_key(), vec!["start_time"]);
        assert!(Table::Songplays.natural_key().is_empty());
    }

    #[test]
    fn test_dimension_classification() {
        for table in Table::DIMENSIONS {
            assert!(table.is_dimension());
        }
        assert!(!Table::Songplays.is_dimension());
    }

    #[test]
    fn test_parse_round_trip() {
        for table in Table::ALL {
            assert_eq!(table.name().parse::<Table>().unwrap(), table);
        }
        assert_eq!("SONGPLAYS".parse::<Table>().unwrap(), Table::Songplays);
        assert!("playlists".parse::<Table>().is_err());
    }

    #[test]
    fn test_surrogate_key_not_staged() {
        assert!(!Table::Songplays.column_names().contains(&"songplay_id"));
    }
}
