//! Fill-forward conflict rule
//!
//! When an incoming dimension row collides with an existing one, each
//! descriptive field keeps its existing value unless that value is blank, in
//! which case the incoming value is adopted. Text is blank when NULL, empty
//! or the literal placeholder `None`; numbers are blank when NULL or NaN.
//!
//! The same rule exists twice: as plain Rust (used to pre-collapse catalog
//! duplicates before staging) and as SQL `CASE` expressions (used by the
//! merge statement). Tests keep the two in agreement.

use crate::models::{ArtistRow, SongRow};
use sparkify_common::FieldRule;
use std::collections::HashMap;

/// Placeholder some upstream writers store instead of NULL
pub const NONE_PLACEHOLDER: &str = "None";

/// Field value subject to the fill-forward rule
pub trait FillForward {
    fn is_blank(&self) -> bool;
}

impl FillForward for String {
    fn is_blank(&self) -> bool {
        self.is_empty() || self == NONE_PLACEHOLDER
    }
}

impl FillForward for f64 {
    fn is_blank(&self) -> bool {
        self.is_nan()
    }
}

impl FillForward for i64 {
    fn is_blank(&self) -> bool {
        false
    }
}

impl<T: FillForward> FillForward for Option<T> {
    fn is_blank(&self) -> bool {
        self.as_ref().map_or(true, FillForward::is_blank)
    }
}

/// Resolve one field: keep `existing` unless it is blank
pub fn fill_forward<T: FillForward>(existing: T, incoming: T) -> T {
    if existing.is_blank() {
        incoming
    } else {
        existing
    }
}

/// Dimension row merged field by field on a natural key
pub trait KeyedRow: Sized {
    fn key(&self) -> &str;

    /// Apply the fill-forward rule to every descriptive field
    fn fill_forward_from(self, incoming: Self) -> Self;
}

impl KeyedRow for SongRow {
    fn key(&self) -> &str {
        &self.song_id
    }

    fn fill_forward_from(self, incoming: Self) -> Self {
        SongRow {
            song_id: self.song_id,
            title: fill_forward(self.title, incoming.title),
            artist_id: fill_forward(self.artist_id, incoming.artist_id),
            year: fill_forward(self.year, incoming.year),
            duration: fill_forward(self.duration, incoming.duration),
        }
    }
}

impl KeyedRow for ArtistRow {
    fn key(&self) -> &str {
        &self.artist_id
    }

    fn fill_forward_from(self, incoming: Self) -> Self {
        ArtistRow {
            artist_id: self.artist_id,
            name: fill_forward(self.name, incoming.name),
            location: fill_forward(self.location, incoming.location),
            latitude: fill_forward(self.latitude, incoming.latitude),
            longitude: fill_forward(self.longitude, incoming.longitude),
        }
    }
}

/// Collapse rows sharing a key, earlier rows taking precedence
///
/// Output keeps the order in which keys were first seen.
pub fn collapse_by_key<R: KeyedRow>(rows: Vec<R>) -> Vec<R> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<Option<R>> = Vec::with_capacity(rows.len());

    for row in rows {
        match index.get(row.key()) {
            Some(&pos) => {
                if let Some(existing) = out[pos].take() {
                    out[pos] = Some(existing.fill_forward_from(row));
                }
            }
            None => {
                index.insert(row.key().to_string(), out.len());
                out.push(Some(row));
            }
        }
    }

    out.into_iter().flatten().collect()
}

/// SQL predicate that is true when `table.column` is blank under `rule`
///
/// Returns `None` for columns the rule never rewrites.
pub fn blank_condition(rule: FieldRule, table: &str, column: &str) -> Option<String> {
    let col = format!("{}.{}", table, column);
    match rule {
        FieldRule::FillForwardText => Some(format!(
            "({col} IS NULL OR {col} = '' OR {col} = '{NONE_PLACEHOLDER}')"
        )),
        // NaN never equals itself
        FieldRule::FillForwardNumeric => Some(format!("({col} IS NULL OR {col} <> {col})")),
        FieldRule::Key | FieldRule::Keep => None,
    }
}

/// `SET` clause item adopting the incoming value only over a blank one
pub fn fill_forward_assignment(rule: FieldRule, table: &str, column: &str) -> Option<String> {
    blank_condition(rule, table, column).map(|blank| {
        format!(
            "{column} = CASE WHEN {blank} THEN excluded.{column} ELSE {table}.{column} END"
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(title: Option<&str>, year: Option<i64>, duration: Option<f64>) -> SongRow {
        SongRow {
            song_id: "S1".to_string(),
            title: title.map(str::to_string),
            artist_id: "A1".to_string(),
            year,
            duration,
        }
    }

    #[test]
    fn test_blank_values() {
        assert!(Some(String::new()).is_blank());
        assert!(Some("None".to_string()).is_blank());
        assert!(None::<String>.is_blank());
        assert!(!Some("none".to_string()).is_blank());
        assert!(Some(f64::NAN).is_blank());
        assert!(!Some(0.0_f64).is_blank());
        assert!(!Some(0_i64).is_blank());
        assert!(None::<i64>.is_blank());
    }

    #[test]
    fn test_populated_value_is_never_regressed() {
        let existing = song(Some("Song X"), Some(2003), Some(211.5));
        let incoming = song(Some(""), Some(0), Some(f64::NAN));
        assert_eq!(existing.clone().fill_forward_from(incoming), existing);
    }

    #[test]
    fn test_blank_value_adopts_incoming() {
        let existing = song(Some("None"), None, Some(f64::NAN));
        let incoming = song(Some("Song X"), Some(2003), Some(211.5));
        assert_eq!(existing.fill_forward_from(incoming.clone()), incoming);
    }

    #[test]
    fn test_collapse_is_order_preserving_and_associative() {
        let a = song(None, Some(1999), None);
        let b = song(Some("Title"), Some(2005), None);
        let c = song(Some("Other"), None, Some(120.0));
        let mut other = song(None, None, None);
        other.song_id = "S0".to_string();

        let collapsed = collapse_by_key(vec![a.clone(), other.clone(), b.clone(), c.clone()]);
        assert_eq!(collapsed.len(), 2);
        assert_eq!(collapsed[0], song(Some("Title"), Some(1999), Some(120.0)));
        assert_eq!(collapsed[1], other);

        // (a ⊕ b) ⊕ c == a ⊕ (b ⊕ c)
        let left = a.clone().fill_forward_from(b.clone()).fill_forward_from(c.clone());
        let right = a.fill_forward_from(b.fill_forward_from(c));
        assert_eq!(left, right);
    }

    #[test]
    fn test_sql_assignments() {
        assert_eq!(
            fill_forward_assignment(FieldRule::FillForwardText, "songs", "title").unwrap(),
            "title = CASE WHEN (songs.title IS NULL OR songs.title = '' OR songs.title = 'None') \
             THEN excluded.title ELSE songs.title END"
        );
        assert!(fill_forward_assignment(FieldRule::Key, "songs", "song_id").is_none());
        assert!(fill_forward_assignment(FieldRule::Keep, "users", "gender").is_none());
    }

    #[tokio::test]
    async fn test_sql_rule_agrees_with_rust_rule() {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        let text = blank_condition(FieldRule::FillForwardText, "t", "v").unwrap();
        let numeric = blank_condition(FieldRule::FillForwardNumeric, "t", "v").unwrap();

        for value in [None, Some(""), Some("None"), Some("Song X"), Some("none")] {
            let sql = format!("SELECT {} FROM (SELECT ? AS v) AS t", text);
            let blank: bool = sqlx::query_scalar(&sql).bind(value).fetch_one(&pool).await.unwrap();
            assert_eq!(blank, value.map(str::to_string).is_blank(), "text {:?}", value);
        }

        for value in [None, Some(0.0_f64), Some(211.5)] {
            let sql = format!("SELECT {} FROM (SELECT ? AS v) AS t", numeric);
            let blank: bool = sqlx::query_scalar(&sql).bind(value).fetch_one(&pool).await.unwrap();
            assert_eq!(blank, value.is_blank(), "numeric {:?}", value);
        }
    }
}
