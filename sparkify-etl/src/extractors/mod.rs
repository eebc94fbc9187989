//! Extractors: raw record batches → canonical rows
//!
//! - [`catalog`]: one song-catalog file → Song and Artist rows
//! - [`activity`]: one session-log file → Time, User and proto-Songplay rows
//!
//! Both are fail-fast per batch: a corrupt record yields an error and no rows.

pub mod activity;
pub mod catalog;

pub use activity::{extract_activity, ActivityRows, LogEvent, NEXT_SONG_PAGE};
pub use catalog::{extract_catalog, CatalogRecord, CatalogRows};

use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub(crate) use crate::models::rows::non_nan;

/// Empty strings become null so they never count as populated values
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Lenient integer field: accepts `39`, `39.0`, `"39"`; `""` and `null` mean absent
pub(crate) fn de_opt_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                Ok(Some(i))
            } else {
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(Some(f as i64)),
                    _ => Err(D::Error::custom(format!("expected an integer, got {}", n))),
                }
            }
        }
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("expected an integer, got \"{}\"", s))),
        Some(other) => Err(D::Error::custom(format!("expected an integer, got {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct IdHolder {
        #[serde(default, deserialize_with = "de_opt_int")]
        id: Option<i64>,
    }

    fn parse_id(json: &str) -> Result<Option<i64>, serde_json::Error> {
        serde_json::from_str::<IdHolder>(json).map(|p| p.id)
    }

    #[test]
    fn test_lenient_integers() {
        assert_eq!(parse_id(r#"{"id": 39}"#).unwrap(), Some(39));
        assert_eq!(parse_id(r#"{"id": 39.0}"#).unwrap(), Some(39));
        assert_eq!(parse_id(r#"{"id": "39"}"#).unwrap(), Some(39));
        assert_eq!(parse_id(r#"{"id": ""}"#).unwrap(), None);
        assert_eq!(parse_id(r#"{"id": null}"#).unwrap(), None);
        assert_eq!(parse_id(r#"{}"#).unwrap(), None);
    }

    #[test]
    fn test_lenient_integers_reject_garbage() {
        assert!(parse_id(r#"{"id": "abc"}"#).is_err());
        assert!(parse_id(r#"{"id": 1.5}"#).is_err());
        assert!(parse_id(r#"{"id": [1]}"#).is_err());
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some(String::new())), None);
        assert_eq!(non_blank(Some("x".to_string())), Some("x".to_string()));
        assert_eq!(non_blank(None), None);
    }
}
