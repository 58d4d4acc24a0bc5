//! Synchronized record shape
//!
//! Item ratings and dataset settings share one record layout. Fields this
//! crate does not know about are carried through untouched.

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Highest star rating
pub const MAX_STARS: u8 = 5;

/// Star filter applied to a dataset view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterLevel {
    /// Show every row
    #[default]
    All,
    /// Show rows rated exactly this many stars
    Stars(u8),
}

impl fmt::Display for FilterLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Stars(n) => write!(f, "{n}"),
        }
    }
}

/// Unrecognized filter level text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid filter level {0:?}: expected \"all\" or 0-5")]
pub struct ParseFilterLevelError(String);

impl FromStr for FilterLevel {
    type Err = ParseFilterLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        match s.parse::<u8>() {
            Ok(n) if n <= MAX_STARS => Ok(Self::Stars(n)),
            _ => Err(ParseFilterLevelError(s.to_string())),
        }
    }
}

impl Serialize for FilterLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FilterLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Older clients wrote the level as a bare number.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s.parse().map_err(de::Error::custom),
            Raw::Number(n) => u8::try_from(n)
                .ok()
                .filter(|n| *n <= MAX_STARS)
                .map(Self::Stars)
                .ok_or_else(|| de::Error::custom(format!("filter level {n} out of range"))),
        }
    }
}

/// One synchronized record (a row rating or a dataset's settings)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    /// Key this record is stored under
    #[serde(default)]
    pub key: String,
    /// Star rating, 0-5
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stars: Option<u8>,
    /// 1-based row last shown to the user
    #[serde(default)]
    pub last_viewed_row: Option<u32>,
    /// Active star filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_level: Option<FilterLevel>,
    /// Whether rows are ordered by rating
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by_stars: Option<bool>,
    /// Last local modification time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    /// Fields written by other clients
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SyncRecord {
    /// Fresh rating record for a row not seen before
    #[must_use]
    pub fn new_item(key: impl Into<String>, stars: u8) -> Self {
        Self {
            key: key.into(),
            stars: Some(stars),
            last_viewed_row: None,
            filter_level: Some(FilterLevel::All),
            sort_by_stars: Some(false),
            ..Self::default()
        }
    }

    /// Empty settings record
    #[must_use]
    pub fn new_settings(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// With a star rating
    #[inline]
    #[must_use]
    pub fn with_stars(mut self, stars: u8) -> Self {
        self.stars = Some(stars);
        self
    }

    /// With the last viewed row
    #[inline]
    #[must_use]
    pub fn with_last_viewed_row(mut self, row: u32) -> Self {
        self.last_viewed_row = Some(row);
        self
    }

    /// With a star filter
    #[inline]
    #[must_use]
    pub fn with_filter_level(mut self, level: FilterLevel) -> Self {
        self.filter_level = Some(level);
        self
    }

    /// With rating-ordered sorting on or off
    #[inline]
    #[must_use]
    pub fn with_sort_by_stars(mut self, sort: bool) -> Self {
        self.sort_by_stars = Some(sort);
        self
    }

    /// Stamp with the current time
    #[inline]
    #[must_use]
    pub fn touched(mut self) -> Self {
        self.last_updated = Some(Utc::now());
        self
    }

    /// Decode a raw document entry, filling in the key when the entry omits it
    ///
    /// # Errors
    /// Returns the serde error when the entry is not a record
    pub fn from_value(key: &str, value: &Value) -> Result<Self, serde_json::Error> {
        let mut record = Self::deserialize(value)?;
        if record.key.is_empty() {
            record.key = key.to_string();
        }
        Ok(record)
    }

    /// Encode for the remote document
    ///
    /// # Errors
    /// Returns the serde error if a carried-through field cannot be encoded
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Whether two records agree on every sync-relevant field
///
/// Compares `stars`, `filter_level`, `sort_by_stars` and `last_viewed_row`;
/// keys, timestamps and extra fields are ignored. Absent records never compare
/// equal. A missing `filter_level` reads as `All` and a missing
/// `sort_by_stars` as `false`, the values a new record is created with.
#[must_use]
pub fn is_data_equal(a: Option<&SyncRecord>, b: Option<&SyncRecord>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => {
            a.stars == b.stars
                && a.filter_level.unwrap_or_default() == b.filter_level.unwrap_or_default()
                && a.sort_by_stars.unwrap_or_default() == b.sort_by_stars.unwrap_or_default()
                && a.last_viewed_row == b.last_viewed_row
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn camel_case_round_trip_keeps_unknown_fields() {
        let raw = json!({
            "key": "vocab1-3",
            "stars": 4,
            "lastViewedRow": null,
            "filterLevel": "all",
            "sortByStars": false,
            "deviceName": "tablet"
        });
        let record = SyncRecord::from_value("vocab1-3", &raw).unwrap();
        assert_eq!(record.stars, Some(4));
        assert_eq!(record.filter_level, Some(FilterLevel::All));
        assert_eq!(record.extra.get("deviceName"), Some(&json!("tablet")));
        assert_eq!(record.to_value().unwrap(), raw);
    }

    #[test]
    fn sparse_record_equals_its_defaults() {
        let sparse = SyncRecord::from_value("k-1", &json!({"stars": 2})).unwrap();
        let full = SyncRecord::new_item("k-1", 2);
        assert!(is_data_equal(Some(&sparse), Some(&full)));
        assert!(is_data_equal(Some(&full), Some(&sparse)));
        assert!(!is_data_equal(Some(&sparse), Some(&full.clone().with_sort_by_stars(true))));
        assert!(!is_data_equal(
            Some(&sparse),
            Some(&full.with_filter_level(FilterLevel::Stars(0)))
        ));
    }

    #[test]
    fn missing_key_is_filled_from_document_key() {
        let record = SyncRecord::from_value("vocab1_settings", &json!({"sortByStars": true})).unwrap();
        assert_eq!(record.key, "vocab1_settings");
        assert_eq!(record.sort_by_stars, Some(true));
    }

    #[test]
    fn filter_level_accepts_text_and_numbers() {
        let a: FilterLevel = serde_json::from_value(json!("3")).unwrap();
        let b: FilterLevel = serde_json::from_value(json!(3)).unwrap();
        let c: FilterLevel = serde_json::from_value(json!("ALL")).unwrap();
        assert_eq!(a, FilterLevel::Stars(3));
        assert_eq!(b, FilterLevel::Stars(3));
        assert_eq!(c, FilterLevel::All);
        assert!(serde_json::from_value::<FilterLevel>(json!("9")).is_err());
        assert_eq!(serde_json::to_value(FilterLevel::Stars(2)).unwrap(), json!("2"));
    }

    #[test]
    fn new_item_matches_default_row_shape() {
        let record = SyncRecord::new_item("vocab1-3", 4);
        assert_eq!(
            record.to_value().unwrap(),
            json!({
                "key": "vocab1-3",
                "stars": 4,
                "lastViewedRow": null,
                "filterLevel": "all",
                "sortByStars": false
            })
        );
    }

    #[test]
    fn equality_only_considers_sync_fields() {
        let a = SyncRecord::new_item("k", 2).touched();
        let mut b = SyncRecord::new_item("other", 2);
        b.extra.insert("note".into(), json!("x"));
        assert!(is_data_equal(Some(&a), Some(&b)));

        assert!(!is_data_equal(Some(&a), Some(&b.clone().with_stars(3))));
        assert!(!is_data_equal(Some(&a), Some(&b.clone().with_last_viewed_row(7))));
        assert!(!is_data_equal(Some(&a), None));
        assert!(!is_data_equal(None, None));
    }
}
