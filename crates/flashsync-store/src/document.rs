//! Whole remote document
//!
//! The store holds one JSON object mapping record keys to record values.
//! Values are kept as raw JSON so entries written by other clients survive a
//! read-merge-write cycle untouched.

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Envelope field some stores wrap the document in
pub const ENVELOPE_FIELD: &str = "record";

/// Key → record mapping, fetched and replaced as a unit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    entries: Map<String, Value>,
}

impl Document {
    /// Empty document
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Interpret a response body as a document
    ///
    /// Accepts either a bare object or one wrapped as `{"record": {...}}`.
    /// `null` is treated as an empty document.
    ///
    /// # Errors
    /// - `StoreError::Malformed` if the body is not an object
    pub fn from_body(body: Value) -> Result<Self, StoreError> {
        match body {
            Value::Null => Ok(Self::new()),
            Value::Object(mut map) => {
                let wrapped = matches!(map.get(ENVELOPE_FIELD), Some(Value::Object(_)));
                if wrapped {
                    if let Some(Value::Object(inner)) = map.remove(ENVELOPE_FIELD) {
                        return Ok(Self { entries: inner });
                    }
                }
                Ok(Self { entries: map })
            }
            other => Err(StoreError::Malformed(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Raw value stored under `key`
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Merge one record into the document, returning the previous value
    #[inline]
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    /// Drop the record under `key`
    #[inline]
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    /// Whether `key` is present
    #[inline]
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of records
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the document holds no records
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over keys and raw values
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// Iterate over keys starting with `prefix`
    pub fn iter_prefixed<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a String, &'a Value)> + 'a {
        self.entries.iter().filter(move |(k, _)| k.starts_with(prefix))
    }

    /// Convert into a bare JSON object
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.entries)
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = serde_json::map::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn bare_object_is_used_as_is() {
        let doc = Document::from_body(json!({"vocab1-3": {"stars": 4}})).unwrap();
        assert_eq!(doc.len(), 1);
        assert_eq!(doc.get("vocab1-3"), Some(&json!({"stars": 4})));
    }

    #[test]
    fn envelope_is_unwrapped() {
        let body = json!({
            "record": {"vocab1-3": {"stars": 4}, "vocab1_settings": {"sortByStars": true}},
            "metadata": {"id": "abc", "private": true}
        });
        let doc = Document::from_body(body).unwrap();
        assert_eq!(doc.len(), 2);
        assert!(doc.contains_key("vocab1_settings"));
        assert!(!doc.contains_key("metadata"));
    }

    #[test]
    fn null_body_is_empty_document() {
        assert!(Document::from_body(Value::Null).unwrap().is_empty());
    }

    #[test]
    fn non_object_body_is_malformed() {
        let err = Document::from_body(json!([1, 2, 3])).unwrap_err();
        assert_eq!(err, StoreError::Malformed("expected a JSON object, got an array".into()));
    }

    #[test]
    fn serializes_as_bare_object() {
        let mut doc = Document::new();
        doc.insert("a-1", json!({"stars": 1}));
        assert_eq!(serde_json::to_value(&doc).unwrap(), json!({"a-1": {"stars": 1}}));
    }

    #[test]
    fn prefix_iteration_filters_keys() {
        let doc: Document = vec![
            ("vocab1-1".to_string(), json!({})),
            ("vocab1-2".to_string(), json!({})),
            ("other-1".to_string(), json!({})),
        ]
        .into_iter()
        .collect();
        assert_eq!(doc.iter_prefixed("vocab1-").count(), 2);
    }
}
