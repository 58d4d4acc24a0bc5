//! Record key derivation
//!
//! Keys are `{namespace}-{row}` for row ratings and `{namespace}_settings`
//! for per-dataset settings. The namespace is the dataset file name with its
//! extension and every non-alphanumeric character removed, so the same file
//! maps to the same keys on every device.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Suffix of the per-dataset settings key
pub const SETTINGS_SUFFIX: &str = "_settings";

/// Identifier of a dataset inside the shared remote document
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetNamespace(String);

impl DatasetNamespace {
    /// Derive the namespace from a dataset (file) name
    ///
    /// `"Vocab 1.csv"` becomes `"Vocab1"`. Only the last extension is
    /// stripped; a leading dot does not count as an extension.
    #[must_use]
    pub fn from_dataset_name(name: &str) -> Self {
        let stem = match name.rfind('.') {
            Some(idx) if idx > 0 => &name[..idx],
            _ => name,
        };
        Self(stem.chars().filter(char::is_ascii_alphanumeric).collect())
    }

    /// Namespace text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key of the rating record for `row`
    #[must_use]
    pub fn item_key(&self, row: &RowId) -> String {
        format!("{}-{}", self.0, row.as_str())
    }

    /// Key of this dataset's settings record
    #[must_use]
    pub fn settings_key(&self) -> String {
        format!("{}{SETTINGS_SUFFIX}", self.0)
    }

    /// Prefix shared by every item key of this dataset
    #[must_use]
    pub fn item_prefix(&self) -> String {
        format!("{}-", self.0)
    }

    /// Row identifier encoded in `key`, if `key` is one of this dataset's item keys
    #[must_use]
    pub fn row_of<'k>(&self, key: &'k str) -> Option<&'k str> {
        key.strip_prefix(self.0.as_str())?
            .strip_prefix('-')
            .filter(|row| !row.is_empty())
    }
}

impl fmt::Display for DatasetNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one source row
///
/// The row's own `id` column when it has one, otherwise its zero-based
/// position in the dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(String);

impl RowId {
    /// Identity for a row with an optional `id` column at `index`
    #[must_use]
    pub fn from_row(id: Option<&str>, index: usize) -> Self {
        match id.map(str::trim) {
            Some(id) if !id.is_empty() => Self(id.to_string()),
            _ => Self(index.to_string()),
        }
    }

    /// Identity text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RowId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RowId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
