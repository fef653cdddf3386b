//! Object keys and bucket snapshots

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an object within a bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectKey(String);

impl ObjectKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ObjectKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for ObjectKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// One page of a listing call
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub keys: Vec<ObjectKey>,
    /// Marker for the next page; `None` when the listing is exhausted
    pub next_continuation_token: Option<String>,
}

impl ListPage {
    pub fn is_truncated(&self) -> bool {
        self.next_continuation_token.is_some()
    }
}

/// The keys present in a bucket at one instant, in listing order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    keys: Vec<ObjectKey>,
}

impl Snapshot {
    pub fn keys(&self) -> &[ObjectKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn extend(&mut self, page: ListPage) {
        self.keys.extend(page.keys);
    }

    pub fn into_keys(self) -> Vec<ObjectKey> {
        self.keys
    }
}
