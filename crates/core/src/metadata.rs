//! Blob metadata
//!
//! Remote blobs carry a flat string-to-string metadata map next to their
//! name, size and last-updated time. The map has a few reserved keys that the
//! adapter fills in when the remote listing leaves them out.

use std::collections::BTreeMap;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Metadata key for the MIME type of the content
pub const CONTENT_TYPE: &str = "Content-Type";

/// Metadata key for the content length in bytes
pub const CONTENT_LENGTH: &str = "Content-Length";

/// Metadata key for the content hash reported by the remote store
pub const CONTENT_HASH: &str = "Content-Hash";

/// Content type used when none is set and none can be guessed
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Ordered string-to-string metadata map
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Insert a value, returning the previous one
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Insert a value only when the key is absent
    pub fn set_default(&mut self, key: &str, value: impl FnOnce() -> String) {
        if !self.0.contains_key(key) {
            self.0.insert(key.to_string(), value());
        }
    }

    /// Overlay locally edited entries onto a remote snapshot
    ///
    /// `Content-Length` and `Content-Hash` describe the remote body, so the
    /// snapshot keeps its own values for those.
    pub fn overlay_local(&mut self, local: &Metadata) {
        for (k, v) in local.iter() {
            if !matches!(k, CONTENT_LENGTH | CONTENT_HASH) {
                self.0.insert(k.to_string(), v.to_string());
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Entries other than the reserved `Content-*` keys
    pub fn user_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter()
            .filter(|(k, _)| !matches!(*k, CONTENT_TYPE | CONTENT_LENGTH | CONTENT_HASH))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get(CONTENT_TYPE)
    }

    /// Parsed `Content-Length`, if present and numeric
    pub fn content_length(&self) -> Option<u64> {
        self.get(CONTENT_LENGTH).and_then(|v| v.parse().ok())
    }

    pub fn content_hash(&self) -> Option<&str> {
        self.get(CONTENT_HASH)
    }
}

impl From<BTreeMap<String, String>> for Metadata {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Metadata record of one remote blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobMetadata {
    /// Object name, unique within the bucket
    pub name: String,

    /// Size in bytes
    pub size: u64,

    /// Last-updated timestamp
    pub updated: Timestamp,

    /// Content hash as reported upstream (ETag, MD5, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,

    /// Flat metadata map
    #[serde(default)]
    pub metadata: Metadata,
}

impl BlobMetadata {
    /// Create a record with empty metadata
    pub fn new(name: impl Into<String>, size: u64, updated: Timestamp) -> Self {
        Self {
            name: name.into(),
            size,
            updated,
            hash: None,
            metadata: Metadata::new(),
        }
    }

    /// Attach an upstream content hash
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    /// Fill in the reserved keys the remote listing may have left out
    ///
    /// `Content-Length` comes from the size attribute. `Content-Hash` is
    /// always present afterwards; it is empty when upstream reports no hash.
    pub fn hydrate(mut self) -> Self {
        let size = self.size;
        self.metadata
            .set_default(CONTENT_LENGTH, || size.to_string());
        let hash = self.hash.clone().unwrap_or_default();
        self.metadata.set_default(CONTENT_HASH, || hash);
        self
    }

    /// Human-readable size
    pub fn size_human(&self) -> String {
        humansize::format_size(self.size, humansize::BINARY)
    }
}

/// Content type for an upload: explicit metadata first, then a guess from the name
pub fn derive_content_type(name: &str, metadata: &Metadata) -> String {
    if let Some(ct) = metadata.content_type().filter(|ct| !ct.is_empty()) {
        return ct.to_string();
    }
    mime_guess::from_path(name)
        .first_raw()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hydrate_fills_missing_keys() {
        let record = BlobMetadata::new("a.txt", 12, Timestamp::UNIX_EPOCH).hydrate();
        assert_eq!(record.metadata.content_length(), Some(12));
        assert_eq!(record.metadata.content_hash(), Some(""));
    }

    #[test]
    fn test_hydrate_uses_upstream_hash() {
        let record = BlobMetadata::new("a.txt", 3, Timestamp::UNIX_EPOCH)
            .with_hash("abc123")
            .hydrate();
        assert_eq!(record.metadata.content_hash(), Some("abc123"));
    }

    #[test]
    fn test_hydrate_keeps_existing_values() {
        let mut record = BlobMetadata::new("a.txt", 3, Timestamp::UNIX_EPOCH).with_hash("new");
        record.metadata.insert(CONTENT_LENGTH, "99");
        record.metadata.insert(CONTENT_HASH, "old");
        let record = record.hydrate();
        assert_eq!(record.metadata.content_length(), Some(99));
        assert_eq!(record.metadata.content_hash(), Some("old"));
    }

    #[test]
    fn test_overlay_local_keeps_remote_body_keys() {
        let mut remote: Metadata = [(CONTENT_LENGTH, "8"), (CONTENT_HASH, "new"), ("a", "1")]
            .into_iter()
            .collect();
        let local: Metadata = [
            (CONTENT_LENGTH, "2"),
            (CONTENT_HASH, "old"),
            (CONTENT_TYPE, "text/csv"),
            ("a", "edited"),
        ]
        .into_iter()
        .collect();
        remote.overlay_local(&local);
        assert_eq!(remote.content_length(), Some(8));
        assert_eq!(remote.content_hash(), Some("new"));
        assert_eq!(remote.content_type(), Some("text/csv"));
        assert_eq!(remote.get("a"), Some("edited"));
    }

    #[test]
    fn test_user_entries_skip_reserved() {
        let meta: Metadata = [
            (CONTENT_TYPE, "text/plain"),
            (CONTENT_LENGTH, "3"),
            ("owner", "ops"),
        ]
        .into_iter()
        .collect();
        let user: Vec<_> = meta.user_entries().collect();
        assert_eq!(user, vec![("owner", "ops")]);
    }

    #[test]
    fn test_derive_content_type() {
        let empty = Metadata::new();
        assert_eq!(derive_content_type("notes.txt", &empty), "text/plain");
        assert_eq!(derive_content_type("blob", &empty), DEFAULT_CONTENT_TYPE);

        let explicit: Metadata = [(CONTENT_TYPE, "application/x-ndjson")].into_iter().collect();
        assert_eq!(
            derive_content_type("notes.txt", &explicit),
            "application/x-ndjson"
        );
    }

    #[test]
    fn test_size_human() {
        let record = BlobMetadata::new("big", 2048, Timestamp::UNIX_EPOCH);
        assert_eq!(record.size_human(), "2 KiB");
    }
}
