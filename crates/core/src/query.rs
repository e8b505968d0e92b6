//! Listing queries
//!
//! The remote listing API only filters by prefix. Everything else a caller
//! asks for is applied client-side to the merged records.

use jiff::Timestamp;

use crate::error::Result;
use crate::metadata::BlobMetadata;

/// Client-side predicate over a listed record
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Glob pattern over the full object name; `*` also crosses `/`
    NamePattern(glob::Pattern),
    /// Updated at or after the timestamp
    UpdatedAfter(Timestamp),
    /// Updated strictly before the timestamp
    UpdatedBefore(Timestamp),
    /// At least this many bytes
    MinSize(u64),
    /// At most this many bytes
    MaxSize(u64),
}

impl Filter {
    pub fn matches(&self, record: &BlobMetadata) -> bool {
        match self {
            Filter::NamePattern(pattern) => pattern.matches(&record.name),
            Filter::UpdatedAfter(ts) => record.updated >= *ts,
            Filter::UpdatedBefore(ts) => record.updated < *ts,
            Filter::MinSize(n) => record.size >= *n,
            Filter::MaxSize(n) => record.size <= *n,
        }
    }
}

/// Listing intent: remote prefix, page size, and client-side filters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Prefix passed to the remote listing
    pub prefix: String,

    /// Page size; the store default applies when unset
    pub page_size: Option<u32>,

    /// Filters applied after listing; all must match
    pub filters: Vec<Filter>,
}

impl Query {
    /// Query for every object under `prefix`
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Keep names matching a glob pattern
    pub fn name_pattern(self, pattern: &str) -> Result<Self> {
        Ok(self.with_filter(Filter::NamePattern(glob::Pattern::new(pattern)?)))
    }

    pub fn updated_after(self, ts: Timestamp) -> Self {
        self.with_filter(Filter::UpdatedAfter(ts))
    }

    pub fn updated_before(self, ts: Timestamp) -> Self {
        self.with_filter(Filter::UpdatedBefore(ts))
    }

    pub fn min_size(self, bytes: u64) -> Self {
        self.with_filter(Filter::MinSize(bytes))
    }

    pub fn max_size(self, bytes: u64) -> Self {
        self.with_filter(Filter::MaxSize(bytes))
    }

    /// Page size to request, never zero
    pub fn effective_page_size(&self, default: u32) -> u32 {
        self.page_size.unwrap_or(default).max(1)
    }

    /// Whether a record passes every filter
    pub fn matches(&self, record: &BlobMetadata) -> bool {
        self.filters.iter().all(|f| f.matches(record))
    }

    /// Drop records failing any filter, keeping order
    pub fn apply_filters(&self, records: Vec<BlobMetadata>) -> Vec<BlobMetadata> {
        if self.filters.is_empty() {
            return records;
        }
        records.into_iter().filter(|r| self.matches(r)).collect()
    }
}
