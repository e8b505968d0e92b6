//! In-memory remote client for testing and ephemeral use.
//!
//! [`MemoryClient`] keeps blobs in a `BTreeMap` behind a `Mutex` and
//! implements [`RemoteClient`] with prefix listing and continuation tokens.
//! It can be told to fail upcoming calls with transient errors and counts
//! every call it receives, which makes retry behavior observable in tests.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use jiff::Timestamp;

use crate::error::{Error, Result};
use crate::metadata::{BlobMetadata, CONTENT_LENGTH, CONTENT_TYPE, Metadata};
use crate::traits::{ListPage, RemoteClient};

/// Remote operation kinds, for fault injection and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    List,
    Read,
    Write,
    Delete,
}

#[derive(Debug, Clone)]
struct StoredBlob {
    data: Vec<u8>,
    metadata: Metadata,
    content_type: String,
    updated: Timestamp,
}

#[derive(Debug, Default)]
struct State {
    blobs: BTreeMap<String, StoredBlob>,
    pending_failures: HashMap<Op, u32>,
    calls: HashMap<Op, u32>,
}

/// An in-memory implementation of [`RemoteClient`].
///
/// Data is lost when the client is dropped.
#[derive(Debug, Default)]
pub struct MemoryClient {
    state: Mutex<State>,
}

impl MemoryClient {
    /// Create an empty client
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| Error::General(format!("lock poisoned: {e}")))
    }

    /// Store a blob directly, bypassing fault injection and call counting
    pub fn insert(&self, name: impl Into<String>, data: Vec<u8>) {
        if let Ok(mut state) = self.lock() {
            state.blobs.insert(
                name.into(),
                StoredBlob {
                    data,
                    metadata: Metadata::new(),
                    content_type: String::new(),
                    updated: Timestamp::now(),
                },
            );
        }
    }

    /// Fail the next `count` calls of `op` with a transient network error
    pub fn fail_next(&self, op: Op, count: u32) {
        if let Ok(mut state) = self.lock() {
            state.pending_failures.insert(op, count);
        }
    }

    /// Number of calls of `op` received so far, failed ones included
    pub fn calls(&self, op: Op) -> u32 {
        self.lock()
            .map(|s| s.calls.get(&op).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Number of calls of any kind received so far
    pub fn total_calls(&self) -> u32 {
        self.lock().map(|s| s.calls.values().sum()).unwrap_or(0)
    }

    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.lock().ok()?.blobs.get(name).map(|b| b.data.clone())
    }

    pub fn content_type(&self, name: &str) -> Option<String> {
        self.lock().ok()?.blobs.get(name).map(|b| b.content_type.clone())
    }

    pub fn stored_metadata(&self, name: &str) -> Option<Metadata> {
        self.lock().ok()?.blobs.get(name).map(|b| b.metadata.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|s| s.blobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count the call and consume a pending failure, if any
    fn begin(&self, op: Op) -> Result<MutexGuard<'_, State>> {
        let mut state = self.lock()?;
        let calls = state.calls.entry(op).or_insert(0);
        *calls += 1;
        let attempt = *calls;

        if let Some(remaining) = state.pending_failures.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(Error::Network(format!(
                    "injected {op:?} failure (call {attempt})"
                )));
            }
        }
        Ok(state)
    }
}

#[async_trait]
impl RemoteClient for MemoryClient {
    async fn list(
        &self,
        prefix: &str,
        page_size: u32,
        continuation_token: Option<String>,
    ) -> Result<ListPage> {
        let state = self.begin(Op::List)?;
        let page_size = page_size.max(1) as usize;

        let start = match &continuation_token {
            Some(token) => Bound::Excluded(token.clone()),
            None => Bound::Included(prefix.to_string()),
        };

        let mut matching = state
            .blobs
            .range((start, Bound::Unbounded))
            .take_while(|(name, _)| name.starts_with(prefix));

        let records: Vec<BlobMetadata> = matching
            .by_ref()
            .take(page_size)
            .map(|(name, blob)| {
                let mut record = BlobMetadata::new(name, blob.data.len() as u64, blob.updated);
                record.metadata = blob.metadata.clone();
                // Listings report the type, not the length
                record.metadata.remove(CONTENT_LENGTH);
                if !blob.content_type.is_empty() {
                    record.metadata.insert(CONTENT_TYPE, blob.content_type.as_str());
                }
                record
            })
            .collect();

        let next_token = if matching.next().is_some() {
            records.last().map(|r| r.name.clone())
        } else {
            None
        };

        Ok(ListPage {
            records,
            next_token,
        })
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>> {
        let state = self.begin(Op::Read)?;
        state
            .blobs
            .get(name)
            .map(|b| b.data.clone())
            .ok_or_else(|| Error::ObjectNotFound(name.to_string()))
    }

    async fn write(
        &self,
        name: &str,
        metadata: &Metadata,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<()> {
        let mut state = self.begin(Op::Write)?;
        state.blobs.insert(
            name.to_string(),
            StoredBlob {
                data,
                metadata: metadata.clone(),
                content_type: content_type.to_string(),
                updated: Timestamp::now(),
            },
        );
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let mut state = self.begin(Op::Delete)?;
        state.blobs.remove(name);
        Ok(())
    }
}
