//! Store registry
//!
//! A [`Store`] is scoped to one bucket. It creates and hands out
//! [`ObjectHandle`]s, keeping at most one per object name so a process never
//! holds two in-memory representations of the same blob. The registry tracks
//! handle instances only; it does not cache blob contents.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use crate::config::DEFAULT_PAGE_SIZE;
use crate::error::{Error, Result};
use crate::handle::ObjectHandle;
use crate::metadata::BlobMetadata;
use crate::pager::{Lookup, list_all, lookup};
use crate::profile::RetryConfig;
use crate::query::Query;
use crate::retry::RetryPolicy;
use crate::traits::RemoteClient;

/// Bucket-scoped factory and directory of object handles
pub struct Store {
    client: Arc<dyn RemoteClient>,
    bucket: String,
    page_size: u32,
    retry: RetryPolicy,
    registry: HashMap<String, ObjectHandle>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("bucket", &self.bucket)
            .field("page_size", &self.page_size)
            .field("retry", &self.retry)
            .field("registered", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Create a store with default page size and retry settings
    pub fn new(client: Arc<dyn RemoteClient>, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            page_size: DEFAULT_PAGE_SIZE,
            retry: RetryPolicy::default(),
            registry: HashMap::new(),
        }
    }

    /// Set the default listing page size
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Set the retry bound and backoff schedule for every remote call
    pub fn with_retry(mut self, config: &RetryConfig) -> Self {
        self.retry = RetryPolicy::from_config(config);
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Create a handle for a name that must not exist yet
    ///
    /// Nothing is written remotely until the handle is synced.
    pub async fn new_object(&mut self, name: &str) -> Result<&mut ObjectHandle> {
        validate_name(name)?;
        if self.registry.contains_key(name) {
            return Err(Error::ObjectExists(name.to_string()));
        }

        if lookup(self.client.as_ref(), name, &self.retry).await?.is_found() {
            return Err(Error::ObjectExists(name.to_string()));
        }

        tracing::debug!(bucket = %self.bucket, name, "Registered new object");
        let handle = ObjectHandle::absent(self.client.clone(), name, self.retry.seeded_for(name));
        Ok(self.registry.entry(name.to_string()).or_insert(handle))
    }

    /// Handle for an existing remote object; content is fetched on open
    pub async fn get(&mut self, name: &str) -> Result<&mut ObjectHandle> {
        validate_name(name)?;
        let meta = match lookup(self.client.as_ref(), name, &self.retry).await? {
            Lookup::Found(meta) => meta,
            Lookup::NotFound => return Err(Error::ObjectNotFound(name.to_string())),
        };

        let handle = match self.registry.entry(name.to_string()) {
            Entry::Occupied(entry) => {
                let handle = entry.into_mut();
                handle.refresh(meta);
                handle
            }
            Entry::Vacant(entry) => {
                tracing::debug!(bucket = %self.bucket, name, "Registered existing object");
                entry.insert(ObjectHandle::from_remote(
                    self.client.clone(),
                    meta,
                    self.retry.seeded_for(name),
                ))
            }
        };
        Ok(handle)
    }

    /// Metadata records of every object matching the query
    pub async fn list(&self, query: &Query) -> Result<Vec<BlobMetadata>> {
        let page_size = query.effective_page_size(self.page_size);
        let records = list_all(self.client.as_ref(), query, page_size, &self.retry).await?;
        let total = records.len();
        let records = query.apply_filters(records);
        tracing::debug!(
            bucket = %self.bucket,
            prefix = %query.prefix,
            listed = total,
            matched = records.len(),
            "Listed objects"
        );
        Ok(records)
    }

    /// Delete a remote object with a single attempt
    ///
    /// Registered handles are left untouched.
    pub async fn delete(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        self.client.delete(name).await?;
        tracing::debug!(bucket = %self.bucket, name, "Deleted object");
        Ok(())
    }

    /// Drop the registered handle for `name`; returns whether one existed
    ///
    /// The handle is not closed first, so unsynced writes are discarded.
    pub fn release(&mut self, name: &str) -> bool {
        self.registry.remove(name).is_some()
    }

    pub fn handle(&self, name: &str) -> Option<&ObjectHandle> {
        self.registry.get(name)
    }

    pub fn handle_mut(&mut self, name: &str) -> Option<&mut ObjectHandle> {
        self.registry.get_mut(name)
    }

    /// Names with a registered handle, in no particular order
    pub fn registered(&self) -> impl Iterator<Item = &str> {
        self.registry.keys().map(String::as_str)
    }

    /// Close every open handle, reporting the first failure after trying all
    pub async fn close_all(&mut self) -> Result<()> {
        let mut first_error = None;
        for handle in self.registry.values_mut() {
            if let Err(e) = handle.close().await {
                tracing::warn!(name = handle.name(), error = %e, "Failed to close object");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidPath("Object name cannot be empty".into()));
    }
    Ok(())
}
