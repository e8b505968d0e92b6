//! RemoteClient trait definition
//!
//! This trait is the capability the core consumes from an authenticated
//! object-store client: list, read, write and delete named blobs in one
//! bucket. It keeps the core independent of any specific S3 SDK.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::metadata::{BlobMetadata, Metadata};

/// One page of a prefix listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListPage {
    /// Records on this page, in remote order
    pub records: Vec<BlobMetadata>,

    /// Continuation token; `None` on the last page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

/// Trait for the remote object store client
///
/// Implemented by the S3 adapter and the in-memory client, and mocked in tests.
/// Not-found on `read` must be reported as `Error::ObjectNotFound`.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// List blobs whose names start with `prefix`
    async fn list(
        &self,
        prefix: &str,
        page_size: u32,
        continuation_token: Option<String>,
    ) -> Result<ListPage>;

    /// Read the full content of a blob
    async fn read(&self, name: &str) -> Result<Vec<u8>>;

    /// Replace a blob's content and metadata; returning `Ok` commits the write
    async fn write(
        &self,
        name: &str,
        metadata: &Metadata,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<()>;

    /// Delete a blob
    async fn delete(&self, name: &str) -> Result<()>;
}
