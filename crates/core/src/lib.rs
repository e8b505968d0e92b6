//! bkt-core: Buffered object handles over a remote bucket
//!
//! This crate provides the core functionality for bkt, including:
//! - Object handles with open/read/write/truncate/sync/close semantics
//! - The bucket-scoped store registry that creates and resolves handles
//! - Paginated listing with client-side query filters
//! - Bounded retry with backoff for every remote call
//! - Configuration and profile management
//!
//! This crate is designed to be independent of any specific S3 SDK; the
//! remote store is reached through the [`RemoteClient`] trait.

pub mod backoff;
pub mod config;
pub mod error;
pub mod handle;
pub mod memory;
pub mod metadata;
pub mod pager;
pub mod profile;
pub mod query;
pub mod retry;
pub mod store;
pub mod traits;

pub use backoff::BackoffPolicy;
pub use config::{Config, ConfigManager};
pub use error::{Error, Result};
pub use handle::{AccessLevel, HandleState, ObjectHandle, ObjectStat};
pub use memory::MemoryClient;
pub use metadata::{BlobMetadata, Metadata};
pub use pager::{Lookup, list_all, lookup};
pub use profile::{Profile, ProfileManager, ResolvedProfile, RetryConfig, TimeoutConfig};
pub use query::{Filter, Query};
pub use retry::{RetryBuilder, RetryPolicy, retry_with_backoff};
pub use store::Store;
pub use traits::{ListPage, RemoteClient};
