//! Object handles
//!
//! An [`ObjectHandle`] is a file-like session over one remote blob. Content
//! lives in an in-memory buffer while the handle is open; closing a writable
//! handle uploads the buffer once, after which the remote store is
//! authoritative again.
//!
//! Lifecycle:
//!
//! ```text
//!  Unresolved --open--> Open(access) --close--> Closed --open--> Open(access)
//! ```
//!
//! The buffer is sequential: reads advance a cursor, writes append, and
//! seeking is rejected.

use std::fmt;
use std::io;
use std::sync::Arc;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::metadata::{
    BlobMetadata, CONTENT_HASH, CONTENT_LENGTH, CONTENT_TYPE, Metadata, derive_content_type,
};
use crate::pager::{Lookup, lookup};
use crate::retry::{RetryPolicy, retry_with_backoff};
use crate::traits::RemoteClient;

/// Permission bits reported for a writable session
pub const MODE_READ_WRITE: u32 = 0o644;

/// Permission bits reported otherwise
pub const MODE_READ_ONLY: u32 = 0o444;

/// Access intent fixed when a handle is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    ReadOnly,
    ReadWrite,
}

impl AccessLevel {
    pub fn is_writable(self) -> bool {
        self == AccessLevel::ReadWrite
    }
}

/// Observable lifecycle state of a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Remote metadata not yet resolved
    Unresolved,
    /// Session active with the given access level
    Open(AccessLevel),
    /// No session; remote metadata resolved
    Closed,
}

/// Stat-like summary of a handle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectStat {
    pub name: String,
    pub size: u64,
    /// Unix-style permission bits
    pub mode: u32,
    pub updated: Timestamp,
}

/// What the handle knows about the remote blob
#[derive(Debug, Clone, PartialEq)]
enum Remote {
    Unresolved,
    /// Resolved, and nothing exists remotely yet
    Absent,
    Present(BlobMetadata),
}

/// Buffered, stateful session over one remote blob
pub struct ObjectHandle {
    client: Arc<dyn RemoteClient>,
    retry: RetryPolicy,
    name: String,
    metadata: Metadata,
    buffer: Vec<u8>,
    cursor: usize,
    session: Option<AccessLevel>,
    updated: Timestamp,
    remote: Remote,
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHandle")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("buffered", &self.buffer.len())
            .field("cursor", &self.cursor)
            .field("updated", &self.updated)
            .finish_non_exhaustive()
    }
}

impl ObjectHandle {
    /// Handle whose remote metadata is resolved on first open
    pub fn new(client: Arc<dyn RemoteClient>, name: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            retry,
            name: name.into(),
            metadata: Metadata::new(),
            buffer: Vec::new(),
            cursor: 0,
            session: None,
            updated: Timestamp::now(),
            remote: Remote::Unresolved,
        }
    }

    /// Handle for a name known to be absent remotely
    pub(crate) fn absent(
        client: Arc<dyn RemoteClient>,
        name: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            remote: Remote::Absent,
            ..Self::new(client, name, retry)
        }
    }

    /// Handle pre-populated with resolved remote metadata; content is fetched on open
    pub fn from_remote(client: Arc<dyn RemoteClient>, meta: BlobMetadata, retry: RetryPolicy) -> Self {
        let mut handle = Self::new(client, meta.name.clone(), retry);
        handle.adopt(meta);
        handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Metadata to attach on the next sync
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub fn updated(&self) -> Timestamp {
        self.updated
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_readonly(&self) -> bool {
        self.session == Some(AccessLevel::ReadOnly)
    }

    pub fn state(&self) -> HandleState {
        match (self.session, &self.remote) {
            (Some(access), _) => HandleState::Open(access),
            (None, Remote::Unresolved) => HandleState::Unresolved,
            (None, _) => HandleState::Closed,
        }
    }

    /// Cached remote metadata, if the blob is known to exist
    pub fn remote(&self) -> Option<&BlobMetadata> {
        match &self.remote {
            Remote::Present(meta) => Some(meta),
            _ => None,
        }
    }

    /// Buffer length while open, otherwise the last known remote size
    pub fn size(&self) -> u64 {
        match (&self.session, &self.remote) {
            (None, Remote::Present(meta)) => meta.size,
            _ => self.buffer.len() as u64,
        }
    }

    pub fn stat(&self) -> ObjectStat {
        let mode = if self.session == Some(AccessLevel::ReadWrite) {
            MODE_READ_WRITE
        } else {
            MODE_READ_ONLY
        };
        ObjectStat {
            name: self.name.clone(),
            size: self.size(),
            mode,
            updated: self.updated,
        }
    }

    /// Start a session, downloading the remote content into the buffer
    ///
    /// A name with no remote blob opens as a new, empty object.
    pub async fn open(&mut self, access: AccessLevel) -> Result<()> {
        if self.session.is_some() {
            return Err(Error::AlreadyOpen(self.name.clone()));
        }

        if self.remote == Remote::Unresolved {
            match lookup(self.client.as_ref(), &self.name, &self.retry).await? {
                Lookup::Found(meta) => self.adopt(meta),
                Lookup::NotFound => self.remote = Remote::Absent,
            }
        }

        let buffer = if matches!(self.remote, Remote::Present(_)) {
            match self.download().await {
                Ok(data) => data,
                Err(Error::ObjectNotFound(_)) => {
                    tracing::debug!(name = %self.name, "Object vanished before download");
                    self.remote = Remote::Absent;
                    Vec::new()
                }
                Err(e) => return Err(e),
            }
        } else {
            Vec::new()
        };

        self.buffer = buffer;
        self.cursor = 0;
        self.session = Some(access);
        tracing::debug!(name = %self.name, ?access, size = self.buffer.len(), "Opened object");
        Ok(())
    }

    /// Read from the cursor into `buf`; returns 0 at the end of the buffer
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.session.is_none() {
            return Err(self.invalid("read from a closed object"));
        }
        let remaining = &self.buffer[self.cursor.min(self.buffer.len())..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.cursor += n;
        Ok(n)
    }

    /// Append `data` to the buffer
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.require_writable("write")?;
        self.buffer.extend_from_slice(data);
        self.updated = Timestamp::now();
        Ok(data.len())
    }

    /// Always fails; the buffer only supports sequential access
    pub fn seek(&mut self, _pos: io::SeekFrom) -> Result<u64> {
        Err(Error::UnsupportedOperation(format!(
            "seek on '{}': memory-buffered objects are sequential",
            self.name
        )))
    }

    /// Resize the buffer to `len` bytes, zero-filling when it grows
    pub fn truncate(&mut self, len: u64) -> Result<()> {
        self.require_writable("truncate")?;
        let len = usize::try_from(len)
            .map_err(|_| self.invalid("truncate beyond addressable memory"))?;
        self.buffer.resize(len, 0);
        self.cursor = self.cursor.min(len);
        self.updated = Timestamp::now();
        Ok(())
    }

    /// Upload the whole buffer as the new object body
    ///
    /// At-least-once: when retries run out the remote object holds whatever
    /// the last attempt left behind.
    pub async fn sync(&mut self) -> Result<()> {
        self.require_writable("sync")?;

        let content_type = derive_content_type(&self.name, &self.metadata);
        let mut upload = self.metadata.clone();
        upload.insert(CONTENT_TYPE, content_type.as_str());
        upload.insert(CONTENT_LENGTH, self.buffer.len().to_string());
        upload.remove(CONTENT_HASH);

        let client = self.client.as_ref();
        let name = self.name.as_str();
        let data = &self.buffer;
        let operation = format!("write '{name}'");
        retry_with_backoff(
            &self.retry,
            &operation,
            || client.write(name, &upload, &content_type, data.clone()),
            Error::is_transient,
        )
        .await?;

        let snapshot = BlobMetadata {
            name: self.name.clone(),
            size: self.buffer.len() as u64,
            updated: Timestamp::now(),
            hash: None,
            metadata: upload.clone(),
        };
        self.metadata = upload;
        self.remote = Remote::Present(snapshot.hydrate());
        tracing::debug!(name = %self.name, size = self.buffer.len(), "Synced object");
        Ok(())
    }

    /// End the session; a writable session is synced exactly once first
    ///
    /// No-op when not open. On sync failure the session stays open so the
    /// caller can retry or release.
    pub async fn close(&mut self) -> Result<()> {
        let Some(access) = self.session else {
            return Ok(());
        };

        if access.is_writable() {
            self.sync().await?;
        }

        self.session = None;
        self.buffer = Vec::new();
        self.cursor = 0;
        tracing::debug!(name = %self.name, "Closed object");
        Ok(())
    }

    /// End the session and drop the buffer without touching the remote blob
    ///
    /// Unsynced writes are discarded; the remote object stays authoritative.
    pub fn release(&mut self) {
        if let Some(access) = self.session.take() {
            tracing::debug!(name = %self.name, ?access, "Released object without sync");
        }
        self.buffer = Vec::new();
        self.cursor = 0;
    }

    /// Take remote metadata as the new baseline, keeping local metadata edits
    fn adopt(&mut self, meta: BlobMetadata) {
        let mut merged = meta.metadata.clone();
        merged.overlay_local(&self.metadata);
        self.metadata = merged;
        self.updated = meta.updated;
        self.remote = Remote::Present(meta);
    }

    /// Replace the cached remote snapshot; ignored while a session is open
    pub(crate) fn refresh(&mut self, meta: BlobMetadata) {
        if self.session.is_none() {
            self.adopt(meta);
        }
    }

    async fn download(&self) -> Result<Vec<u8>> {
        let client = self.client.as_ref();
        let name = self.name.as_str();
        let operation = format!("read '{name}'");
        retry_with_backoff(&self.retry, &operation, || client.read(name), Error::is_transient).await
    }

    fn require_writable(&self, op: &str) -> Result<()> {
        match self.session {
            Some(AccessLevel::ReadWrite) => Ok(()),
            Some(AccessLevel::ReadOnly) => Err(self.invalid(&format!("{op} on a read-only object"))),
            None => Err(self.invalid(&format!("{op} on a closed object"))),
        }
    }

    fn invalid(&self, what: &str) -> Error {
        Error::InvalidState(format!("{what}: {}", self.name))
    }
}

impl io::Read for ObjectHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        ObjectHandle::read(self, buf).map_err(Into::into)
    }
}

impl io::Write for ObjectHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        ObjectHandle::write(self, buf).map_err(Into::into)
    }

    /// Buffered only; remote upload happens on `sync` or `close`
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Seek for ObjectHandle {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        ObjectHandle::seek(self, pos).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryClient, Op};
    use crate::profile::RetryConfig;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::from_config(&RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
        })
    }

    fn handle(client: &Arc<MemoryClient>, name: &str) -> ObjectHandle {
        ObjectHandle::new(client.clone(), name, fast_retry())
    }

    fn read_all(h: &mut ObjectHandle) -> Vec<u8> {
        let mut out = Vec::new();
        let mut chunk = [0u8; 3];
        loop {
            let n = h.read(&mut chunk).unwrap();
            if n == 0 {
                return out;
            }
            out.extend_from_slice(&chunk[..n]);
        }
    }

    #[tokio::test]
    async fn test_open_new_object_is_empty() {
        let client = Arc::new(MemoryClient::new());
        let mut h = handle(&client, "new.txt");
        assert_eq!(h.state(), HandleState::Unresolved);

        h.open(AccessLevel::ReadWrite).await.unwrap();
        assert_eq!(h.state(), HandleState::Open(AccessLevel::ReadWrite));
        assert_eq!(h.size(), 0);
        assert_eq!(client.calls(Op::Read), 0);
    }

    #[tokio::test]
    async fn test_write_close_reopen_round_trip() {
        let client = Arc::new(MemoryClient::new());
        let mut h = handle(&client, "notes.txt");

        h.open(AccessLevel::ReadWrite).await.unwrap();
        h.write(b"hello ").unwrap();
        h.write(b"world").unwrap();
        h.close().await.unwrap();
        assert_eq!(h.state(), HandleState::Closed);
        assert_eq!(client.calls(Op::Write), 1);
        assert_eq!(client.contents("notes.txt").unwrap(), b"hello world");
        assert_eq!(client.content_type("notes.txt").as_deref(), Some("text/plain"));

        h.open(AccessLevel::ReadOnly).await.unwrap();
        assert_eq!(read_all(&mut h), b"hello world");
    }

    #[tokio::test]
    async fn test_existing_object_is_downloaded() {
        let client = Arc::new(MemoryClient::new());
        client.insert("data.bin", b"abcdef".to_vec());
        let mut h = handle(&client, "data.bin");

        h.open(AccessLevel::ReadOnly).await.unwrap();
        assert_eq!(h.remote().unwrap().size, 6);
        assert_eq!(read_all(&mut h), b"abcdef");
        assert_eq!(h.read(&mut [0u8; 4]).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reopen_fails_with_already_open() {
        let client = Arc::new(MemoryClient::new());
        let mut h = handle(&client, "a");
        h.open(AccessLevel::ReadOnly).await.unwrap();

        let err = h.open(AccessLevel::ReadOnly).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyOpen(name) if name == "a"));
    }

    #[tokio::test]
    async fn test_readonly_rejects_write_and_skips_upload() {
        let client = Arc::new(MemoryClient::new());
        client.insert("ro.txt", b"keep".to_vec());
        let mut h = handle(&client, "ro.txt");
        h.open(AccessLevel::ReadOnly).await.unwrap();

        assert!(h.is_readonly());
        assert!(matches!(h.write(b"x"), Err(Error::InvalidState(_))));
        assert!(matches!(h.truncate(0), Err(Error::InvalidState(_))));
        assert!(matches!(h.sync().await, Err(Error::InvalidState(_))));

        h.close().await.unwrap();
        assert_eq!(client.calls(Op::Write), 0);
        assert_eq!(client.contents("ro.txt").unwrap(), b"keep");
    }

    #[tokio::test]
    async fn test_operations_on_closed_handle() {
        let client = Arc::new(MemoryClient::new());
        let mut h = handle(&client, "closed");

        assert!(matches!(h.write(b"x"), Err(Error::InvalidState(_))));
        assert!(matches!(h.read(&mut [0u8; 1]), Err(Error::InvalidState(_))));
        assert!(matches!(h.sync().await, Err(Error::InvalidState(_))));
        h.close().await.unwrap();
        h.close().await.unwrap();
        assert_eq!(client.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_seek_always_fails() {
        use std::io::{Seek, SeekFrom};

        let client = Arc::new(MemoryClient::new());
        let mut h = handle(&client, "s");
        assert!(matches!(
            h.seek(SeekFrom::Start(0)),
            Err(Error::UnsupportedOperation(_))
        ));

        h.open(AccessLevel::ReadWrite).await.unwrap();
        assert!(matches!(
            h.seek(SeekFrom::End(0)),
            Err(Error::UnsupportedOperation(_))
        ));
        let io_err = Seek::seek(&mut h, SeekFrom::Current(1)).unwrap_err();
        assert_eq!(io_err.kind(), io::ErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn test_truncate_to_zero_yields_empty_object() {
        let client = Arc::new(MemoryClient::new());
        client.insert("t.log", b"0123456789".to_vec());
        let mut h = handle(&client, "t.log");

        h.open(AccessLevel::ReadWrite).await.unwrap();
        h.truncate(0).unwrap();
        assert_eq!(read_all(&mut h), b"");
        h.close().await.unwrap();
        assert_eq!(client.contents("t.log").unwrap(), b"");

        h.open(AccessLevel::ReadOnly).await.unwrap();
        assert_eq!(h.size(), 0);
        assert_eq!(read_all(&mut h), b"");
    }

    #[tokio::test]
    async fn test_truncate_shrinks_and_grows() {
        let client = Arc::new(MemoryClient::new());
        client.insert("t", b"abcdef".to_vec());
        let mut h = handle(&client, "t");
        h.open(AccessLevel::ReadWrite).await.unwrap();

        let mut first = [0u8; 4];
        h.read(&mut first).unwrap();
        h.truncate(2).unwrap();
        assert_eq!(h.read(&mut first).unwrap(), 0);

        h.truncate(4).unwrap();
        h.close().await.unwrap();
        assert_eq!(client.contents("t").unwrap(), b"ab\0\0");
    }

    #[tokio::test]
    async fn test_write_appends_to_downloaded_content() {
        let client = Arc::new(MemoryClient::new());
        client.insert("log", b"one\n".to_vec());
        let mut h = handle(&client, "log");

        h.open(AccessLevel::ReadWrite).await.unwrap();
        let before = h.updated();
        h.write(b"two\n").unwrap();
        assert!(h.updated() >= before);
        h.close().await.unwrap();
        assert_eq!(client.contents("log").unwrap(), b"one\ntwo\n");
    }

    #[tokio::test]
    async fn test_sync_attaches_metadata() {
        let client = Arc::new(MemoryClient::new());
        let mut h = handle(&client, "report.json");
        h.metadata_mut().insert("owner", "ops");

        h.open(AccessLevel::ReadWrite).await.unwrap();
        h.write(b"{}").unwrap();
        h.sync().await.unwrap();

        let stored = client.stored_metadata("report.json").unwrap();
        assert_eq!(stored.get("owner"), Some("ops"));
        assert_eq!(stored.content_length(), Some(2));
        assert_eq!(client.content_type("report.json").as_deref(), Some("application/json"));

        let remote = h.remote().unwrap();
        assert_eq!(remote.size, 2);
        assert_eq!(remote.metadata.content_hash(), Some(""));
        assert!(h.is_open());
    }

    #[tokio::test]
    async fn test_close_syncs_exactly_once() {
        let client = Arc::new(MemoryClient::new());
        let mut h = handle(&client, "once");
        h.open(AccessLevel::ReadWrite).await.unwrap();
        h.write(b"x").unwrap();
        h.close().await.unwrap();
        h.close().await.unwrap();
        assert_eq!(client.calls(Op::Write), 1);
    }

    #[tokio::test]
    async fn test_transient_download_failures_are_retried() {
        let client = Arc::new(MemoryClient::new());
        client.insert("flaky", b"payload".to_vec());
        client.fail_next(Op::Read, 2);
        let mut h = handle(&client, "flaky");

        h.open(AccessLevel::ReadOnly).await.unwrap();
        assert_eq!(read_all(&mut h), b"payload");
        assert_eq!(client.calls(Op::Read), 3);
    }

    #[tokio::test]
    async fn test_download_exhaustion_fails_open() {
        let client = Arc::new(MemoryClient::new());
        client.insert("down", b"payload".to_vec());
        client.fail_next(Op::Read, 3);
        let mut h = handle(&client, "down");

        let err = h.open(AccessLevel::ReadOnly).await.unwrap_err();
        assert!(matches!(err, Error::RetryExhausted { attempts: 3, .. }));
        assert!(!h.is_open());
    }

    #[tokio::test]
    async fn test_sync_exhaustion_keeps_session_open() {
        let client = Arc::new(MemoryClient::new());
        let mut h = handle(&client, "upload");
        h.open(AccessLevel::ReadWrite).await.unwrap();
        h.write(b"data").unwrap();

        client.fail_next(Op::Write, 3);
        let err = h.close().await.unwrap_err();
        match err {
            Error::RetryExhausted { errors, .. } => assert_eq!(errors.len(), 3),
            other => panic!("expected RetryExhausted, got {other:?}"),
        }
        assert!(h.is_open());

        h.close().await.unwrap();
        assert_eq!(client.contents("upload").unwrap(), b"data");
    }

    #[tokio::test]
    async fn test_object_deleted_between_lookup_and_read() {
        let client = Arc::new(MemoryClient::new());
        let meta = BlobMetadata::new("gone", 4, Timestamp::UNIX_EPOCH).hydrate();
        let mut h = ObjectHandle::from_remote(client.clone(), meta, fast_retry());

        h.open(AccessLevel::ReadWrite).await.unwrap();
        assert_eq!(h.size(), 0);
        assert!(h.remote().is_none());
    }

    #[tokio::test]
    async fn test_release_keeps_remote() {
        let client = Arc::new(MemoryClient::new());
        client.insert("big", vec![7u8; 64]);
        let mut h = handle(&client, "big");
        h.open(AccessLevel::ReadOnly).await.unwrap();

        h.release();
        assert!(!h.is_open());
        assert!(matches!(h.read(&mut [0u8; 8]), Err(Error::InvalidState(_))));
        assert_eq!(client.contents("big").unwrap().len(), 64);
        assert_eq!(client.calls(Op::Delete), 0);
    }

    #[tokio::test]
    async fn test_release_discards_pending_writes() {
        let client = Arc::new(MemoryClient::new());
        client.insert("keep.bin", b"important".to_vec());
        let mut h = handle(&client, "keep.bin");
        h.open(AccessLevel::ReadWrite).await.unwrap();
        h.truncate(0).unwrap();
        h.write(b"scratch").unwrap();

        h.release();
        h.close().await.unwrap();

        assert_eq!(client.calls(Op::Write), 0);
        assert_eq!(client.contents("keep.bin").unwrap(), b"important");
        assert_eq!(h.state(), HandleState::Closed);

        h.open(AccessLevel::ReadOnly).await.unwrap();
        let mut body = Vec::new();
        io::Read::read_to_end(&mut h, &mut body).unwrap();
        assert_eq!(body, b"important");
    }

    #[tokio::test]
    async fn test_stat_reports_mode_and_size() {
        let client = Arc::new(MemoryClient::new());
        client.insert("s.txt", b"12345".to_vec());
        let mut h = handle(&client, "s.txt");

        h.open(AccessLevel::ReadOnly).await.unwrap();
        let stat = h.stat();
        assert_eq!(stat.name, "s.txt");
        assert_eq!(stat.size, 5);
        assert_eq!(stat.mode, MODE_READ_ONLY);
        h.close().await.unwrap();

        h.open(AccessLevel::ReadWrite).await.unwrap();
        h.write(b"6").unwrap();
        let stat = h.stat();
        assert_eq!(stat.size, 6);
        assert_eq!(stat.mode, MODE_READ_WRITE);
    }

    #[tokio::test]
    async fn test_io_copy_into_handle() {
        let client = Arc::new(MemoryClient::new());
        let mut h = handle(&client, "copy.txt");
        h.open(AccessLevel::ReadWrite).await.unwrap();

        let mut source: &[u8] = b"streamed bytes";
        let n = io::copy(&mut source, &mut h).unwrap();
        assert_eq!(n, 14);
        h.close().await.unwrap();
        assert_eq!(client.contents("copy.txt").unwrap(), b"streamed bytes");
    }
}
