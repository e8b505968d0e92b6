//! S3 client implementation
//!
//! Wraps aws-sdk-s3 and implements the `RemoteClient` trait from bkt-core for
//! a single bucket. Retries are not done here; the core layer wraps every call
//! in its own bounded retry.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_smithy_types::error::display::DisplayErrorContext;
use jiff::Timestamp;

use bkt_core::{BlobMetadata, Error, ListPage, Metadata, Profile, RemoteClient, Result};

/// S3 client bound to the bucket of one profile
pub struct S3Client {
    inner: aws_sdk_s3::Client,
    bucket: String,
}

impl std::fmt::Debug for S3Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Client")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl S3Client {
    /// Create a new S3 client from a profile
    pub async fn new(profile: &Profile) -> Result<Self> {
        profile.validate()?;

        let credentials = aws_credential_types::Credentials::new(
            profile.access_key.clone(),
            profile.secret_key.clone(),
            None,
            None,
            "bkt-static-credentials",
        );

        let timeouts = profile.timeout_config();
        let timeout_config = aws_config::timeout::TimeoutConfig::builder()
            .connect_timeout(Duration::from_millis(timeouts.connect_ms))
            .read_timeout(Duration::from_millis(timeouts.read_ms))
            .build();

        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(aws_config::Region::new(profile.region.clone()))
            .endpoint_url(&profile.endpoint)
            .timeout_config(timeout_config)
            .load()
            .await;

        // Path-style addressing unless the profile asks for virtual hosts
        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(profile.bucket_lookup != "dns")
            .build();

        tracing::debug!(
            profile = %profile.name,
            endpoint = %profile.endpoint,
            bucket = %profile.bucket,
            "Created S3 client"
        );

        Ok(Self {
            inner: aws_sdk_s3::Client::from_conf(s3_config),
            bucket: profile.bucket.clone(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Get the underlying aws-sdk-s3 client
    pub fn inner(&self) -> &aws_sdk_s3::Client {
        &self.inner
    }
}

/// What a failed request was about, for error reporting
#[derive(Debug, Clone, Copy)]
enum Subject<'a> {
    Object(&'a str),
    Listing(&'a str),
}

/// How the SDK request failed before any error code is considered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureKind {
    /// The request never produced a response in time
    Timeout,
    /// Connection or transport failure
    Dispatch,
    /// The request could not be built; retrying cannot help
    Construction,
    /// The service answered with an error response
    Response,
}

/// S3 error codes that signal throttling or a temporary server-side problem
const TRANSIENT_CODES: &[&str] = &[
    "InternalError",
    "RequestTimeout",
    "ServiceUnavailable",
    "SlowDown",
    "Throttling",
    "TooManyRequests",
];

const AUTH_CODES: &[&str] = &[
    "AccessDenied",
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
    "ExpiredToken",
];

fn sdk_failure<E>(err: &SdkError<E, HttpResponse>, subject: Subject<'_>) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let kind = match err {
        SdkError::TimeoutError(_) => FailureKind::Timeout,
        SdkError::DispatchFailure(_) => FailureKind::Dispatch,
        SdkError::ConstructionFailure(_) => FailureKind::Construction,
        _ => FailureKind::Response,
    };
    let status = err.raw_response().map(|r| r.status().as_u16());
    classify(kind, err.code(), status, DisplayErrorContext(err).to_string(), subject)
}

/// Map a failed request onto the core error taxonomy
///
/// Only timeouts, transport failures, throttling and 5xx responses come back
/// as `Network`, the one variant the core retries.
fn classify(
    kind: FailureKind,
    code: Option<&str>,
    status: Option<u16>,
    message: String,
    subject: Subject<'_>,
) -> Error {
    match kind {
        FailureKind::Timeout | FailureKind::Dispatch => return Error::Network(message),
        FailureKind::Construction => return Error::General(message),
        FailureKind::Response => {}
    }

    let code = code.unwrap_or_default();
    if code == "NoSuchBucket" {
        return Error::General(format!("Bucket does not exist: {message}"));
    }
    if AUTH_CODES.contains(&code) || matches!(status, Some(401 | 403)) {
        return Error::Auth(message);
    }
    if TRANSIENT_CODES.contains(&code) || matches!(status, Some(429 | 500..=599)) {
        return Error::Network(message);
    }

    let not_found = matches!(code, "NoSuchKey" | "NotFound") || status == Some(404);
    match subject {
        Subject::Object(name) if not_found => Error::ObjectNotFound(name.to_string()),
        Subject::Listing(prefix) => Error::General(format!("Listing '{prefix}' failed: {message}")),
        Subject::Object(_) => Error::General(message),
    }
}

fn object_record(object: &aws_sdk_s3::types::Object) -> BlobMetadata {
    let updated = object
        .last_modified()
        .and_then(|t| Timestamp::from_second(t.secs()).ok())
        .unwrap_or(Timestamp::UNIX_EPOCH);
    let size = object.size().unwrap_or(0).max(0) as u64;

    let record = BlobMetadata::new(object.key().unwrap_or_default(), size, updated);
    match object.e_tag() {
        Some(etag) => record.with_hash(etag.trim_matches('"')),
        None => record,
    }
}

#[async_trait]
impl RemoteClient for S3Client {
    async fn list(
        &self,
        prefix: &str,
        page_size: u32,
        continuation_token: Option<String>,
    ) -> Result<ListPage> {
        let max_keys = i32::try_from(page_size.max(1)).unwrap_or(i32::MAX);
        let response = self
            .inner
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .max_keys(max_keys)
            .set_continuation_token(continuation_token)
            .send()
            .await
            .map_err(|e| sdk_failure(&e, Subject::Listing(prefix)))?;

        let records = response.contents().iter().map(object_record).collect();
        let next_token = if response.is_truncated().unwrap_or(false) {
            response.next_continuation_token().map(|s| s.to_string())
        } else {
            None
        };

        Ok(ListPage {
            records,
            next_token,
        })
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>> {
        let response = self
            .inner
            .get_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
            .map_err(|e| sdk_failure(&e, Subject::Object(name)))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| Error::Network(e.to_string()))?
            .into_bytes()
            .to_vec();

        tracing::debug!(name, bytes = data.len(), "Downloaded object");
        Ok(data)
    }

    async fn write(
        &self,
        name: &str,
        metadata: &Metadata,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<()> {
        let size = data.len();
        let user: HashMap<String, String> = metadata
            .user_entries()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        self.inner
            .put_object()
            .bucket(&self.bucket)
            .key(name)
            .content_type(content_type)
            .set_metadata((!user.is_empty()).then_some(user))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| sdk_failure(&e, Subject::Object(name)))?;

        tracing::debug!(name, bytes = size, content_type, "Uploaded object");
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.inner
            .delete_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
            .map_err(|e| sdk_failure(&e, Subject::Object(name)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::primitives::DateTime;
    use aws_sdk_s3::types::Object;

    fn service(code: &str, status: u16, subject: Subject<'_>) -> Error {
        classify(
            FailureKind::Response,
            Some(code),
            Some(status),
            format!("service error: {code}"),
            subject,
        )
    }

    #[test]
    fn test_classify_not_found() {
        let err = service("NoSuchKey", 404, Subject::Object("a.txt"));
        assert!(matches!(err, Error::ObjectNotFound(name) if name == "a.txt"));
    }

    #[test]
    fn test_classify_bare_404_object_is_not_found() {
        let err = classify(
            FailureKind::Response,
            None,
            Some(404),
            "404".into(),
            Subject::Object("a.txt"),
        );
        assert!(matches!(err, Error::ObjectNotFound(_)));
    }

    #[test]
    fn test_classify_auth_is_not_transient() {
        let err = service("AccessDenied", 403, Subject::Object("a.txt"));
        assert!(matches!(err, Error::Auth(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_classify_missing_bucket_is_not_retried() {
        let err = service("NoSuchBucket", 404, Subject::Object("x"));
        assert!(matches!(err, Error::General(_)));
        assert!(!err.is_transient());

        let err = service("NoSuchBucket", 404, Subject::Listing("logs/"));
        assert!(!matches!(err, Error::ObjectNotFound(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_classify_listing_404_is_not_object_not_found() {
        let err = classify(
            FailureKind::Response,
            None,
            Some(404),
            "404".into(),
            Subject::Listing("logs/"),
        );
        assert!(matches!(&err, Error::General(msg) if msg.contains("logs/")));
    }

    #[test]
    fn test_classify_client_errors_are_not_transient() {
        for code in ["InvalidBucketName", "InvalidArgument", "EntityTooLarge"] {
            let err = service(code, 400, Subject::Object("a.txt"));
            assert!(!err.is_transient(), "{code} should not be retried");
        }
        let err = classify(
            FailureKind::Construction,
            None,
            None,
            "invalid endpoint".into(),
            Subject::Object("a.txt"),
        );
        assert!(!err.is_transient());
    }

    #[test]
    fn test_classify_transient_failures() {
        assert!(service("SlowDown", 503, Subject::Object("a")).is_transient());
        assert!(service("InternalError", 500, Subject::Object("a")).is_transient());
        assert!(service("Whatever", 502, Subject::Listing("")).is_transient());
        assert!(service("", 429, Subject::Object("a")).is_transient());
        for kind in [FailureKind::Timeout, FailureKind::Dispatch] {
            let err = classify(kind, None, None, "connection refused".into(), Subject::Object("a"));
            assert!(matches!(err, Error::Network(_)));
        }
    }

    #[test]
    fn test_object_record() {
        let object = Object::builder()
            .key("docs/readme.md")
            .size(42)
            .e_tag("\"abc123\"")
            .last_modified(DateTime::from_secs(1_700_000_000))
            .build();

        let record = object_record(&object);
        assert_eq!(record.name, "docs/readme.md");
        assert_eq!(record.size, 42);
        assert_eq!(record.hash.as_deref(), Some("abc123"));
        assert_eq!(record.updated.as_second(), 1_700_000_000);
    }

    #[test]
    fn test_object_record_defaults() {
        let record = object_record(&Object::builder().key("empty").build());
        assert_eq!(record.size, 0);
        assert!(record.hash.is_none());
        assert_eq!(record.updated, Timestamp::UNIX_EPOCH);
    }
}
