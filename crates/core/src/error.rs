//! Error types for bkt-core
//!
//! Provides a unified error type that can be converted to appropriate exit codes.

use thiserror::Error;

/// Result type alias for bkt-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for bkt-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// No such remote blob
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// Creation collides with an existing blob or registered handle
    #[error("Object already exists: {0}")]
    ObjectExists(String),

    /// Handle opened while a session is already active
    #[error("Object is already open: {0}")]
    AlreadyOpen(String),

    /// Operation the memory-buffered object model does not provide
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Operation not permitted in the handle's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Retry budget exhausted; carries every failed attempt in order
    #[error("{operation} failed after {attempts} attempts: {}", summarize(.errors))]
    RetryExhausted {
        operation: String,
        attempts: u32,
        errors: Vec<Error>,
    },

    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid object name or path argument
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid name filter pattern
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] glob::PatternError),

    /// Profile not found
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    /// Profile already exists
    #[error("Profile already exists: {0}")]
    ProfileExists(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Authentication error
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Network error (retryable)
    #[error("Network error: {0}")]
    Network(String),

    /// General error
    #[error("{0}")]
    General(String),
}

fn summarize(errors: &[Error]) -> String {
    errors
        .iter()
        .enumerate()
        .map(|(i, e)| format!("[{}] {e}", i + 1))
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Whether the error is a transient remote failure worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Network(_) => true,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Get the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidPath(_) | Error::InvalidPattern(_) => 2, // UsageError
            Error::Config(_) | Error::InvalidUrl(_) => 2,          // UsageError
            Error::Network(_) | Error::RetryExhausted { .. } => 3, // NetworkError
            Error::Auth(_) => 4,                                   // AuthError
            Error::ObjectNotFound(_) | Error::ProfileNotFound(_) => 5, // NotFound
            Error::ObjectExists(_) | Error::ProfileExists(_) | Error::AlreadyOpen(_) => 6, // Conflict
            Error::UnsupportedOperation(_) => 7, // UnsupportedFeature
            _ => 1,                              // GeneralError
        }
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        use std::io::ErrorKind;

        if let Error::Io(e) = err {
            return e;
        }
        let kind = match &err {
            Error::ObjectNotFound(_) => ErrorKind::NotFound,
            Error::ObjectExists(_) => ErrorKind::AlreadyExists,
            Error::UnsupportedOperation(_) => ErrorKind::Unsupported,
            Error::InvalidState(_) | Error::AlreadyOpen(_) => ErrorKind::PermissionDenied,
            _ => ErrorKind::Other,
        };
        std::io::Error::new(kind, err)
    }
}
