//! Process exit codes for bkt
//!
//! Scripts branch on these values, so the numbers are stable across releases.

/// Exit codes for the bkt CLI application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Operation completed successfully
    Success = 0,

    /// General/unspecified error
    GeneralError = 1,

    /// User input error: invalid arguments, bad object name, bad config
    UsageError = 2,

    /// Network error, including an exhausted retry budget
    NetworkError = 3,

    /// Authentication or permission failure
    AuthError = 4,

    /// Object or profile does not exist
    NotFound = 5,

    /// Object or profile already exists, or a handle is already open
    Conflict = 6,

    /// Operation is not supported by object handles
    UnsupportedFeature = 7,

    /// Operation was interrupted (e.g., Ctrl+C)
    Interrupted = 130,
}

impl ExitCode {
    /// Convert exit code to i32 for use with std::process::exit
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Create exit code from i32 value
    ///
    /// Returns None if the value doesn't correspond to a known exit code.
    pub const fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::GeneralError),
            2 => Some(Self::UsageError),
            3 => Some(Self::NetworkError),
            4 => Some(Self::AuthError),
            5 => Some(Self::NotFound),
            6 => Some(Self::Conflict),
            7 => Some(Self::UnsupportedFeature),
            130 => Some(Self::Interrupted),
            _ => None,
        }
    }

    /// Exit code for a failure surfaced at the command edge
    ///
    /// Looks through `anyhow` context for the underlying core error.
    pub fn from_error(err: &anyhow::Error) -> Self {
        err.chain()
            .find_map(|cause| cause.downcast_ref::<bkt_core::Error>())
            .map(Self::from)
            .unwrap_or(Self::GeneralError)
    }

    /// Get a human-readable description of the exit code
    pub const fn description(self) -> &'static str {
        match self {
            Self::Success => "Operation completed successfully",
            Self::GeneralError => "General error",
            Self::UsageError => "Invalid arguments or configuration",
            Self::NetworkError => "Network error",
            Self::AuthError => "Authentication or permission failure",
            Self::NotFound => "Resource not found",
            Self::Conflict => "Resource already exists or is in use",
            Self::UnsupportedFeature => "Operation not supported",
            Self::Interrupted => "Operation interrupted",
        }
    }
}

impl From<&bkt_core::Error> for ExitCode {
    fn from(err: &bkt_core::Error) -> Self {
        Self::from_i32(err.exit_code()).unwrap_or(Self::GeneralError)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.as_i32()
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_i32())
    }
}
