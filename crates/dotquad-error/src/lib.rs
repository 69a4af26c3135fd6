use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Primary error type for dotquad operations.
///
/// Variants are grouped by the stage that produces them: opening the store,
/// walking its pages, decoding etcd records, and the final scan verdict.
#[derive(Error, Debug)]
pub enum DotquadError {
    // === Open Errors ===
    /// Store file does not exist.
    #[error("store not found: '{path}'")]
    StoreNotFound { path: PathBuf },

    /// Store file exists but could not be opened.
    #[error("unable to open store file '{path}': {source}")]
    CannotOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Another process kept the advisory lock past the configured timeout.
    #[error("timed out after {waited:?} waiting for the lock on '{path}'")]
    LockTimeout { path: PathBuf, waited: Duration },

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Store Errors ===
    /// Store file is not a well-formed bbolt file.
    #[error("store is malformed: {detail}")]
    StoreCorrupt { detail: String },

    /// Named bucket is absent from the snapshot.
    #[error("bucket not found: {name}")]
    BucketNotFound { name: String },

    // === Decode Errors ===
    /// Stored value is not a valid etcd `KeyValue` encoding.
    #[error("malformed record: {detail}")]
    MalformedRecord { detail: String },

    /// Revision key is shorter than the fixed revision layout.
    #[error("revision key too short: {len} bytes (need {need})")]
    ShortRevisionKey { len: usize, need: usize },

    // === Scan Verdict ===
    /// At least one candidate failed strict IPv4 validation.
    #[error("Invalid IPv4 addresses found")]
    InvalidAddressesFound { count: usize },
}

/// Coarse classification used by callers that only care about the stage
/// an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Path missing, permissions, I/O.
    Open,
    /// Lock wait exceeded the timeout.
    LockTimeout,
    /// Bucket absent.
    NotFound,
    /// Store pages do not parse.
    Corrupt,
    /// Logical record or revision key does not parse.
    Decode,
    /// Data-quality finding, surfaced after the full walk.
    InvalidAddress,
}

impl DotquadError {
    /// Classify this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::StoreNotFound { .. } | Self::CannotOpen { .. } | Self::Io(_) => ErrorKind::Open,
            Self::LockTimeout { .. } => ErrorKind::LockTimeout,
            Self::BucketNotFound { .. } => ErrorKind::NotFound,
            Self::StoreCorrupt { .. } => ErrorKind::Corrupt,
            Self::MalformedRecord { .. } | Self::ShortRevisionKey { .. } => ErrorKind::Decode,
            Self::InvalidAddressesFound { .. } => ErrorKind::InvalidAddress,
        }
    }

    /// Whether this error aborts a scan at the point it occurs.
    pub const fn is_fatal(&self) -> bool {
        !matches!(self.kind(), ErrorKind::InvalidAddress)
    }

    /// Human-friendly suggestion for fixing this error.
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::StoreNotFound { .. } => {
                Some("Pass an etcd data dir or the path of its member/snap/db file")
            }
            Self::LockTimeout { .. } => {
                Some("Stop the etcd member or scan a copy of its db file; --timeout 0 waits forever")
            }
            Self::BucketNotFound { .. } => Some("Check that the file is an etcd backend database"),
            _ => None,
        }
    }

    /// Get the process exit code for this error (for CLI use).
    pub const fn exit_code(&self) -> i32 {
        1
    }

    /// Create a store corruption error.
    pub fn corrupt(detail: impl Into<String>) -> Self {
        Self::StoreCorrupt {
            detail: detail.into(),
        }
    }

    /// Create a malformed record error.
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::MalformedRecord {
            detail: detail.into(),
        }
    }
}

/// Result type alias using `DotquadError`.
pub type Result<T> = std::result::Result<T, DotquadError>;
