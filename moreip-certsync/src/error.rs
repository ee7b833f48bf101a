//! Certificate cache sync error types.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for cache sync operations.
pub type CacheSyncResult<T> = Result<T, CacheSyncError>;

/// Direction of a failed sync operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    Pull,
    Push,
}

impl fmt::Display for SyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncKind::Pull => f.write_str("pull"),
            SyncKind::Push => f.write_str("push"),
        }
    }
}

/// Errors that can occur while synchronizing the certificate cache.
#[derive(Debug, Error)]
pub enum CacheSyncError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("credentials unavailable: {0}")]
    Credentials(String),

    #[error("object store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("storage quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sync engine not running")]
    NotRunning,

    #[error("{kind} of {name} failed: {source}")]
    Sync {
        kind: SyncKind,
        name: String,
        #[source]
        source: Box<CacheSyncError>,
    },
}

impl CacheSyncError {
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Wraps a per-file failure with the operation and file name.
    pub fn sync(kind: SyncKind, name: impl Into<String>, source: CacheSyncError) -> Self {
        Self::Sync {
            kind,
            name: name.into(),
            source: Box::new(source),
        }
    }

    /// Startup errors that must stop the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Credentials(_))
    }

    /// Returns true if the next pass may succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::StoreUnavailable(_) | Self::ObjectNotFound(_) => true,
            Self::Sync { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}
