//! Certificate cache sync configuration.

use crate::error::{CacheSyncError, CacheSyncResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const MIN_POLL_INTERVAL_SECS: u64 = 1;

/// Configuration for the certificate cache sync engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheSyncConfig {
    /// Local certificate cache directory (flat, one file per artifact).
    pub cache_dir: PathBuf,

    /// S3 bucket name.
    pub bucket: String,

    /// Key prefix under which cache files are stored (`prefix/filename`).
    pub prefix: String,

    /// AWS region for S3.
    pub region: String,

    /// Shared-credentials profile used when no environment or role
    /// credentials are available.
    pub profile: String,

    /// Optional S3 endpoint override (for MinIO in testing).
    pub endpoint_override: Option<String>,

    /// Wait between steady-state reconciliation passes (seconds).
    pub poll_interval_secs: u64,

    /// Upper bound for a single list/get/put call (seconds).
    pub operation_timeout_secs: u64,
}

impl Default for CacheSyncConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("certs"),
            bucket: String::new(),
            prefix: "certs".to_string(),
            region: String::new(),
            profile: "default".to_string(),
            endpoint_override: None,
            poll_interval_secs: 30,
            operation_timeout_secs: 10,
        }
    }
}

impl CacheSyncConfig {
    /// Checks the values without which no synchronization is possible.
    pub fn validate(&self) -> CacheSyncResult<()> {
        if self.bucket.trim().is_empty() {
            return Err(CacheSyncError::Config("bucket is not set".to_string()));
        }
        if self.region.trim().is_empty() {
            return Err(CacheSyncError::Config("region is not set".to_string()));
        }
        if self.cache_dir.as_os_str().is_empty() {
            return Err(CacheSyncError::Config("cache directory is not set".to_string()));
        }
        if self.operation_timeout_secs == 0 {
            return Err(CacheSyncError::Config(
                "operation timeout must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    /// Poll interval, clamped to one second.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(MIN_POLL_INTERVAL_SECS))
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}
