//! Shared types for certificate cache synchronization.

use crate::error::CacheSyncError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A regular file present in the local cache directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedFile {
    pub name: String,
    pub modified: DateTime<Utc>,
    pub len: u64,
}

/// An object stored under the configured prefix.
///
/// `key` is bucket-relative and includes the prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteObject {
    pub key: String,
    pub modified: DateTime<Utc>,
    pub size: u64,
}

/// What a reconciliation pass should do with one file name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    /// Remote copy only: download it into the cache directory.
    Pull,
    /// Local copy is missing remotely or newer: upload it.
    Push,
    /// Already synchronized.
    None,
}

/// A sync action bound to a cache file name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncDecision {
    pub name: String,
    pub action: SyncAction,
}

impl SyncDecision {
    pub fn new(name: impl Into<String>, action: SyncAction) -> Self {
        Self {
            name: name.into(),
            action,
        }
    }
}

/// Which decisions a pass is allowed to execute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassMode {
    /// Startup pass: pulls only, never pushes.
    Bootstrap,
    /// Periodic pass: pulls and pushes.
    SteadyState,
}

impl PassMode {
    pub fn allows(self, action: SyncAction) -> bool {
        match (self, action) {
            (_, SyncAction::None) => false,
            (PassMode::Bootstrap, SyncAction::Push) => false,
            _ => true,
        }
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Default)]
pub struct PassReport {
    pub pulled: Vec<String>,
    pub pushed: Vec<String>,
    /// Names already in sync (or whose push was deferred by a bootstrap pass).
    pub unchanged: usize,
    pub failures: Vec<CacheSyncError>,
}

impl PassReport {
    /// Number of pull and push operations that completed.
    pub fn operations(&self) -> usize {
        self.pulled.len() + self.pushed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
