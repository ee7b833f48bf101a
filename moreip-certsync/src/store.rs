//! Remote object store abstraction and the canonical key layout.
//!
//! Cache files map to objects as `prefix/filename`, always. Keys that do
//! not fit that shape (nested keys, the prefix's own directory marker,
//! keys outside the prefix) are ignored by the sync engine.

use crate::error::CacheSyncResult;
use crate::types::RemoteObject;
use async_trait::async_trait;

/// List/get/put over a single bucket.
///
/// Implementations own connection and credential configuration only; no
/// sync state lives here.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Lists every object whose key starts with `prefix`.
    ///
    /// An empty or never-written prefix yields an empty list, not an error.
    async fn list(&self, prefix: &str) -> CacheSyncResult<Vec<RemoteObject>>;

    /// Fetches the full body of one object.
    async fn get(&self, key: &str) -> CacheSyncResult<Vec<u8>>;

    /// Stores `data` under `key`, replacing any existing object.
    async fn put(&self, key: &str, data: Vec<u8>) -> CacheSyncResult<()>;

    /// Bucket name, for logging.
    fn bucket(&self) -> &str;
}

/// Maps cache file names to object keys and back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyLayout {
    prefix: String,
}

impl KeyLayout {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    /// The normalized prefix, without leading or trailing `/`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Prefix argument for `ObjectStore::list`.
    pub fn list_prefix(&self) -> String {
        if self.prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", self.prefix)
        }
    }

    /// Object key for a cache file name.
    pub fn object_key(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{name}", self.prefix)
        }
    }

    /// Cache file name for an object key, if the key belongs to this layout.
    pub fn file_name<'a>(&self, key: &'a str) -> Option<&'a str> {
        let rest = if self.prefix.is_empty() {
            key
        } else {
            key.strip_prefix(self.prefix.as_str())?.strip_prefix('/')?
        };
        if rest.is_empty() || rest.contains('/') || rest == "." || rest == ".." {
            return None;
        }
        Some(rest)
    }
}
