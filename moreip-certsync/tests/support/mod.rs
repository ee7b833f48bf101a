//! Shared test helpers: an in-memory object store with fault injection and
//! cache-directory fixtures.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use moreip_certsync::local_cache::LocalCache;
use moreip_certsync::sync_engine::CacheSync;
use moreip_certsync::{CacheSyncConfig, CacheSyncError, CacheSyncResult, ObjectStore, RemoteObject};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tempfile::TempDir;
use tokio::sync::Notify;

pub const PREFIX: &str = "certs";

/// Fixed reference time, whole seconds.
pub fn t(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, (Vec<u8>, DateTime<Utc>)>>,
    failing_puts: Mutex<HashSet<String>>,
    failing_gets: Mutex<HashSet<String>>,
    hanging_gets: Mutex<HashSet<String>>,
    fail_list: AtomicBool,
    pub list_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
    pub put_calls: AtomicUsize,
    pub get_started: Notify,
}

impl MemoryObjectStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Seeds an object with an explicit last-modified time.
    pub fn insert_at(&self, key: &str, data: &[u8], modified: DateTime<Utc>) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (data.to_vec(), modified));
    }

    pub fn object(&self, key: &str) -> Option<(Vec<u8>, DateTime<Utc>)> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn fail_put(&self, key: &str) {
        self.failing_puts.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_get(&self, key: &str) {
        self.failing_gets.lock().unwrap().insert(key.to_string());
    }

    pub fn hang_get(&self, key: &str) {
        self.hanging_gets.lock().unwrap().insert(key.to_string());
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> (usize, usize, usize) {
        (
            self.list_calls.load(Ordering::SeqCst),
            self.get_calls.load(Ordering::SeqCst),
            self.put_calls.load(Ordering::SeqCst),
        )
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list(&self, prefix: &str) -> CacheSyncResult<Vec<RemoteObject>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(CacheSyncError::StoreUnavailable("list refused".into()));
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, (data, modified))| RemoteObject {
                key: key.clone(),
                modified: *modified,
                size: data.len() as u64,
            })
            .collect())
    }

    async fn get(&self, key: &str) -> CacheSyncResult<Vec<u8>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.get_started.notify_one();
        if self.hanging_gets.lock().unwrap().contains(key) {
            std::future::pending::<()>().await;
        }
        if self.failing_gets.lock().unwrap().contains(key) {
            return Err(CacheSyncError::StoreUnavailable(format!("get {key} refused")));
        }
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| CacheSyncError::ObjectNotFound(key.to_string()))
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> CacheSyncResult<()> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_puts.lock().unwrap().contains(key) {
            return Err(CacheSyncError::StoreUnavailable(format!("put {key} refused")));
        }
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (data, Utc::now()));
        Ok(())
    }

    fn bucket(&self) -> &str {
        "memory-bucket"
    }
}

pub fn test_config(cache_dir: &Path) -> CacheSyncConfig {
    CacheSyncConfig {
        cache_dir: cache_dir.to_path_buf(),
        bucket: "memory-bucket".into(),
        prefix: PREFIX.into(),
        region: "us-east-1".into(),
        poll_interval_secs: 30,
        operation_timeout_secs: 5,
        ..CacheSyncConfig::default()
    }
}

/// A fresh cache directory wired to `store`.
pub fn test_sync(store: &Arc<MemoryObjectStore>) -> (TempDir, CacheSync) {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let cache = LocalCache::open(dir.path()).unwrap();
    let sync = CacheSync::new(store.clone(), cache, &config);
    (dir, sync)
}

/// Writes a cache file and sets its modification time.
pub fn write_local(dir: &Path, name: &str, data: &[u8], modified: DateTime<Utc>) {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    let file = std::fs::File::options().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::from(modified)).unwrap();
}

pub fn local_mtime(dir: &Path, name: &str) -> DateTime<Utc> {
    let meta = std::fs::metadata(dir.join(name)).unwrap();
    DateTime::<Utc>::from(meta.modified().unwrap())
}
