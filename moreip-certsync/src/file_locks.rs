//! Per-file mutual exclusion for cache entries.
//!
//! A guard is held across read-then-upload and download-then-write so two
//! in-process operations never interleave on the same file. Guards release
//! on drop, including when the owning future is cancelled. A name's entry
//! leaves the table when its last guard drops with nobody waiting, so the
//! table only holds names currently in use.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as TokioMutex, OwnedMutexGuard};

type LockTable = Arc<Mutex<HashMap<String, Arc<TokioMutex<()>>>>>;

/// Exclusive access to one cache file name.
#[derive(Debug)]
pub struct FileGuard {
    name: String,
    table: LockTable,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for FileGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut locks = self.table.lock().unwrap_or_else(|p| p.into_inner());
        // Waiters hold their own reference, so a count of one is the table's.
        if locks
            .get(&self.name)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.name);
        }
    }
}

/// Lazily-populated map of per-name async locks.
#[derive(Clone, Debug, Default)]
pub struct FileLocks {
    locks: LockTable,
}

impl FileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, name: &str) -> Arc<TokioMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(TokioMutex::new(())))
            .clone()
    }

    fn guard(&self, name: &str, guard: OwnedMutexGuard<()>) -> FileGuard {
        FileGuard {
            name: name.to_string(),
            table: self.locks.clone(),
            guard: Some(guard),
        }
    }

    /// Waits for exclusive access to `name`.
    pub async fn lock(&self, name: &str) -> FileGuard {
        let guard = self.entry(name).lock_owned().await;
        self.guard(name, guard)
    }

    #[cfg(test)]
    fn try_lock(&self, name: &str) -> Option<FileGuard> {
        let guard = self.entry(name).try_lock_owned().ok()?;
        Some(self.guard(name, guard))
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().unwrap().len()
    }
}
