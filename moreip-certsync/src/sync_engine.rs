//! Certificate cache sync scheduler.
//!
//! [`CacheSync`] executes one reconciliation pass: snapshot both sides,
//! decide per name, then pull or push sequentially. Per-file failures are
//! logged and collected; they never abort the pass.
//!
//! [`CacheSyncEngine`] owns the poll loop. It runs a steady-state pass on
//! every tick until told to stop through its [`CacheSyncHandle`] or until
//! every handle is dropped. A pass in flight when the stop arrives is
//! cancelled; file guards release on drop.

use crate::config::CacheSyncConfig;
use crate::error::{CacheSyncError, CacheSyncResult, SyncKind};
use crate::file_locks::FileLocks;
use crate::local_cache::LocalCache;
use crate::reconcile::{local_snapshot, reconcile, remote_snapshot, tally};
use crate::store::{KeyLayout, ObjectStore};
use crate::types::{CachedFile, PassMode, PassReport, SyncAction};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Commands accepted by the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCommand {
    /// Cancel any pass in flight and leave the loop.
    Stop,
    /// Run a steady-state pass now and restart the interval.
    SyncNow,
}

/// Handle for sending commands to the sync engine.
#[derive(Clone, Debug)]
pub struct CacheSyncHandle {
    command_tx: mpsc::Sender<SyncCommand>,
}

impl CacheSyncHandle {
    pub async fn stop(&self) -> CacheSyncResult<()> {
        self.command_tx
            .send(SyncCommand::Stop)
            .await
            .map_err(|_| CacheSyncError::NotRunning)
    }

    pub async fn sync_now(&self) -> CacheSyncResult<()> {
        self.command_tx
            .send(SyncCommand::SyncNow)
            .await
            .map_err(|_| CacheSyncError::NotRunning)
    }
}

/// Executes reconciliation passes between the cache directory and the store.
#[derive(Clone)]
pub struct CacheSync {
    store: Arc<dyn ObjectStore>,
    cache: LocalCache,
    layout: KeyLayout,
    locks: FileLocks,
    op_timeout: Duration,
}

impl CacheSync {
    pub fn new(store: Arc<dyn ObjectStore>, cache: LocalCache, config: &CacheSyncConfig) -> Self {
        Self {
            store,
            cache,
            layout: KeyLayout::new(&config.prefix),
            locks: FileLocks::new(),
            op_timeout: config.operation_timeout(),
        }
    }

    pub fn locks(&self) -> &FileLocks {
        &self.locks
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    pub fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    /// Startup pass: pulls whatever the cache lacks, pushes nothing.
    pub async fn bootstrap(&self) -> CacheSyncResult<PassReport> {
        self.run_pass(PassMode::Bootstrap).await
    }

    /// Runs one reconciliation pass.
    ///
    /// # Errors
    ///
    /// Fails only when either snapshot cannot be taken; per-file failures
    /// are returned in [`PassReport::failures`].
    pub async fn run_pass(&self, mode: PassMode) -> CacheSyncResult<PassReport> {
        let local_files = self.snapshot_local().await?;
        let list_prefix = self.layout.list_prefix();
        let remote_objects = self
            .bounded("list", &list_prefix, self.store.list(&list_prefix))
            .await?;

        let local = local_snapshot(&local_files);
        let remote = remote_snapshot(&remote_objects, &self.layout);
        let decisions = reconcile(&local, &remote);
        let (pulls, pushes, _) = tally(&decisions);
        debug!(
            ?mode,
            local = local.len(),
            remote = remote.len(),
            pulls,
            pushes,
            "reconciled certificate cache"
        );

        let mut report = PassReport::default();
        for decision in decisions {
            if !mode.allows(decision.action) {
                if decision.action == SyncAction::Push {
                    debug!(name = %decision.name, "push deferred until steady state");
                }
                report.unchanged += 1;
                continue;
            }

            let result = match decision.action {
                SyncAction::Pull => {
                    let modified = remote.get(&decision.name).copied();
                    self.pull(&decision.name, modified).await
                }
                SyncAction::Push => self.push(&decision.name).await,
                SyncAction::None => continue,
            };

            match (result, decision.action) {
                (Ok(()), SyncAction::Pull) => report.pulled.push(decision.name),
                (Ok(()), _) => report.pushed.push(decision.name),
                (Err(e), _) => {
                    warn!(error = %e, "certificate sync operation failed");
                    report.failures.push(e);
                }
            }
        }

        log_report(mode, &report);
        Ok(report)
    }

    /// Downloads one object into the cache, stamped with its remote time.
    async fn pull(&self, name: &str, modified: Option<DateTime<Utc>>) -> CacheSyncResult<()> {
        let key = self.layout.object_key(name);
        let _guard = self.locks.lock(name).await;

        let data = self
            .bounded("get", &key, self.store.get(&key))
            .await
            .map_err(|e| CacheSyncError::sync(SyncKind::Pull, name, e))?;
        let size = data.len();

        let cache = self.cache.clone();
        let file_name = name.to_string();
        blocking(self.cache.dir(), move || {
            cache.write_atomic(&file_name, &data, modified)
        })
        .await
        .map_err(|e| CacheSyncError::sync(SyncKind::Pull, name, e))?;

        info!(name = %name, key = %key, bytes = size, "pulled certificate from object store");
        Ok(())
    }

    /// Uploads one cache file under the configured prefix.
    async fn push(&self, name: &str) -> CacheSyncResult<()> {
        let key = self.layout.object_key(name);
        let _guard = self.locks.lock(name).await;

        let cache = self.cache.clone();
        let file_name = name.to_string();
        let data = blocking(self.cache.dir(), move || cache.read(&file_name))
            .await
            .map_err(|e| CacheSyncError::sync(SyncKind::Push, name, e))?;
        let size = data.len();

        self.bounded("put", &key, self.store.put(&key, data))
            .await
            .map_err(|e| CacheSyncError::sync(SyncKind::Push, name, e))?;

        info!(
            name = %name,
            bucket = %self.store.bucket(),
            key = %key,
            bytes = size,
            "pushed certificate to object store"
        );
        Ok(())
    }

    async fn snapshot_local(&self) -> CacheSyncResult<Vec<CachedFile>> {
        let cache = self.cache.clone();
        blocking(self.cache.dir(), move || cache.snapshot()).await
    }

    /// Applies the per-operation timeout to a store call.
    async fn bounded<T>(
        &self,
        op: &str,
        target: &str,
        fut: impl Future<Output = CacheSyncResult<T>>,
    ) -> CacheSyncResult<T> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheSyncError::StoreUnavailable(format!(
                "{op} {target} timed out after {:?}",
                self.op_timeout
            ))),
        }
    }
}

/// Runs filesystem work off the async workers.
async fn blocking<T, F>(dir: &std::path::Path, f: F) -> CacheSyncResult<T>
where
    F: FnOnce() -> CacheSyncResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CacheSyncError::filesystem(dir, std::io::Error::other(e)))?
}

fn log_report(mode: PassMode, report: &PassReport) {
    if report.operations() > 0 || !report.is_clean() {
        info!(
            ?mode,
            pulled = report.pulled.len(),
            pushed = report.pushed.len(),
            unchanged = report.unchanged,
            failed = report.failures.len(),
            "certificate sync pass finished"
        );
    } else {
        debug!(?mode, unchanged = report.unchanged, "certificate cache already in sync");
    }
}

/// Background poll loop around a [`CacheSync`].
pub struct CacheSyncEngine {
    sync: CacheSync,
    command_rx: mpsc::Receiver<SyncCommand>,
    poll_interval: Duration,
    passes: u64,
}

/// Creates a sync engine and its command handle.
pub fn create_cache_sync_engine(
    sync: CacheSync,
    poll_interval: Duration,
) -> (CacheSyncHandle, CacheSyncEngine) {
    let (command_tx, command_rx) = mpsc::channel(16);

    let handle = CacheSyncHandle { command_tx };
    let engine = CacheSyncEngine {
        sync,
        command_rx,
        poll_interval,
        passes: 0,
    };

    (handle, engine)
}

/// Whether the loop should keep going after a pass.
#[derive(Debug, PartialEq, Eq)]
enum LoopControl {
    Continue,
    Stop,
}

impl CacheSyncEngine {
    pub fn sync(&self) -> &CacheSync {
        &self.sync
    }

    /// Runs steady-state passes until stopped. Returns the number of
    /// passes that completed.
    pub async fn run(mut self) -> u64 {
        info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            cache_dir = %self.sync.cache().dir().display(),
            prefix = %self.sync.layout().prefix(),
            "certificate sync engine started"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Skip first immediate tick
        ticker.tick().await;

        loop {
            let control = tokio::select! {
                _ = ticker.tick() => self.tick().await,
                cmd = self.command_rx.recv() => match cmd {
                    Some(SyncCommand::SyncNow) => {
                        let control = self.tick().await;
                        ticker.reset();
                        control
                    }
                    Some(SyncCommand::Stop) => {
                        info!("certificate sync engine stopping");
                        LoopControl::Stop
                    }
                    None => {
                        info!("command channel closed, stopping certificate sync engine");
                        LoopControl::Stop
                    }
                },
            };
            if control == LoopControl::Stop {
                break;
            }
        }

        info!(passes = self.passes, "certificate sync engine stopped");
        self.passes
    }

    /// Runs one steady-state pass, abandoning it if a stop arrives first.
    async fn tick(&mut self) -> LoopControl {
        let pass = self.sync.run_pass(PassMode::SteadyState);
        tokio::pin!(pass);

        loop {
            tokio::select! {
                biased;
                result = &mut pass => {
                    self.passes += 1;
                    if let Err(e) = result {
                        error!(error = %e, "certificate sync pass failed");
                    }
                    return LoopControl::Continue;
                }
                cmd = self.command_rx.recv() => match cmd {
                    Some(SyncCommand::SyncNow) => {
                        debug!("sync requested while a pass is running");
                    }
                    Some(SyncCommand::Stop) | None => {
                        info!("cancelling in-flight certificate sync pass");
                        return LoopControl::Stop;
                    }
                },
            }
        }
    }
}
