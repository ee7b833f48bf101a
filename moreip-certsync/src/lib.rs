//! Certificate cache sync engine for moreip.
//!
//! Keeps a local certificate cache directory and a shared S3 bucket prefix
//! mutually consistent so several server instances can reuse certificates
//! issued by any one of them:
//! - Pure reconciler over local and remote snapshots (newest copy wins)
//! - Pull-only bootstrap pass before serving starts
//! - Cancellable poll loop for steady-state passes
//! - Per-file locking and atomic temp-file writes
//! - Injected AWS credential provider and S3 client

pub mod config;
pub mod credential_manager;
pub mod error;
pub mod file_locks;
pub mod local_cache;
pub mod reconcile;
pub mod s3_store;
pub mod store;
pub mod sync_engine;
pub mod types;

pub use config::CacheSyncConfig;
pub use error::{CacheSyncError, CacheSyncResult, SyncKind};
pub use store::{KeyLayout, ObjectStore};
pub use types::*;
