//! Integration tests for S3ObjectStore and the sync engine against MinIO.
//!
//! Requires a MinIO server on localhost:9000 with bucket `moreip-certs`
//! and the default `minioadmin` credentials. Run with `--ignored`.

mod support;

use aws_credential_types::Credentials;
use moreip_certsync::credential_manager::CredentialManager;
use moreip_certsync::local_cache::LocalCache;
use moreip_certsync::s3_store::S3ObjectStore;
use moreip_certsync::sync_engine::CacheSync;
use moreip_certsync::{CacheSyncConfig, CacheSyncError, ObjectStore, PassMode};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

const BUCKET: &str = "moreip-certs";

fn minio_config(cache_dir: &Path, prefix: &str) -> CacheSyncConfig {
    CacheSyncConfig {
        cache_dir: cache_dir.to_path_buf(),
        bucket: BUCKET.into(),
        prefix: prefix.into(),
        region: "us-east-1".into(),
        endpoint_override: Some("http://localhost:9000".into()),
        ..CacheSyncConfig::default()
    }
}

fn minio_store(config: &CacheSyncConfig) -> S3ObjectStore {
    let credentials = CredentialManager::from_provider(Credentials::new(
        "minioadmin",
        "minioadmin",
        None,
        None,
        "minio",
    ));
    S3ObjectStore::new(config, &credentials)
}

/// Per-test unique prefix to prevent collisions.
fn unique_prefix() -> String {
    format!("test-runs/{}", Uuid::new_v4())
}

#[tokio::test]
#[serial]
#[ignore = "requires MinIO"]
async fn put_get_roundtrip() {
    let prefix = unique_prefix();
    let config = minio_config(Path::new("unused"), &prefix);
    let store = minio_store(&config);
    let key = format!("{prefix}/example.com");

    store.put(&key, b"certificate".to_vec()).await.unwrap();
    assert_eq!(store.get(&key).await.unwrap(), b"certificate".to_vec());
}

#[tokio::test]
#[serial]
#[ignore = "requires MinIO"]
async fn list_reports_uploaded_objects() {
    let prefix = unique_prefix();
    let config = minio_config(Path::new("unused"), &prefix);
    let store = minio_store(&config);

    store.put(&format!("{prefix}/a"), b"a".to_vec()).await.unwrap();
    store.put(&format!("{prefix}/b"), b"bb".to_vec()).await.unwrap();

    let mut objects = store.list(&format!("{prefix}/")).await.unwrap();
    objects.sort_by(|x, y| x.key.cmp(&y.key));
    let keys: Vec<_> = objects.iter().map(|o| o.key.clone()).collect();
    assert_eq!(keys, vec![format!("{prefix}/a"), format!("{prefix}/b")]);
    assert_eq!(objects[1].size, 2);
}

#[tokio::test]
#[serial]
#[ignore = "requires MinIO"]
async fn list_empty_for_unused_prefix() {
    let prefix = unique_prefix();
    let config = minio_config(Path::new("unused"), &prefix);
    let store = minio_store(&config);

    assert!(store.list(&format!("{prefix}/")).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
#[ignore = "requires MinIO"]
async fn get_missing_object_is_not_found() {
    let prefix = unique_prefix();
    let config = minio_config(Path::new("unused"), &prefix);
    let store = minio_store(&config);

    let err = store.get(&format!("{prefix}/missing")).await.unwrap_err();
    assert!(matches!(err, CacheSyncError::ObjectNotFound(_)), "{err:?}");
}

#[tokio::test]
#[serial]
#[ignore = "requires MinIO"]
async fn missing_bucket_is_reported() {
    let prefix = unique_prefix();
    let mut config = minio_config(Path::new("unused"), &prefix);
    config.bucket = format!("missing-{}", Uuid::new_v4());
    let store = minio_store(&config);

    let err = store.list("").await.unwrap_err();
    assert!(matches!(err, CacheSyncError::BucketNotFound(_)), "{err:?}");
}

#[tokio::test]
#[serial]
#[ignore = "requires MinIO"]
async fn two_caches_converge_through_minio() {
    let prefix = unique_prefix();
    let first_dir = TempDir::new().unwrap();
    let second_dir = TempDir::new().unwrap();

    let open = |dir: &TempDir| {
        let config = minio_config(dir.path(), &prefix);
        let store: Arc<dyn ObjectStore> = Arc::new(minio_store(&config));
        let cache = LocalCache::open(dir.path()).unwrap();
        CacheSync::new(store, cache, &config)
    };
    let first = open(&first_dir);
    let second = open(&second_dir);

    support::write_local(first_dir.path(), "example.com", b"issued", support::t(0));
    let report = first.run_pass(PassMode::SteadyState).await.unwrap();
    assert_eq!(report.pushed, vec!["example.com".to_string()]);

    let report = second.bootstrap().await.unwrap();
    assert_eq!(report.pulled, vec!["example.com".to_string()]);
    assert_eq!(
        std::fs::read(second_dir.path().join("example.com")).unwrap(),
        b"issued"
    );

    // Both sides are now in sync.
    assert_eq!(first.run_pass(PassMode::SteadyState).await.unwrap().operations(), 0);
    assert_eq!(second.run_pass(PassMode::SteadyState).await.unwrap().operations(), 0);
}
