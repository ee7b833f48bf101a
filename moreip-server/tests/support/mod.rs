//! Shared helpers: minted certificates, a TLS client, an in-memory store.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moreip_certsync::{CacheSyncError, CacheSyncResult, ObjectStore, RemoteObject};
use rcgen::{CertificateParams, KeyPair};
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use std::collections::BTreeMap;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

pub const DOMAIN: &str = "moreip.example.net";

/// A self-signed certificate and the PEM bundle the cache stores for it.
pub struct TestCert {
    pub der: CertificateDer<'static>,
    pub bundle: String,
}

pub fn mint_cert(names: &[&str]) -> TestCert {
    let key_pair = KeyPair::generate().unwrap();
    let params =
        CertificateParams::new(names.iter().map(|n| n.to_string()).collect::<Vec<_>>()).unwrap();
    let cert = params.self_signed(&key_pair).unwrap();
    TestCert {
        der: cert.der().clone(),
        bundle: format!("{}{}", key_pair.serialize_pem(), cert.pem()),
    }
}

/// Certificate covering every name served for [`DOMAIN`].
pub fn served_cert() -> TestCert {
    mint_cert(&[
        DOMAIN,
        &format!("ipv4.{DOMAIN}"),
        &format!("ipv6.{DOMAIN}"),
    ])
}

pub fn write_file(dir: &Path, name: &str, data: &[u8], modified: SystemTime) {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    let file = std::fs::File::options().write(true).open(&path).unwrap();
    file.set_modified(modified).unwrap();
}

/// `GET path` over TLS with SNI `server_name`, trusting only `root`.
pub async fn https_get(
    addr: SocketAddr,
    server_name: &str,
    root: &CertificateDer<'static>,
    path: &str,
) -> io::Result<String> {
    let mut roots = RootCertStore::empty();
    roots.add(root.clone()).unwrap();
    let config = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let tcp = TcpStream::connect(addr).await?;
    let name = ServerName::try_from(server_name.to_string()).unwrap();
    let mut tls = TlsConnector::from(Arc::new(config)).connect(name, tcp).await?;
    tls.write_all(request(server_name, path).as_bytes()).await?;
    read_response(&mut tls).await
}

/// `GET path` over plaintext TCP.
pub async fn http_get(addr: SocketAddr, host: &str, path: &str) -> io::Result<String> {
    let mut tcp = TcpStream::connect(addr).await?;
    tcp.write_all(request(host, path).as_bytes()).await?;
    read_response(&mut tcp).await
}

fn request(host: &str, path: &str) -> String {
    format!("GET {path} HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n")
}

async fn read_response<S: tokio::io::AsyncRead + Unpin>(stream: &mut S) -> io::Result<String> {
    let mut response = Vec::new();
    match stream.read_to_end(&mut response).await {
        Ok(_) => {}
        // Peer closed without close_notify.
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {}
        Err(e) => return Err(e),
    }
    Ok(String::from_utf8_lossy(&response).into_owned())
}

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, (Vec<u8>, DateTime<Utc>)>>,
}

impl MemoryObjectStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, key: &str, data: &[u8], modified: DateTime<Utc>) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (data.to_vec(), modified));
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list(&self, prefix: &str) -> CacheSyncResult<Vec<RemoteObject>> {
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
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| CacheSyncError::ObjectNotFound(key.to_string()))
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> CacheSyncResult<()> {
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
