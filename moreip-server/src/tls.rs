//! Certificate resolution from the shared cache directory.
//!
//! The issuance collaborator and the sync engine both drop PEM bundles
//! (private key followed by the certificate chain) into the cache
//! directory, named after the host: `<host>` for the ECDSA bundle,
//! `<host>+rsa` for the RSA fallback. The resolver reads them on demand
//! and reloads a bundle when its modification time changes, so a freshly
//! pulled certificate is served on the next handshake.

use crate::error::{CertificateError, ServerResult};
use crate::hosts::{ServedHosts, normalize};
use rustls::ServerConfig;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::CertificateDer;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Bundle suffix for the RSA variant of a host certificate.
pub const RSA_SUFFIX: &str = "+rsa";

#[derive(Debug)]
struct LoadedCert {
    file: String,
    modified: SystemTime,
    key: Arc<CertifiedKey>,
}

#[derive(Debug)]
pub struct CacheCertResolver {
    cache_dir: PathBuf,
    hosts: ServedHosts,
    provider: Arc<CryptoProvider>,
    loaded: RwLock<HashMap<String, LoadedCert>>,
}

impl CacheCertResolver {
    pub fn new(cache_dir: impl Into<PathBuf>, hosts: ServedHosts) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            hosts,
            provider: Arc::new(rustls::crypto::ring::default_provider()),
            loaded: RwLock::new(HashMap::new()),
        }
    }

    pub fn provider(&self) -> Arc<CryptoProvider> {
        self.provider.clone()
    }

    /// Certificate for an SNI name, or `None` when the name is missing,
    /// not served here, or has no usable bundle yet.
    pub fn lookup(&self, server_name: Option<&str>) -> Option<Arc<CertifiedKey>> {
        let Some(name) = server_name else {
            debug!("TLS client sent no server name");
            return None;
        };
        if !self.hosts.contains(name) {
            debug!(server_name = %name, "refusing certificate for unknown host");
            return None;
        }

        let host = normalize(name);
        match self.certificate_for(&host) {
            Ok(Some(key)) => Some(key),
            Ok(None) => {
                warn!(host = %host, "no certificate in cache directory");
                None
            }
            Err(e) => {
                warn!(host = %host, error = %e, "cached certificate unusable");
                None
            }
        }
    }

    /// Loads `<host>`, falling back to `<host>+rsa`.
    pub fn certificate_for(&self, host: &str) -> Result<Option<Arc<CertifiedKey>>, CertificateError> {
        for file in [host.to_string(), format!("{host}{RSA_SUFFIX}")] {
            let path = self.cache_dir.join(&file);
            let modified = match fs::metadata(&path).and_then(|meta| meta.modified()) {
                Ok(modified) => modified,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(source) => return Err(CertificateError::Read { path, source }),
            };

            if let Some(key) = self.cached(host, &file, modified) {
                return Ok(Some(key));
            }

            let key = Arc::new(load_certified_key(&path, &self.provider)?);
            info!(host = %host, file = %file, "loaded certificate from cache directory");
            self.loaded
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .insert(
                    host.to_string(),
                    LoadedCert {
                        file,
                        modified,
                        key: key.clone(),
                    },
                );
            return Ok(Some(key));
        }
        Ok(None)
    }

    fn cached(&self, host: &str, file: &str, modified: SystemTime) -> Option<Arc<CertifiedKey>> {
        let loaded = self
            .loaded
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        loaded
            .get(host)
            .filter(|cert| cert.file == file && cert.modified == modified)
            .map(|cert| cert.key.clone())
    }
}

impl ResolvesServerCert for CacheCertResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        self.lookup(client_hello.server_name())
    }
}

/// Parses a PEM bundle holding a private key and a certificate chain.
pub fn load_certified_key(
    path: &Path,
    provider: &CryptoProvider,
) -> Result<CertifiedKey, CertificateError> {
    let pem = fs::read(path).map_err(|source| CertificateError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let chain: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<Result<_, _>>()
        .map_err(|source| CertificateError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    if chain.is_empty() {
        return Err(CertificateError::MissingCertificate {
            path: path.to_path_buf(),
        });
    }

    let key = rustls_pemfile::private_key(&mut pem.as_slice())
        .map_err(|source| CertificateError::Read {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| CertificateError::MissingKey {
            path: path.to_path_buf(),
        })?;
    let signing_key = provider
        .key_provider
        .load_private_key(key)
        .map_err(|source| CertificateError::Key {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(CertifiedKey::new(chain, signing_key))
}

/// rustls server configuration around the cache resolver, offering h2
/// and http/1.1.
pub fn server_config(resolver: Arc<CacheCertResolver>) -> ServerResult<Arc<ServerConfig>> {
    let mut config = ServerConfig::builder_with_provider(resolver.provider())
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_cert_resolver(resolver);
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}
