//! Server error types.

use moreip_certsync::CacheSyncError;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    CacheSync(#[from] CacheSyncError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("TLS configuration failed: {0}")]
    Tls(#[from] rustls::Error),

    #[error("{listener} listener failed: {source}")]
    Serve {
        listener: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Why a cached certificate bundle could not be used.
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no certificate in {}", path.display())]
    MissingCertificate { path: PathBuf },

    #[error("no private key in {}", path.display())]
    MissingKey { path: PathBuf },

    #[error("unusable private key in {}: {source}", path.display())]
    Key {
        path: PathBuf,
        #[source]
        source: rustls::Error,
    },
}
