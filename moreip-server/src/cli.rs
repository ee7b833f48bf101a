//! Command line and environment surface.
//!
//! Every setting can come from a flag or an environment variable; flags
//! win. Required values left unset (or at their placeholder) stop the
//! process before any network activity.

use clap::Parser;
use moreip_certsync::{CacheSyncConfig, CacheSyncError, CacheSyncResult};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Placeholder domain shipped in sample configuration.
pub const UNSET_DOMAIN: &str = "example.com";

/// Placeholder bucket shipped in sample configuration.
pub const UNSET_BUCKET: &str = "bucket.example.com";

/// moreip: answers every HTTPS request with the caller's IP address.
#[derive(Parser, Debug, Clone)]
#[command(name = "moreip")]
#[command(author, version, about, long_about = None)]
pub struct ServerArgs {
    /// Fully qualified domain name; ipv4.<domain> and ipv6.<domain> are
    /// served as well
    #[arg(short = 'd', long, env = "DOMAIN")]
    pub domain: Option<String>,

    /// AWS region of the certificate bucket
    #[arg(short = 'r', long, env = "REGION")]
    pub region: Option<String>,

    /// S3 bucket shared by every instance
    #[arg(short = 'b', long, env = "OBJECTBUCKET")]
    pub bucket: Option<String>,

    /// Key prefix for cached certificates inside the bucket
    #[arg(long, env = "PREFIX", default_value = "certs")]
    pub prefix: String,

    /// Shared-credentials profile, used after environment and role credentials
    #[arg(short = 'p', long, env = "PROFILE", default_value = "default")]
    pub profile: String,

    /// Local certificate cache directory
    #[arg(long, env = "CACHE_DIR", default_value = "certs")]
    pub cache_dir: PathBuf,

    /// S3 endpoint override (MinIO, LocalStack)
    #[arg(long, env = "S3_ENDPOINT")]
    pub endpoint_url: Option<String>,

    /// Seconds between steady-state sync passes
    #[arg(long, default_value_t = 30)]
    pub poll_interval_secs: u64,

    /// Upper bound in seconds for one S3 call
    #[arg(long, default_value_t = 10)]
    pub op_timeout_secs: u64,

    /// Plaintext listener (ACME HTTP-01 and redirects)
    #[arg(long, default_value = "0.0.0.0:80")]
    pub http_addr: SocketAddr,

    /// TLS listener
    #[arg(long, default_value = "0.0.0.0:443")]
    pub https_addr: SocketAddr,

    /// Log level when RUST_LOG is not set
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Validated settings for one server instance.
#[derive(Clone, Debug)]
pub struct ServerSettings {
    pub domain: String,
    pub sync: CacheSyncConfig,
    pub http_addr: SocketAddr,
    pub https_addr: SocketAddr,
}

impl ServerArgs {
    /// Checks required values and builds the instance settings.
    ///
    /// # Errors
    ///
    /// `Config` when domain, bucket or region is missing or still at its
    /// placeholder.
    pub fn resolve(&self) -> CacheSyncResult<ServerSettings> {
        let domain = required(self.domain.as_deref(), Some(UNSET_DOMAIN), "domain")?;
        let bucket = required(self.bucket.as_deref(), Some(UNSET_BUCKET), "bucket")?;
        let region = required(self.region.as_deref(), None, "region")?;

        let sync = CacheSyncConfig {
            cache_dir: self.cache_dir.clone(),
            bucket,
            prefix: self.prefix.clone(),
            region,
            profile: self.profile.clone(),
            endpoint_override: self
                .endpoint_url
                .as_deref()
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string),
            poll_interval_secs: self.poll_interval_secs,
            operation_timeout_secs: self.op_timeout_secs,
        };
        sync.validate()?;

        Ok(ServerSettings {
            domain: crate::hosts::normalize(&domain),
            sync,
            http_addr: self.http_addr,
            https_addr: self.https_addr,
        })
    }
}

fn required(value: Option<&str>, placeholder: Option<&str>, what: &str) -> CacheSyncResult<String> {
    match value.map(str::trim) {
        None | Some("") => Err(CacheSyncError::Config(format!("{what} is not set"))),
        Some(v) if placeholder.is_some_and(|p| v.eq_ignore_ascii_case(p)) => Err(
            CacheSyncError::Config(format!("{what} is still the placeholder {v}")),
        ),
        Some(v) => Ok(v.to_string()),
    }
}
