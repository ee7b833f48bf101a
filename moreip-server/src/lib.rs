//! moreip server: answers every HTTPS request with the caller's IP address.
//!
//! Several instances share TLS certificates through an S3 bucket; the
//! `moreip-certsync` engine keeps each instance's certificate cache
//! directory in step with the bucket while this crate serves from it.

pub mod challenge;
pub mod cli;
pub mod echo;
pub mod error;
pub mod hosts;
pub mod listener;
pub mod server;
pub mod telemetry;
pub mod tls;

pub use cli::{ServerArgs, ServerSettings};
pub use error::{CertificateError, ServerError, ServerResult};
pub use hosts::ServedHosts;
