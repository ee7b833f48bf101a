//! Logging setup for the binary.

use tracing_subscriber::EnvFilter;

/// Installs the global `fmt` subscriber. `RUST_LOG` takes precedence over
/// `level`.
pub fn init_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(level))
        .init();
}

pub fn log_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}
