//! The address echo served over TLS.

use crate::listener::PeerAddr;
use axum::Router;
use axum::extract::ConnectInfo;
use axum::routing::get;

/// Every path answers with the caller's address.
pub fn router() -> Router {
    Router::new().route("/", get(echo_ip)).fallback(echo_ip)
}

/// Caller's IP address followed by a newline.
pub async fn echo_ip(ConnectInfo(peer): ConnectInfo<PeerAddr>) -> String {
    format!("{}\n", peer.ip())
}
