//! Plaintext listener: ACME HTTP-01 responses and redirects to HTTPS.
//!
//! The issuance collaborator leaves each pending key authorization in the
//! cache directory as `<token>+http-01`; this listener only reads them.

use crate::hosts::{ServedHosts, normalize, strip_port};
use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use moreip_certsync::CacheSyncError;
use moreip_certsync::local_cache::LocalCache;
use std::io::ErrorKind;
use tracing::{debug, error, warn};

/// HTTP-01 challenge path prefix.
pub const ACME_CHALLENGE_PREFIX: &str = "/.well-known/acme-challenge/";

/// Cache file suffix for a pending HTTP-01 response.
pub const HTTP01_SUFFIX: &str = "+http-01";

#[derive(Clone, Debug)]
pub struct ChallengeState {
    cache: LocalCache,
    hosts: ServedHosts,
}

impl ChallengeState {
    pub fn new(cache: LocalCache, hosts: ServedHosts) -> Self {
        Self { cache, hosts }
    }
}

pub fn router(state: ChallengeState) -> Router {
    Router::new()
        .route("/.well-known/acme-challenge/{token}", get(serve_challenge))
        .fallback(redirect_to_https)
        .with_state(state)
}

async fn serve_challenge(
    State(state): State<ChallengeState>,
    Path(token): Path<String>,
) -> Response {
    if !is_valid_token(&token) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let cache = state.cache.clone();
    let name = format!("{token}{HTTP01_SUFFIX}");
    match tokio::task::spawn_blocking(move || cache.read(&name)).await {
        Ok(Ok(body)) => {
            debug!(token = %token, "served ACME HTTP-01 challenge");
            ([(header::CONTENT_TYPE, "text/plain")], body).into_response()
        }
        Ok(Err(CacheSyncError::Filesystem { source, .. })) if source.kind() == ErrorKind::NotFound => {
            debug!(token = %token, "unknown ACME challenge token");
            StatusCode::NOT_FOUND.into_response()
        }
        Ok(Err(e)) => {
            warn!(token = %token, error = %e, "failed to read ACME challenge");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(e) => {
            error!(error = %e, "challenge read task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Tokens are base64url.
fn is_valid_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

async fn redirect_to_https(
    State(state): State<ChallengeState>,
    method: Method,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return (StatusCode::BAD_REQUEST, "Use HTTPS\n").into_response();
    }

    let Some(host) = request_host(&headers, &uri) else {
        return (StatusCode::BAD_REQUEST, "missing Host header\n").into_response();
    };
    if !state.hosts.contains(&host) {
        debug!(host = %host, "plaintext request for unknown host");
        return (StatusCode::BAD_REQUEST, "unknown host\n").into_response();
    }

    let path = uri.path_and_query().map_or("/", |pq| pq.as_str());
    let location = format!("https://{host}{path}");
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

fn request_host(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let authority = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| uri.authority().map(|a| a.as_str()))?;
    let host = normalize(strip_port(authority));
    (!host.is_empty()).then_some(host)
}
