//! Process lifecycle.
//!
//! Startup order: verify credentials, open the cache directory, run the
//! pull-only bootstrap pass (abandoned if a shutdown signal arrives first),
//! bind both listeners. Then the plaintext
//! listener, the TLS listener and the sync loop run side by side until a
//! shutdown signal arrives; the sync loop is stopped (cancelling any pass
//! in flight) and the listeners get [`DRAIN_TIMEOUT`] to finish open
//! requests.

use crate::challenge::{self, ChallengeState};
use crate::cli::ServerSettings;
use crate::echo;
use crate::error::{ServerError, ServerResult};
use crate::hosts::ServedHosts;
use crate::listener::{PeerAddr, TlsListener};
use crate::tls::{self, CacheCertResolver};
use moreip_certsync::ObjectStore;
use moreip_certsync::credential_manager::CredentialManager;
use moreip_certsync::local_cache::LocalCache;
use moreip_certsync::s3_store::S3ObjectStore;
use moreip_certsync::sync_engine::{CacheSync, create_cache_sync_engine};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// How long open connections may keep running after shutdown starts.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs one instance until SIGINT or SIGTERM.
pub async fn run(settings: ServerSettings) -> ServerResult<()> {
    let credentials = CredentialManager::for_profile(&settings.sync.profile);
    credentials.verify().await?;
    info!(
        bucket = %settings.sync.bucket,
        region = %settings.sync.region,
        source = %credentials.source(),
        "AWS credentials verified"
    );

    let cache = LocalCache::open(&settings.sync.cache_dir)?;
    let store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(&settings.sync, &credentials));
    let sync = CacheSync::new(store, cache, &settings.sync);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    if !bootstrap_until(&sync, &mut shutdown).await {
        return Ok(());
    }

    let listeners = Listeners {
        http: bind(settings.http_addr).await?,
        https: bind(settings.https_addr).await?,
    };
    let instance = Instance {
        hosts: ServedHosts::new(&settings.domain),
        sync,
        poll_interval: settings.sync.poll_interval(),
    };
    serve(instance, listeners, shutdown).await
}

/// Runs the bootstrap pass unless `shutdown` resolves first. Returns
/// `false` when shutdown won; the pass is dropped mid-flight in that case.
///
/// A failed pass is logged and the instance serves whatever certificates
/// are already local.
pub async fn bootstrap_until<F>(sync: &CacheSync, shutdown: &mut F) -> bool
where
    F: Future<Output = ()> + Unpin,
{
    tokio::select! {
        result = sync.bootstrap() => {
            match result {
                Ok(report) => info!(
                    pulled = report.pulled.len(),
                    failed = report.failures.len(),
                    "bootstrap pass finished"
                ),
                Err(e) => error!(error = %e, "bootstrap pass failed, serving local certificates only"),
            }
            true
        }
        _ = shutdown => {
            info!("shutdown requested during bootstrap pass");
            false
        }
    }
}

/// Bound sockets for the two listeners.
pub struct Listeners {
    pub http: TcpListener,
    pub https: TcpListener,
}

/// What a running instance serves and synchronizes.
pub struct Instance {
    pub hosts: ServedHosts,
    pub sync: CacheSync,
    pub poll_interval: Duration,
}

pub async fn bind(addr: SocketAddr) -> ServerResult<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

/// Serves both listeners and runs the sync loop until `shutdown` resolves.
pub async fn serve(
    instance: Instance,
    listeners: Listeners,
    shutdown: impl Future<Output = ()> + Send,
) -> ServerResult<()> {
    let cache = instance.sync.cache().clone();
    let resolver = Arc::new(CacheCertResolver::new(cache.dir(), instance.hosts.clone()));
    let tls_config = tls::server_config(resolver)?;

    let http_addr = local_addr("plaintext", &listeners.http)?;
    let https_addr = local_addr("TLS", &listeners.https)?;
    let tls_listener = TlsListener::new(listeners.https, tls_config).map_err(|source| {
        ServerError::Bind {
            addr: https_addr,
            source,
        }
    })?;

    let (stop_tx, stop_rx) = watch::channel(false);

    let http_app = challenge::router(ChallengeState::new(cache, instance.hosts.clone()));
    let mut http = tokio::spawn(
        axum::serve(listeners.http, http_app)
            .with_graceful_shutdown(stopped(stop_rx.clone()))
            .into_future(),
    );
    let https_app = echo::router().into_make_service_with_connect_info::<PeerAddr>();
    let mut https = tokio::spawn(
        axum::serve(tls_listener, https_app)
            .with_graceful_shutdown(stopped(stop_rx))
            .into_future(),
    );

    let (sync_handle, engine) = create_cache_sync_engine(instance.sync, instance.poll_interval);
    let sync_task = tokio::spawn(engine.run());

    info!(
        domain = %instance.hosts.domain(),
        http = %http_addr,
        https = %https_addr,
        "moreip serving"
    );

    shutdown.await;
    info!("shutting down");
    let _ = stop_tx.send(true);
    if let Err(e) = sync_handle.stop().await {
        debug!(error = %e, "sync engine already stopped");
    }

    match sync_task.await {
        Ok(passes) => debug!(passes, "sync loop finished"),
        Err(e) => warn!(error = %e, "sync loop task failed"),
    }

    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        ((&mut http).await, (&mut https).await)
    })
    .await;

    match drained {
        Ok((http_result, https_result)) => {
            listener_result("plaintext", http_result)?;
            listener_result("TLS", https_result)?;
            info!("shutdown complete");
            Ok(())
        }
        Err(_) => {
            warn!(
                timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "listeners did not drain in time, closing remaining connections"
            );
            http.abort();
            https.abort();
            Ok(())
        }
    }
}

fn local_addr(name: &'static str, listener: &TcpListener) -> ServerResult<SocketAddr> {
    listener.local_addr().map_err(|source| ServerError::Serve {
        listener: name,
        source,
    })
}

fn listener_result(
    listener: &'static str,
    result: Result<io::Result<()>, tokio::task::JoinError>,
) -> ServerResult<()> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(ServerError::Serve { listener, source }),
        Err(e) => Err(ServerError::Serve {
            listener,
            source: io::Error::other(e),
        }),
    }
}

async fn stopped(mut stop: watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("received SIGINT"),
        _ = terminate => info!("received SIGTERM"),
    }
}
