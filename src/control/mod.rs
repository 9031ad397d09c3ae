// src/control/mod.rs

//! Control-plane bootstrap.
//!
//! A small administrative HTTP endpoint (one active handler) that turns
//! authenticated requests into supervisor requests, the same way signals do.
//! See [`routes`] for the actions.

pub mod routes;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ControlEndpointConfig;
use crate::errors::{LaunchError, Result};
use crate::launcher::state::SupervisorHandle;
use crate::listeners::{BindUri, Scheme};
use crate::runner::Runner;

pub use routes::{ControlState, MAX_ACTIVE_HANDLERS, router};

/// How long in-flight control requests get once a stop was requested.
const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(5);

/// Running control endpoint.
pub struct ControlServer {
    uri: BindUri,
    local_addrs: Vec<SocketAddr>,
    unix_path: Option<PathBuf>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ControlServer {
    pub fn uri(&self) -> &BindUri {
        &self.uri
    }

    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    /// Stop accepting, give in-flight requests a bounded grace period, then
    /// unlink the unix socket if there is one.
    pub async fn stop(mut self) {
        self.shutdown.send_replace(true);
        if tokio::time::timeout(GRACEFUL_TIMEOUT, &mut self.task)
            .await
            .is_err()
        {
            warn!("control connections still open after shutdown timeout");
            self.task.abort();
        }

        if let Some(path) = &self.unix_path {
            if let Err(e) = std::fs::remove_file(path) {
                debug!(path = %path.display(), error = %e, "could not unlink control socket");
            }
        }
        info!("control server stopped");
    }
}

/// Bind and start the control endpoint.
///
/// Only `tcp://` and `unix://` are accepted; anything else is
/// `ControlEndpointMisconfigured`. The caller is expected to log the error
/// and carry on without a control plane.
pub async fn start_control(
    config: &ControlEndpointConfig,
    supervisor: SupervisorHandle,
    runner: Arc<dyn Runner>,
) -> Result<ControlServer> {
    let uri: BindUri = config
        .url
        .parse()
        .map_err(|_| LaunchError::ControlEndpointMisconfigured(config.url.clone()))?;

    let app = router(ControlState::new(
        supervisor,
        runner,
        config.auth_token.clone(),
    ));
    let (shutdown, stop_rx) = watch::channel(false);

    match (uri.scheme(), uri.host_port(), uri.unix_path()) {
        (Scheme::Tcp, Some(addr), _) => {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("binding control listener on {addr}"))?;
            let local = listener.local_addr()?;
            info!("* Starting control server on http://{local}");

            let task = tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, app)
                    .with_graceful_shutdown(stop_requested(stop_rx))
                    .await
                {
                    error!(error = %e, "control server error");
                }
            });
            Ok(ControlServer {
                uri,
                local_addrs: vec![local],
                unix_path: None,
                shutdown,
                task,
            })
        }
        #[cfg(unix)]
        (Scheme::Unix, _, Some(path)) => {
            crate::listeners::remove_stale_socket(&path).map_err(|reason| {
                anyhow::anyhow!("control socket {}: {reason}", path.display())
            })?;
            let listener = tokio::net::UnixListener::bind(&path)
                .with_context(|| format!("binding control socket {}", path.display()))?;
            info!("* Starting control server on unix://{}", path.display());

            let task = tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, app)
                    .with_graceful_shutdown(stop_requested(stop_rx))
                    .await
                {
                    error!(error = %e, "control server error");
                }
            });
            Ok(ControlServer {
                uri,
                local_addrs: Vec::new(),
                unix_path: Some(path),
                shutdown,
                task,
            })
        }
        _ => Err(LaunchError::ControlEndpointMisconfigured(config.url.clone())),
    }
}

async fn stop_requested(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            break;
        }
        if rx.changed().await.is_err() {
            break;
        }
    }
    debug!("control server received shutdown signal");
}
