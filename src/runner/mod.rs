// src/runner/mod.rs

//! Runner contract: the execution strategy the launcher drives.
//!
//! - [`Runner`] is the capability set the launcher depends on.
//! - [`RunnerHandle`] wraps the strategy selected at setup, the capability
//!   set read once at construction, and the control-plane server (torn
//!   down first on restart).
//! - [`process`] is the production strategy: it supervises copies of an
//!   external server command that adopt the listeners through the same
//!   handoff variables as a hot-restarted launcher.
//! - [`worker`] spawns and signals individual worker processes.

pub mod process;
pub mod worker;

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use serde_json::json;
use tracing::{debug, info};

use crate::config::LauncherConfig;
use crate::control::ControlServer;
use crate::errors::Result;
use crate::listeners::ListenerSet;

pub use process::ProcessRunner;

/// Boxed future returned by the blocking runner operations.
pub type RunnerFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Optional capabilities a runner may advertise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub phased_restart: bool,
    pub reload_worker_directory: bool,
}

/// The execution strategy driven by the launcher.
///
/// All methods take `&self`: `stop`/`halt` are called while `run` is still
/// pending, so implementations keep their mutable state behind channels or
/// locks.
pub trait Runner: Send + Sync {
    /// Begin serving; resolves once the runner has been told to stop (or
    /// its work ended on its own).
    fn run(&self) -> RunnerFuture<'_, Result<()>>;

    /// Request a graceful shutdown without waiting for it.
    fn stop(&self);

    /// Request a graceful shutdown and wait until in-flight work drained.
    fn stop_blocked(&self) -> RunnerFuture<'_, Result<()>>;

    /// Terminate immediately, skipping the drain.
    fn halt(&self);

    /// Tear down auxiliary resources before descriptors are exported.
    fn before_restart(&self) -> RunnerFuture<'_, ()> {
        Box::pin(async {})
    }

    /// Advertised optional capabilities; read once by [`RunnerHandle::new`].
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Start replacing workers incrementally. Returns `false` when a phased
    /// restart cannot be performed.
    fn phased_restart(&self) -> bool {
        false
    }

    /// Re-resolve the workers' directory without restarting. Returns `false`
    /// when unsupported.
    fn reload_worker_directory(&self) -> bool {
        false
    }

    /// Point-in-time statistics served by the control plane.
    fn stats(&self) -> serde_json::Value {
        json!({})
    }
}

/// Single process or clustered workers; fixed for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerMode {
    Single,
    Cluster { workers: usize },
}

impl RunnerMode {
    pub fn from_workers(workers: usize) -> Self {
        if workers > 0 {
            RunnerMode::Cluster { workers }
        } else {
            RunnerMode::Single
        }
    }

    pub fn worker_count(&self) -> usize {
        match self {
            RunnerMode::Single => 1,
            RunnerMode::Cluster { workers } => *workers,
        }
    }

    pub fn is_clustered(&self) -> bool {
        matches!(self, RunnerMode::Cluster { .. })
    }
}

impl fmt::Display for RunnerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerMode::Single => f.write_str("single"),
            RunnerMode::Cluster { .. } => f.write_str("cluster"),
        }
    }
}

/// The runner selected at setup plus what the launcher needs around it.
pub struct RunnerHandle {
    mode: RunnerMode,
    strategy: Arc<dyn Runner>,
    capabilities: Capabilities,
    control: Mutex<Option<ControlServer>>,
}

impl fmt::Debug for RunnerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerHandle")
            .field("mode", &self.mode)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl RunnerHandle {
    /// Wrap a strategy, probing its capabilities once.
    pub fn new(mode: RunnerMode, strategy: Arc<dyn Runner>) -> Self {
        let capabilities = strategy.capabilities();
        debug!(%mode, ?capabilities, "runner selected");
        Self {
            mode,
            strategy,
            capabilities,
            control: Mutex::new(None),
        }
    }

    /// Select the production strategy from `config.workers`.
    pub fn select(
        config: &LauncherConfig,
        listeners: &ListenerSet,
        restart_dir: &Path,
    ) -> Result<Self> {
        let mode = RunnerMode::from_workers(config.workers);
        let runner = ProcessRunner::new(mode, config, listeners, restart_dir)?;
        Ok(Self::new(mode, Arc::new(runner)))
    }

    pub fn mode(&self) -> RunnerMode {
        self.mode
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn strategy(&self) -> Arc<dyn Runner> {
        Arc::clone(&self.strategy)
    }

    pub(crate) fn attach_control(&self, server: ControlServer) {
        if let Ok(mut slot) = self.control.lock() {
            *slot = Some(server);
        }
    }

    fn take_control(&self) -> Option<ControlServer> {
        self.control.lock().ok().and_then(|mut slot| slot.take())
    }

    pub fn run(&self) -> RunnerFuture<'_, Result<()>> {
        self.strategy.run()
    }

    pub fn stop(&self) {
        self.strategy.stop();
    }

    pub fn halt(&self) {
        self.strategy.halt();
    }

    pub async fn stop_blocked(&self) -> Result<()> {
        let result = self.strategy.stop_blocked().await;
        if let Some(control) = self.take_control() {
            control.stop().await;
        }
        result
    }

    /// Stop the control plane, then let the strategy release its own
    /// auxiliary resources.
    pub async fn before_restart(&self) {
        if let Some(control) = self.take_control() {
            control.stop().await;
        }
        self.strategy.before_restart().await;
    }

    /// Phased restart if advertised and accepted by the strategy.
    pub fn phased_restart(&self) -> bool {
        self.capabilities.phased_restart && self.strategy.phased_restart()
    }

    pub fn reload_worker_directory(&self) -> bool {
        self.capabilities.reload_worker_directory && self.strategy.reload_worker_directory()
    }

    pub fn stats(&self) -> serde_json::Value {
        self.strategy.stats()
    }

    /// Startup banner.
    pub fn log_header(&self, config: &LauncherConfig) {
        info!("respawn starting in {} mode...", self.mode);
        info!("* Version {}", env!("CARGO_PKG_VERSION"));
        if let RunnerMode::Cluster { workers } = self.mode {
            info!("* Process workers: {workers}");
        }
        info!("* Environment: {}", config.environment);
        info!("* Drain timeout: {:?}", config.drain_timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        reads: AtomicUsize,
        phased_calls: AtomicUsize,
    }

    impl Runner for Counting {
        fn run(&self) -> RunnerFuture<'_, Result<()>> {
            Box::pin(async { Ok(()) })
        }
        fn stop(&self) {}
        fn stop_blocked(&self) -> RunnerFuture<'_, Result<()>> {
            Box::pin(async { Ok(()) })
        }
        fn halt(&self) {}
        fn capabilities(&self) -> Capabilities {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Capabilities::default()
        }
        fn phased_restart(&self) -> bool {
            self.phased_calls.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    #[test]
    fn mode_follows_worker_count() {
        assert_eq!(RunnerMode::from_workers(0), RunnerMode::Single);
        assert_eq!(RunnerMode::from_workers(3), RunnerMode::Cluster { workers: 3 });
        assert_eq!(RunnerMode::Single.worker_count(), 1);
        assert_eq!(RunnerMode::Cluster { workers: 3 }.to_string(), "cluster");
    }

    #[test]
    fn capabilities_are_read_once_and_gate_optional_calls() {
        let strategy = Arc::new(Counting::default());
        let handle = RunnerHandle::new(RunnerMode::Single, strategy.clone());

        assert!(!handle.phased_restart());
        assert!(!handle.phased_restart());
        assert!(!handle.reload_worker_directory());

        assert_eq!(strategy.reads.load(Ordering::SeqCst), 1);
        assert_eq!(strategy.phased_calls.load(Ordering::SeqCst), 0);
    }
}
