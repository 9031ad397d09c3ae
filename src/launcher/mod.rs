// src/launcher/mod.rs

//! Launcher: owns the process lifecycle.
//!
//! - [`state`] holds the shared [`SupervisorHandle`] that signals and the
//!   control plane post into.
//! - [`signals`] routes OS signals onto that handle.
//!
//! [`Launcher::run`] is the main flow. It is the only place that calls into
//! the runner, restarts, or touches the listeners; everything else only
//! records what it wants in the supervisor state.

pub mod signals;
pub mod state;

use tracing::{debug, info, warn};

use crate::config::LauncherConfig;
use crate::control;
use crate::errors::Result;
use crate::listeners::ListenerSet;
use crate::persist::{self, PidRecord};
use crate::redirect::IoRedirect;
use crate::restart::{ExecRestarter, RestartPlan, RestartRequest, Restarter};
use crate::runner::RunnerHandle;

pub use signals::{SignalAction, SignalRouter};
pub use state::{LauncherState, Request, SupervisorHandle};

/// How [`Launcher::run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    Stopped,
    Halted,
    Exited,
    /// A replacement process was started and this one should exit normally.
    Respawned,
}

pub struct Launcher {
    config: LauncherConfig,
    listeners: Option<ListenerSet>,
    runner: RunnerHandle,
    plan: RestartPlan,
    restarter: Box<dyn Restarter>,
    supervisor: SupervisorHandle,
    redirect: IoRedirect,
    install_signals: bool,
}

impl Launcher {
    pub fn new(
        config: LauncherConfig,
        listeners: ListenerSet,
        runner: RunnerHandle,
        plan: RestartPlan,
    ) -> Self {
        let redirect = IoRedirect::from(&config.redirect);
        Self {
            config,
            listeners: Some(listeners),
            runner,
            plan,
            restarter: Box::new(ExecRestarter::new()),
            supervisor: SupervisorHandle::new(),
            redirect,
            install_signals: true,
        }
    }

    pub fn with_restarter(mut self, restarter: impl Restarter + 'static) -> Self {
        self.restarter = Box::new(restarter);
        self
    }

    /// Leave OS signals alone (tests drive the handle directly).
    pub fn without_signal_handlers(mut self) -> Self {
        self.install_signals = false;
        self
    }

    pub fn handle(&self) -> SupervisorHandle {
        self.supervisor.clone()
    }

    pub fn state(&self) -> LauncherState {
        self.supervisor.state()
    }

    pub fn stop(&self) -> bool {
        self.supervisor.stop()
    }

    pub fn restart(&self) -> bool {
        self.supervisor.restart()
    }

    pub fn halt(&self) -> bool {
        self.supervisor.halt()
    }

    /// `respawn <version> (<binds>) [<tag>]`
    pub fn title(&self) -> String {
        let mut title = format!(
            "respawn {} ({})",
            env!("CARGO_PKG_VERSION"),
            self.config.bind_strings().join(",")
        );
        if let Some(tag) = self.config.tag.as_deref().filter(|t| !t.is_empty()) {
            title.push_str(&format!(" [{tag}]"));
        }
        title
    }

    pub async fn run(mut self) -> Result<LaunchOutcome> {
        let _signals = self
            .install_signals
            .then(|| SignalRouter::install(&self.supervisor));
        set_process_title(&self.title());

        if self.redirect.is_enabled() {
            if let Err(e) = self.redirect.apply() {
                warn!(error = %e, "output redirection failed; keeping current stdout/stderr");
            }
        }
        let pid_record = persist::persist(&self.config);
        self.runner.log_header(&self.config);
        self.boot_control().await;

        let run_result = self.supervise().await;
        let state = self.supervisor.state();
        debug!(%state, "runner returned");

        match state {
            LauncherState::Halt => {
                info!("* Stopping immediately!");
                run_result.map(|_| LaunchOutcome::Halted)
            }
            LauncherState::Run | LauncherState::Stop => {
                let stopped = self.graceful_stop().await;
                self.close_listeners();
                run_result.and(stopped).map(|_| LaunchOutcome::Stopped)
            }
            LauncherState::Restart => {
                info!("* Restarting...");
                self.runner.before_restart().await;
                self.hot_restart(pid_record)
            }
            LauncherState::Exit => {
                self.close_listeners();
                run_result.map(|_| LaunchOutcome::Exited)
            }
        }
    }

    /// Drive the runner's `run` until it returns, applying supervisor
    /// changes as they are posted.
    async fn supervise(&self) -> Result<()> {
        let mut run = self.runner.run();
        let mut applied = LauncherState::Run;

        if self.on_wakeup(&mut applied) {
            return self.interrupt(run).await;
        }

        loop {
            tokio::select! {
                result = &mut run => return result,
                _ = self.supervisor.notified() => {
                    if self.on_wakeup(&mut applied) {
                        return self.interrupt(run).await;
                    }
                }
            }
        }
    }

    /// Handle pending requests, then apply the current state to the runner
    /// (once per state). Returns whether an interrupt asked to exit.
    fn on_wakeup(&self, applied: &mut LauncherState) -> bool {
        let mut interrupted = false;

        for request in self.supervisor.take_pending() {
            match request {
                Request::PhasedRestart => self.phased_restart(),
                Request::ReopenLogs => self.reopen_logs(),
                Request::ReloadWorkerDirectory => {
                    if !self.runner.reload_worker_directory() {
                        warn!("* reload-worker-directory called but not available in this mode");
                    }
                }
                Request::Interrupt => {
                    interrupted = self.supervisor.state() != LauncherState::Halt
                        && self.supervisor.transition(LauncherState::Exit);
                }
            }
        }

        let state = self.supervisor.state();
        if state != *applied {
            debug!(from = %applied, to = %state, "applying state");
            match state {
                LauncherState::Stop | LauncherState::Restart
                    if !matches!(*applied, LauncherState::Stop | LauncherState::Restart) =>
                {
                    self.runner.stop();
                }
                LauncherState::Halt => self.runner.halt(),
                _ => {}
            }
            *applied = state;
        }

        interrupted
    }

    fn phased_restart(&self) {
        if self.supervisor.state() != LauncherState::Run {
            debug!("phased restart ignored; already leaving run state");
            return;
        }
        if !self.runner.phased_restart() {
            info!("* phased-restart called but not available, restarting normally.");
            self.supervisor.restart();
        }
    }

    fn reopen_logs(&self) {
        if !self.redirect.is_enabled() {
            debug!("reopen-logs requested without redirect targets");
            return;
        }
        info!("- Reopening log files");
        if let Err(e) = self.redirect.apply() {
            warn!(error = %e, "reopening log files failed");
        }
    }

    /// Exit requested: stop gracefully right away while `run` finishes.
    async fn interrupt(&self, run: crate::runner::RunnerFuture<'_, Result<()>>) -> Result<()> {
        info!("- Interrupted, stopping");
        let (result, stopped) = tokio::join!(run, self.graceful_stop());
        result.and(stopped)
    }

    async fn graceful_stop(&self) -> Result<()> {
        let result = self.runner.stop_blocked().await;
        info!(
            "=== respawn shutdown: {} ===",
            chrono::Local::now().to_rfc3339()
        );
        info!("- Goodbye!");
        result
    }

    fn close_listeners(&mut self) {
        if let Some(listeners) = self.listeners.take() {
            listeners.close();
        }
    }

    fn hot_restart(&mut self, pid_record: Option<PidRecord>) -> Result<LaunchOutcome> {
        self.config.hooks.run_on_restart();

        let listeners = self.listeners.take().unwrap_or_default();
        let request = RestartRequest::prepare(
            &self.plan,
            self.config.restart_cmd.as_deref(),
            &listeners,
        )?;
        self.restarter.restart(request, listeners)?;

        // Only reached where the replacement was spawned rather than exec'd.
        if let Some(record) = pid_record {
            record.release();
        }
        Ok(LaunchOutcome::Respawned)
    }

    async fn boot_control(&self) {
        let Some(endpoint) = &self.config.control else {
            return;
        };
        match control::start_control(endpoint, self.supervisor.clone(), self.runner.strategy())
            .await
        {
            Ok(server) => self.runner.attach_control(server),
            Err(e) => warn!(error = %e, "control server not started"),
        }
    }
}

#[cfg(target_os = "linux")]
fn set_process_title(title: &str) {
    // The kernel keeps at most 15 bytes of the name.
    let short: String = title.chars().take(15).collect();
    match std::ffi::CString::new(short) {
        Ok(name) => {
            if let Err(e) = nix::sys::prctl::set_name(&name) {
                debug!(error = %e, "could not set process name");
            }
        }
        Err(e) => debug!(error = %e, "process title contains NUL"),
    }
    debug!(%title, "process title");
}

#[cfg(not(target_os = "linux"))]
fn set_process_title(title: &str) {
    debug!(%title, "process title");
}
