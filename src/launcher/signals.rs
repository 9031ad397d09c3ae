// src/launcher/signals.rs

//! Signal router: OS signals → supervisor state.
//!
//! ## Unix
//! - **SIGUSR2** → restart
//! - **SIGUSR1** → phased restart (falls back to a full restart)
//! - **SIGTERM** → graceful stop
//! - **SIGHUP** → reopen redirected stdout/stderr
//! - **SIGINT** → exit after an immediate graceful stop
//!
//! ## Other platforms
//! Only Ctrl-C is routed; the rest are reported as unavailable.
//!
//! Listener tasks only call [`SupervisorHandle`] methods, never the runner.

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::LaunchError;

use super::state::SupervisorHandle;

/// What a routed signal does to the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    Restart,
    PhasedRestart,
    Stop,
    ReopenLogs,
    Interrupt,
}

impl SignalAction {
    pub fn apply(self, handle: &SupervisorHandle) {
        match self {
            SignalAction::Restart => {
                handle.restart();
            }
            SignalAction::PhasedRestart => handle.phased_restart(),
            SignalAction::Stop => {
                handle.stop();
            }
            SignalAction::ReopenLogs => handle.reopen_logs(),
            SignalAction::Interrupt => handle.interrupt(),
        }
    }

    fn unavailable_notice(self, signal: &str) -> String {
        let feature = match self {
            SignalAction::Restart | SignalAction::PhasedRestart => "signal based restart",
            SignalAction::Stop => "signal based gracefully stopping",
            SignalAction::ReopenLogs => "signal based logs reopening",
            SignalAction::Interrupt => "interrupt handling",
        };
        format!("*** {signal} not implemented, {feature} unavailable!")
    }
}

/// Installed signal listeners; dropping the router uninstalls them.
#[derive(Debug, Default)]
pub struct SignalRouter {
    tasks: Vec<JoinHandle<()>>,
}

impl SignalRouter {
    /// Install every route this platform supports. Routes that cannot be
    /// installed are logged and skipped.
    pub fn install(handle: &SupervisorHandle) -> Self {
        let mut router = SignalRouter::default();
        router.install_platform(handle);
        router
    }

    /// Number of routes actually installed.
    pub fn installed(&self) -> usize {
        self.tasks.len()
    }

    #[cfg(unix)]
    fn install_platform(&mut self, handle: &SupervisorHandle) {
        use tokio::signal::unix::SignalKind;

        let routes = [
            ("SIGUSR2", SignalKind::user_defined2(), SignalAction::Restart),
            ("SIGUSR1", SignalKind::user_defined1(), SignalAction::PhasedRestart),
            ("SIGTERM", SignalKind::terminate(), SignalAction::Stop),
            ("SIGHUP", SignalKind::hangup(), SignalAction::ReopenLogs),
            ("SIGINT", SignalKind::interrupt(), SignalAction::Interrupt),
        ];

        for (name, kind, action) in routes {
            match tokio::signal::unix::signal(kind) {
                Ok(mut stream) => {
                    let handle = handle.clone();
                    self.tasks.push(tokio::spawn(async move {
                        while stream.recv().await.is_some() {
                            debug!(signal = name, ?action, "signal received");
                            action.apply(&handle);
                        }
                    }));
                }
                Err(e) => report_unavailable(name, action, e.to_string()),
            }
        }
    }

    #[cfg(not(unix))]
    fn install_platform(&mut self, handle: &SupervisorHandle) {
        for (name, action) in [
            ("SIGUSR2", SignalAction::Restart),
            ("SIGUSR1", SignalAction::PhasedRestart),
            ("SIGTERM", SignalAction::Stop),
            ("SIGHUP", SignalAction::ReopenLogs),
        ] {
            report_unavailable(name, action, "not supported on this platform".to_string());
        }

        let handle = handle.clone();
        self.tasks.push(tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                debug!("ctrl-c received");
                SignalAction::Interrupt.apply(&handle);
            }
        }));
    }
}

impl Drop for SignalRouter {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

fn report_unavailable(signal: &'static str, action: SignalAction, reason: String) {
    let err = LaunchError::SignalUnavailable { signal, reason };
    warn!(error = %err, "{}", action.unavailable_notice(signal));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::state::{LauncherState, Request};

    #[test]
    fn actions_map_onto_supervisor_operations() {
        let h = SupervisorHandle::new();
        SignalAction::ReopenLogs.apply(&h);
        SignalAction::PhasedRestart.apply(&h);
        assert_eq!(h.state(), LauncherState::Run);
        assert_eq!(
            h.take_pending(),
            vec![Request::PhasedRestart, Request::ReopenLogs]
        );

        SignalAction::Restart.apply(&h);
        assert_eq!(h.state(), LauncherState::Restart);
        SignalAction::Stop.apply(&h);
        assert_eq!(h.state(), LauncherState::Stop);
    }

    #[test]
    fn unavailable_notice_names_signal_and_feature() {
        assert_eq!(
            SignalAction::Restart.unavailable_notice("SIGUSR2"),
            "*** SIGUSR2 not implemented, signal based restart unavailable!"
        );
    }

    #[tokio::test]
    async fn install_registers_routes_on_unix() {
        let h = SupervisorHandle::new();
        let router = SignalRouter::install(&h);
        if cfg!(unix) {
            assert_eq!(router.installed(), 5);
        } else {
            assert_eq!(router.installed(), 1);
        }
    }
}
