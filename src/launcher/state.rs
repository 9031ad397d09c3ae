// src/launcher/state.rs

//! Shared supervisor state.
//!
//! A [`SupervisorHandle`] is the only thing signal listeners and the control
//! plane hold. Every method is non-blocking: it stores into atomics and wakes
//! the main flow through a [`Notify`]. The main flow is the one that acts on
//! the state (calling into the runner, restarting, etc).

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::Notify;

/// What the process should be doing now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LauncherState {
    Run = 0,
    Stop = 1,
    Restart = 2,
    Halt = 3,
    Exit = 4,
}

impl LauncherState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => LauncherState::Run,
            1 => LauncherState::Stop,
            2 => LauncherState::Restart,
            3 => LauncherState::Halt,
            _ => LauncherState::Exit,
        }
    }

    /// Whether moving from `self` to `next` is allowed.
    ///
    /// Nothing moves back to `Run`; `Halt` and `Exit` are only left towards
    /// `Exit`; a requested restart can still be turned into a stop or halt.
    pub fn can_transition_to(self, next: LauncherState) -> bool {
        use LauncherState::*;
        match (self, next) {
            (_, Run) => false,
            (Run, _) => true,
            (Restart, Stop | Halt | Exit) => true,
            (Stop, Halt | Exit) => true,
            (Halt, Exit) => true,
            _ => false,
        }
    }
}

impl fmt::Display for LauncherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LauncherState::Run => "run",
            LauncherState::Stop => "stop",
            LauncherState::Restart => "restart",
            LauncherState::Halt => "halt",
            LauncherState::Exit => "exit",
        };
        f.write_str(s)
    }
}

/// One-shot requests that are not a state of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    PhasedRestart,
    ReopenLogs,
    ReloadWorkerDirectory,
    Interrupt,
}

impl Request {
    const ALL: [Request; 4] = [
        Request::PhasedRestart,
        Request::ReopenLogs,
        Request::ReloadWorkerDirectory,
        Request::Interrupt,
    ];

    fn bit(self) -> u8 {
        match self {
            Request::PhasedRestart => 1 << 0,
            Request::ReopenLogs => 1 << 1,
            Request::ReloadWorkerDirectory => 1 << 2,
            Request::Interrupt => 1 << 3,
        }
    }
}

#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    pending: AtomicU8,
    notify: Notify,
}

/// Cloneable handle onto the supervisor state.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    shared: Arc<Shared>,
}

impl Default for SupervisorHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl SupervisorHandle {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: AtomicU8::new(LauncherState::Run as u8),
                pending: AtomicU8::new(0),
                notify: Notify::new(),
            }),
        }
    }

    pub fn state(&self) -> LauncherState {
        LauncherState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// Move to `next` if allowed; returns whether the state changed.
    pub fn transition(&self, next: LauncherState) -> bool {
        let result = self
            .shared
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                LauncherState::from_u8(cur)
                    .can_transition_to(next)
                    .then_some(next as u8)
            });
        if result.is_ok() {
            self.shared.notify.notify_one();
        }
        result.is_ok()
    }

    pub fn stop(&self) -> bool {
        self.transition(LauncherState::Stop)
    }

    pub fn restart(&self) -> bool {
        self.transition(LauncherState::Restart)
    }

    pub fn halt(&self) -> bool {
        self.transition(LauncherState::Halt)
    }

    pub fn phased_restart(&self) {
        self.post(Request::PhasedRestart);
    }

    pub fn reopen_logs(&self) {
        self.post(Request::ReopenLogs);
    }

    pub fn reload_worker_directory(&self) {
        self.post(Request::ReloadWorkerDirectory);
    }

    pub fn interrupt(&self) {
        self.post(Request::Interrupt);
    }

    pub fn post(&self, request: Request) {
        self.shared.pending.fetch_or(request.bit(), Ordering::AcqRel);
        self.shared.notify.notify_one();
    }

    /// Take every pending request, in a fixed order.
    pub fn take_pending(&self) -> Vec<Request> {
        let bits = self.shared.pending.swap(0, Ordering::AcqRel);
        Request::ALL
            .into_iter()
            .filter(|r| bits & r.bit() != 0)
            .collect()
    }

    /// Wait until something was posted or the state changed.
    ///
    /// A notification sent while nobody waits is kept, so a wake-up is never
    /// lost between two calls.
    pub async fn notified(&self) {
        self.shared.notify.notified().await;
    }
}
