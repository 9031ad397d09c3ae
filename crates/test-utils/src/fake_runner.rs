use std::sync::{Arc, Mutex};

use respawn::errors::Result;
use respawn::runner::{Capabilities, Runner, RunnerFuture};
use tokio::sync::watch;

/// Shared, ordered record of calls made on the fakes.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, call: impl Into<String>) {
        self.0.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    pub fn position(&self, call: &str) -> Option<usize> {
        self.0.lock().unwrap().iter().position(|c| c == call)
    }
}

/// A fake runner that:
/// - records every call in a [`CallLog`]
/// - keeps `run` pending until `stop`, `stop_blocked` or `halt` is called.
pub struct FakeRunner {
    log: CallLog,
    capabilities: Capabilities,
    accept_phased: bool,
    released: watch::Sender<bool>,
}

impl FakeRunner {
    pub fn new(log: CallLog) -> Self {
        let (released, _) = watch::channel(false);
        Self {
            log,
            capabilities: Capabilities::default(),
            accept_phased: true,
            released,
        }
    }

    /// Advertise both optional capabilities.
    pub fn clustered(mut self) -> Self {
        self.capabilities = Capabilities {
            phased_restart: true,
            reload_worker_directory: true,
        };
        self
    }

    /// Advertise phased restart but refuse it when asked.
    pub fn refusing_phased(mut self) -> Self {
        self.capabilities.phased_restart = true;
        self.accept_phased = false;
        self
    }

    fn release(&self) {
        self.released.send_replace(true);
    }
}

impl Runner for FakeRunner {
    fn run(&self) -> RunnerFuture<'_, Result<()>> {
        self.log.push("run");
        let mut released = self.released.subscribe();
        Box::pin(async move {
            let _ = released.wait_for(|r| *r).await;
            self.log.push("run returned");
            Ok(())
        })
    }

    fn stop(&self) {
        self.log.push("stop");
        self.release();
    }

    fn stop_blocked(&self) -> RunnerFuture<'_, Result<()>> {
        self.log.push("stop_blocked");
        self.release();
        Box::pin(async { Ok(()) })
    }

    fn halt(&self) {
        self.log.push("halt");
        self.release();
    }

    fn before_restart(&self) -> RunnerFuture<'_, ()> {
        self.log.push("before_restart");
        Box::pin(async {})
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn phased_restart(&self) -> bool {
        self.log.push("phased_restart");
        self.accept_phased
    }

    fn reload_worker_directory(&self) -> bool {
        self.log.push("reload_worker_directory");
        true
    }
}
