use std::sync::{Arc, Mutex};

use respawn::errors::{LaunchError, Result};
use respawn::listeners::ListenerSet;
use respawn::restart::{RestartRequest, Restarter};

use crate::fake_runner::CallLog;

/// A fake restarter that records the request instead of exec'ing.
#[derive(Clone)]
pub struct FakeRestarter {
    log: CallLog,
    succeed: bool,
    requests: Arc<Mutex<Vec<RestartRequest>>>,
}

impl FakeRestarter {
    /// Behaves like a failed exec.
    pub fn failing(log: CallLog) -> Self {
        Self {
            log,
            succeed: false,
            requests: Arc::default(),
        }
    }

    /// Behaves like a spawned replacement process.
    pub fn respawning(log: CallLog) -> Self {
        Self {
            log,
            succeed: true,
            requests: Arc::default(),
        }
    }

    pub fn requests(&self) -> Vec<RestartRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Restarter for FakeRestarter {
    fn restart(&self, request: RestartRequest, listeners: ListenerSet) -> Result<()> {
        self.log.push("export");
        self.requests.lock().unwrap().push(request);
        drop(listeners);
        if self.succeed {
            Ok(())
        } else {
            Err(LaunchError::RestartFailure("fake exec failure".to_string()))
        }
    }
}
