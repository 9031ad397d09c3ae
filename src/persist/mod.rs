// src/persist/mod.rs

//! Pidfile and state snapshot. Both are best-effort: a failure is logged and
//! startup continues.

pub mod pidfile;
pub mod state_file;

use tracing::warn;

use crate::config::LauncherConfig;

pub use pidfile::{PidRecord, read_pid, write_pid};
pub use state_file::{StateRecord, read_state, write_state};

/// Write whatever the configuration asks for, logging failures.
pub fn persist(config: &LauncherConfig) -> Option<PidRecord> {
    let record = config
        .pidfile
        .as_ref()
        .and_then(|path| match write_pid(path) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "pidfile not written");
                None
            }
        });

    if let Some(path) = &config.state_path {
        if let Err(e) = write_state(path, std::process::id(), config) {
            warn!(error = %e, "state file not written");
        }
    }

    record
}
