// src/persist/state_file.rs

//! State snapshot: pid plus the serialisable part of the configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LauncherConfig;
use crate::errors::{LaunchError, Result};

#[derive(Debug, Serialize)]
struct Snapshot<'a> {
    pid: u32,
    config: &'a LauncherConfig,
}

/// What a control client reads back from the state file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StateRecord {
    pub pid: u32,
    #[serde(default)]
    pub config: toml::Table,
}

pub fn write_state(path: &Path, pid: u32, config: &LauncherConfig) -> Result<()> {
    let doc = toml::to_string(&Snapshot { pid, config })
        .map_err(|e| LaunchError::persistence("state", path, e))?;
    fs::write(path, doc).map_err(|e| LaunchError::persistence("state", path, e))?;
    debug!(path = %path.display(), pid, "state file written");
    Ok(())
}

pub fn read_state(path: &Path) -> Result<StateRecord> {
    let text = fs::read_to_string(path)?;
    Ok(toml::from_str(&text)?)
}
