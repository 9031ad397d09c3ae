// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{LauncherConfig, RawLauncherConfig};
use crate::errors::Result;

/// Load a configuration file and return the raw model.
///
/// This only performs TOML deserialization; use [`load_and_validate`] to get
/// a [`LauncherConfig`].
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawLauncherConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawLauncherConfig = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<LauncherConfig> {
    let raw_config = load_from_path(&path)?;
    let config = LauncherConfig::try_from(raw_config)?;
    Ok(config)
}

/// Load `path` if it exists; a missing file yields an empty raw model so
/// everything can come from the command line.
pub fn load_or_default(path: impl AsRef<Path>) -> Result<RawLauncherConfig> {
    let path = path.as_ref();
    if !path.exists() {
        debug!(path = %path.display(), "no config file; using defaults");
        return Ok(RawLauncherConfig::default());
    }
    load_from_path(path)
}

/// `respawn.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("respawn.toml")
}
