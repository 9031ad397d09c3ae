// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Configuration-shape problems (`UnsupportedCombination`, `ConfigError`,
//! `InvalidBind`) are returned from setup and abort startup. The runtime
//! variants (`SignalUnavailable`, `ControlEndpointMisconfigured`,
//! `PersistenceFailure`, `AuthenticationFailure`) are constructed so they can
//! be logged with a consistent message, but the launcher never propagates
//! them out of its main flow. `RestartFailure` is fatal.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Unsupported combination: {0}")]
    UnsupportedCombination(String),

    #[error("Signal unavailable: {signal} ({reason})")]
    SignalUnavailable { signal: &'static str, reason: String },

    #[error("Invalid control URI: {0}")]
    ControlEndpointMisconfigured(String),

    #[error("Restart failed: {0}")]
    RestartFailure(String),

    #[error("Could not persist {what} to {path}: {reason}")]
    PersistenceFailure {
        what: &'static str,
        path: String,
        reason: String,
    },

    #[error("Invalid auth token")]
    AuthenticationFailure,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid bind URI '{uri}': {reason}")]
    InvalidBind { uri: String, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LaunchError {
    pub fn persistence(
        what: &'static str,
        path: &std::path::Path,
        reason: impl std::fmt::Display,
    ) -> Self {
        LaunchError::PersistenceFailure {
            what,
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, LaunchError>;
