// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{LauncherConfig, RawLauncherConfig};
use crate::errors::{LaunchError, Result};
use crate::listeners::BindUri;

impl TryFrom<RawLauncherConfig> for LauncherConfig {
    type Error = LaunchError;

    fn try_from(raw: RawLauncherConfig) -> std::result::Result<Self, Self::Error> {
        let binds = parse_binds(&raw.binds)?;
        ensure_has_command(&raw)?;
        ensure_supported_workers(raw.workers)?;

        let drain_timeout = parse_duration(&raw.drain_timeout).map_err(|e| {
            LaunchError::ConfigError(format!("invalid drain_timeout '{}': {e}", raw.drain_timeout))
        })?;

        Ok(LauncherConfig {
            binds,
            command: raw.command,
            workers: raw.workers,
            pidfile: raw.pidfile,
            state_path: raw.state_path,
            restart_cmd: raw.restart_cmd.filter(|c| !c.trim().is_empty()),
            directory: raw.directory,
            tag: raw.tag,
            environment: raw.environment,
            drain_timeout,
            control: raw.control,
            redirect: raw.redirect,
            hooks: Default::default(),
        })
    }
}

fn parse_binds(binds: &[String]) -> Result<Vec<BindUri>> {
    binds.iter().map(|b| b.parse::<BindUri>()).collect()
}

fn ensure_has_command(raw: &RawLauncherConfig) -> Result<()> {
    if raw.command.first().is_none_or(|program| program.trim().is_empty()) {
        return Err(LaunchError::ConfigError(
            "no command configured, nothing to run".to_string(),
        ));
    }
    Ok(())
}

#[cfg(unix)]
fn ensure_supported_workers(_workers: usize) -> Result<()> {
    Ok(())
}

#[cfg(not(unix))]
fn ensure_supported_workers(workers: usize) -> Result<()> {
    if workers > 0 {
        return Err(LaunchError::UnsupportedCombination(format!(
            "workers = {workers} requires descriptor inheritance, which this platform lacks"
        )));
    }
    Ok(())
}

/// Parse `"<n><unit>"` with unit `ms`, `s`, `m` or `h`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let seconds_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };
    value
        .checked_mul(seconds_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{s}' is too large"))
}
