// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::config::{ControlEndpointConfig, RawLauncherConfig};

/// Command-line arguments for `respawn`.
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "respawn",
    version,
    about = "Supervise a server command with signal-driven hot restarts.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML). Missing files are ignored.
    #[arg(long, value_name = "PATH", default_value = "respawn.toml")]
    pub config: String,

    /// Bind URI (tcp://host:port, ssl://host:port, unix://path). Repeatable.
    #[arg(short = 'b', long = "bind", value_name = "URI")]
    pub binds: Vec<String>,

    /// Number of worker processes (0 = single mode).
    #[arg(short = 'w', long, value_name = "N")]
    pub workers: Option<usize>,

    #[arg(long, value_name = "PATH")]
    pub pidfile: Option<String>,

    /// Where to write the state snapshot.
    #[arg(short = 'S', long = "state", value_name = "PATH")]
    pub state_path: Option<String>,

    /// Control endpoint URI (tcp://host:port or unix://path).
    #[arg(long, value_name = "URI")]
    pub control_url: Option<String>,

    /// Token required by the control endpoint ("none" disables auth).
    #[arg(long, value_name = "TOKEN")]
    pub control_token: Option<String>,

    /// Command used in place of the current executable on restart.
    #[arg(short = 'R', long, value_name = "CMD")]
    pub restart_cmd: Option<String>,

    /// Working directory for the server command.
    #[arg(long = "dir", value_name = "PATH")]
    pub directory: Option<String>,

    /// Additional text shown in the process title.
    #[arg(long, value_name = "TAG")]
    pub tag: Option<String>,

    #[arg(short = 'e', long, value_name = "NAME")]
    pub environment: Option<String>,

    /// Graceful stop timeout, e.g. 30s or 500ms.
    #[arg(long, value_name = "DURATION")]
    pub drain_timeout: Option<String>,

    #[arg(long, value_name = "PATH")]
    pub redirect_stdout: Option<String>,

    #[arg(long, value_name = "PATH")]
    pub redirect_stderr: Option<String>,

    /// Append to redirect targets instead of truncating them.
    #[arg(long)]
    pub redirect_append: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `RESPAWN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the resolved configuration, run nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Server command and its arguments.
    #[arg(trailing_var_arg = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl CliArgs {
    /// Overlay the flags that were given on top of file values.
    pub fn apply_to(&self, raw: &mut RawLauncherConfig) {
        if !self.binds.is_empty() {
            raw.binds = self.binds.clone();
        }
        if !self.command.is_empty() {
            raw.command = self.command.clone();
        }
        if let Some(w) = self.workers {
            raw.workers = w;
        }
        if let Some(p) = &self.pidfile {
            raw.pidfile = Some(p.into());
        }
        if let Some(p) = &self.state_path {
            raw.state_path = Some(p.into());
        }
        if let Some(cmd) = &self.restart_cmd {
            raw.restart_cmd = Some(cmd.clone());
        }
        if let Some(d) = &self.directory {
            raw.directory = Some(d.into());
        }
        if let Some(t) = &self.tag {
            raw.tag = Some(t.clone());
        }
        if let Some(e) = &self.environment {
            raw.environment = e.clone();
        }
        if let Some(d) = &self.drain_timeout {
            raw.drain_timeout = d.clone();
        }

        if let Some(url) = &self.control_url {
            let auth_token = raw.control.take().and_then(|c| c.auth_token);
            raw.control = Some(ControlEndpointConfig {
                url: url.clone(),
                auth_token,
            });
        }
        if let (Some(token), Some(control)) = (&self.control_token, raw.control.as_mut()) {
            control.auth_token = Some(token.clone());
        }

        if let Some(p) = &self.redirect_stdout {
            raw.redirect.stdout = Some(p.into());
        }
        if let Some(p) = &self.redirect_stderr {
            raw.redirect.stderr = Some(p.into());
        }
        if self.redirect_append {
            raw.redirect.append = true;
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
