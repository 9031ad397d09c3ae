// src/config/model.rs

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};

use crate::listeners::BindUri;

/// Configuration as read from a TOML file (and overridden by the CLI).
///
/// ```toml
/// binds = ["tcp://0.0.0.0:9292", "unix:///run/app.sock"]
/// command = ["./bin/server", "--port-from-env"]
/// workers = 2
/// pidfile = "tmp/respawn.pid"
/// state_path = "tmp/respawn.state"
/// drain_timeout = "30s"
///
/// [control]
/// url = "tcp://127.0.0.1:9293"
/// auth_token = "secret"
///
/// [redirect]
/// stdout = "log/stdout.log"
/// append = true
/// ```
///
/// Every field is optional here; [`LauncherConfig`] is the validated form.
#[derive(Debug, Clone, Deserialize)]
pub struct RawLauncherConfig {
    #[serde(default)]
    pub binds: Vec<String>,

    /// Server command and its arguments, run once per worker.
    #[serde(default)]
    pub command: Vec<String>,

    /// `0` runs a single copy; anything above runs that many workers.
    #[serde(default)]
    pub workers: usize,

    #[serde(default)]
    pub pidfile: Option<PathBuf>,

    #[serde(default)]
    pub state_path: Option<PathBuf>,

    /// Replaces the interpreter part of the restart command line.
    #[serde(default)]
    pub restart_cmd: Option<String>,

    /// Working directory for the workers (defaults to the launch directory).
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Shown in the process title.
    #[serde(default)]
    pub tag: Option<String>,

    #[serde(default = "default_environment")]
    pub environment: String,

    /// How long a graceful stop waits for workers, e.g. `"500ms"`, `"30s"`.
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout: String,

    #[serde(default)]
    pub control: Option<ControlEndpointConfig>,

    #[serde(default)]
    pub redirect: RedirectConfig,
}

impl Default for RawLauncherConfig {
    fn default() -> Self {
        Self {
            binds: Vec::new(),
            command: Vec::new(),
            workers: 0,
            pidfile: None,
            state_path: None,
            restart_cmd: None,
            directory: None,
            tag: None,
            environment: default_environment(),
            drain_timeout: default_drain_timeout(),
            control: None,
            redirect: RedirectConfig::default(),
        }
    }
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_drain_timeout() -> String {
    "30s".to_string()
}

/// `[control]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ControlEndpointConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

/// `[redirect]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RedirectConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<PathBuf>,
    #[serde(default)]
    pub append: bool,
}

impl RedirectConfig {
    pub fn is_enabled(&self) -> bool {
        self.stdout.is_some() || self.stderr.is_some()
    }
}

pub type RestartHook = Arc<dyn Fn() + Send + Sync>;

/// Callbacks registered in code; never serialised.
#[derive(Clone, Default)]
pub struct Hooks {
    on_restart: Vec<RestartHook>,
}

impl Hooks {
    pub fn on_restart(&mut self, hook: impl Fn() + Send + Sync + 'static) {
        self.on_restart.push(Arc::new(hook));
    }

    pub fn run_on_restart(&self) {
        for hook in &self.on_restart {
            hook();
        }
    }

    pub fn len(&self) -> usize {
        self.on_restart.len()
    }

    pub fn is_empty(&self) -> bool {
        self.on_restart.is_empty()
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("on_restart", &self.on_restart.len())
            .finish()
    }
}

/// Validated configuration.
///
/// Serialises into the `[config]` table of the state file; `hooks` is
/// skipped.
#[derive(Debug, Clone, Serialize)]
pub struct LauncherConfig {
    pub binds: Vec<BindUri>,
    pub command: Vec<String>,
    pub workers: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pidfile: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_cmd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    pub environment: String,
    #[serde(serialize_with = "serialize_duration")]
    pub drain_timeout: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control: Option<ControlEndpointConfig>,
    pub redirect: RedirectConfig,
    #[serde(skip)]
    pub hooks: Hooks,
}

fn serialize_duration<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    let ms = d.as_millis();
    if ms % 1000 == 0 {
        s.serialize_str(&format!("{}s", ms / 1000))
    } else {
        s.serialize_str(&format!("{ms}ms"))
    }
}

impl LauncherConfig {
    /// Bind URIs as display strings.
    pub fn bind_strings(&self) -> Vec<String> {
        self.binds.iter().map(ToString::to_string).collect()
    }
}
