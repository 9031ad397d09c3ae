#![allow(dead_code)]

use respawn::config::{ControlEndpointConfig, LauncherConfig, RawLauncherConfig};

/// Builder for `LauncherConfig` to simplify test setup.
///
/// Starts from a config that validates: no binds and a `true` command.
pub struct LauncherConfigBuilder {
    raw: RawLauncherConfig,
    hooks: Vec<Box<dyn Fn() + Send + Sync>>,
}

impl LauncherConfigBuilder {
    pub fn new() -> Self {
        Self {
            raw: RawLauncherConfig {
                command: vec!["true".to_string()],
                ..RawLauncherConfig::default()
            },
            hooks: Vec::new(),
        }
    }

    pub fn bind(mut self, uri: &str) -> Self {
        self.raw.binds.push(uri.to_string());
        self
    }

    pub fn command(mut self, argv: &[&str]) -> Self {
        self.raw.command = argv.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.raw.workers = n;
        self
    }

    pub fn pidfile(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.raw.pidfile = Some(path.into());
        self
    }

    pub fn state_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.raw.state_path = Some(path.into());
        self
    }

    pub fn control(mut self, url: &str, token: Option<&str>) -> Self {
        self.raw.control = Some(ControlEndpointConfig {
            url: url.to_string(),
            auth_token: token.map(str::to_string),
        });
        self
    }

    pub fn restart_cmd(mut self, cmd: &str) -> Self {
        self.raw.restart_cmd = Some(cmd.to_string());
        self
    }

    pub fn directory(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.raw.directory = Some(dir.into());
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.raw.tag = Some(tag.to_string());
        self
    }

    pub fn drain_timeout(mut self, d: &str) -> Self {
        self.raw.drain_timeout = d.to_string();
        self
    }

    pub fn on_restart(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    pub fn raw(&self) -> &RawLauncherConfig {
        &self.raw
    }

    pub fn build(self) -> LauncherConfig {
        let mut config =
            LauncherConfig::try_from(self.raw).expect("Failed to build valid config from builder");
        for hook in self.hooks {
            config.hooks.on_restart(hook);
        }
        config
    }
}

impl Default for LauncherConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
