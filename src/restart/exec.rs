// src/restart/exec.rs

//! Production restarter: `exec` on unix, respawn-and-exit elsewhere.

use std::process::Command;

use tracing::{error, info};

use crate::errors::{LaunchError, Result};
use crate::listeners::{ENV_PREFIX, ListenerSet, handoff};

use super::{RestartRequest, Restarter};

#[derive(Debug, Clone, Default)]
pub struct ExecRestarter;

impl ExecRestarter {
    pub fn new() -> Self {
        Self
    }

    /// Command with the handoff variables of the previous generation
    /// replaced by `request.inherit_env`.
    fn command(request: &RestartRequest) -> Command {
        let mut cmd = Command::new(&request.argv[0]);
        cmd.args(&request.argv[1..]).current_dir(&request.dir);

        for name in handoff::inherited_var_names(ENV_PREFIX) {
            cmd.env_remove(name);
        }
        cmd.envs(request.inherit_env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        cmd
    }
}

#[cfg(unix)]
impl Restarter for ExecRestarter {
    fn restart(&self, request: RestartRequest, listeners: ListenerSet) -> Result<()> {
        use std::os::unix::process::CommandExt;

        // Descriptors opened by std and tokio are close-on-exec already; only
        // the listeners are made to survive.
        for fd in &request.descriptors {
            if !crate::listeners::set_cloexec(*fd, false) {
                return Err(LaunchError::RestartFailure(format!(
                    "could not mark listener descriptor {fd} inheritable"
                )));
            }
        }

        info!(
            argv = ?request.argv,
            dir = %request.dir.display(),
            listeners = request.descriptors.len(),
            "re-executing process image"
        );

        let err = Self::command(&request).exec();

        // Only reached when exec failed; keep the listeners alive until here.
        drop(listeners);
        error!(error = %err, argv = ?request.argv, "exec failed during hot restart");
        Err(LaunchError::RestartFailure(format!(
            "exec {:?} in {}: {err}",
            request.argv[0],
            request.dir.display()
        )))
    }
}

#[cfg(not(unix))]
impl Restarter for ExecRestarter {
    fn restart(&self, request: RestartRequest, listeners: ListenerSet) -> Result<()> {
        // Without descriptor inheritance the listeners are released first and
        // the replacement binds them again.
        listeners.close();

        info!(
            argv = ?request.argv,
            dir = %request.dir.display(),
            "spawning replacement process"
        );

        let mut cmd = Self::command(&request);
        for (name, _) in &request.inherit_env {
            cmd.env_remove(name);
        }
        match cmd.spawn() {
            Ok(child) => {
                info!(pid = child.id(), "replacement process started; exiting");
                Ok(())
            }
            Err(err) => {
                error!(error = %err, argv = ?request.argv, "spawn failed during restart");
                Err(LaunchError::RestartFailure(format!(
                    "spawn {:?}: {err}",
                    request.argv[0]
                )))
            }
        }
    }
}
