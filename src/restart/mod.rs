// src/restart/mod.rs

//! Hot restart: re-executing the process image while keeping listeners.
//!
//! - [`plan`] captures the original invocation at startup.
//! - [`exec`] provides [`ExecRestarter`], the production [`Restarter`].
//!
//! The launcher talks to a [`Restarter`] rather than calling `exec` directly,
//! so tests can observe the restart sequence without replacing the test
//! process.

pub mod exec;
pub mod plan;

use std::ffi::OsString;
use std::path::PathBuf;

use crate::errors::{LaunchError, Result};
use crate::listeners::{ListenerSet, RawDescriptor};

pub use exec::ExecRestarter;
pub use plan::{RestartPlan, resolve_restart_dir};

/// Fully resolved restart: what to exec, where, and which descriptors and
/// handoff variables to pass along.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartRequest {
    pub argv: Vec<OsString>,
    pub dir: PathBuf,
    pub inherit_env: Vec<(String, String)>,
    pub descriptors: Vec<RawDescriptor>,
}

impl RestartRequest {
    /// Resolve the plan against the live listener set.
    pub fn prepare(
        plan: &RestartPlan,
        restart_cmd: Option<&str>,
        listeners: &ListenerSet,
    ) -> Result<Self> {
        let argv = plan.restart_argv(restart_cmd);
        if argv.is_empty() {
            return Err(LaunchError::RestartFailure(
                "restart command resolved to an empty argument vector".to_string(),
            ));
        }

        Ok(Self {
            argv,
            dir: plan.restart_dir().to_path_buf(),
            inherit_env: listeners.handoff_env(),
            descriptors: listeners.raw_descriptors(),
        })
    }
}

/// Replaces the running process with a fresh image.
pub trait Restarter: Send + Sync {
    /// Export descriptors and re-execute.
    ///
    /// On exec platforms a successful call never returns. `Ok(())` is only
    /// returned where a replacement process was spawned instead, in which
    /// case the caller must exit normally. Any error is a `RestartFailure`.
    fn restart(&self, request: RestartRequest, listeners: ListenerSet) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listeners::BindUri;

    #[test]
    fn prepare_carries_listener_handoff() {
        let uris: Vec<BindUri> = vec!["tcp://127.0.0.1:0".parse().unwrap()];
        let listeners = ListenerSet::bind(&uris, Vec::new()).unwrap();
        let plan = RestartPlan::new(
            "respawn",
            Vec::new(),
            vec![OsString::from("-b"), OsString::from("tcp://127.0.0.1:0")],
            "/srv/app",
        );

        let req = RestartRequest::prepare(&plan, None, &listeners).unwrap();
        assert_eq!(req.argv.len(), 3);
        assert_eq!(req.dir, PathBuf::from("/srv/app"));
        assert_eq!(req.descriptors, listeners.raw_descriptors());
        assert_eq!(req.inherit_env, listeners.handoff_env());
    }

    #[test]
    fn prepare_without_listeners_still_restarts() {
        let plan = RestartPlan::new("respawn", Vec::new(), Vec::new(), "/");
        let req = RestartRequest::prepare(&plan, None, &ListenerSet::empty()).unwrap();
        assert_eq!(req.argv, vec![OsString::from("respawn")]);
        assert!(req.inherit_env.is_empty());
        assert!(req.descriptors.is_empty());
    }
}
