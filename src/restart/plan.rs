// src/restart/plan.rs

//! Restart plan: the original invocation, captured once at startup.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::{LaunchError, Result};

/// Everything needed to re-execute the current process image with its
/// original arguments.
///
/// For a native binary the interpreter is `argv[0]` exactly as invoked, so a
/// symlinked deployment path resolves to whatever binary it points at on
/// restart, and there are no interpreter flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartPlan {
    interpreter: OsString,
    interpreter_flags: Vec<OsString>,
    original_argv: Vec<OsString>,
    restart_dir: PathBuf,
}

impl RestartPlan {
    pub fn new(
        interpreter: impl Into<OsString>,
        interpreter_flags: Vec<OsString>,
        original_argv: Vec<OsString>,
        restart_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            interpreter: interpreter.into(),
            interpreter_flags,
            original_argv,
            restart_dir: restart_dir.into(),
        }
    }

    /// Capture the running process's invocation and restart directory.
    pub fn capture() -> Result<Self> {
        let cwd = std::env::current_dir()?;
        let env_pwd = std::env::var_os("PWD").map(PathBuf::from);
        let dir = resolve_restart_dir(env_pwd.as_deref(), &cwd);
        Self::from_invocation(std::env::args_os(), dir)
    }

    /// Build a plan from a native invocation (`argv[0]` followed by its
    /// arguments).
    pub fn from_invocation(
        args: impl IntoIterator<Item = OsString>,
        restart_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let mut args = args.into_iter();
        let program = args.next().ok_or_else(|| {
            LaunchError::ConfigError("cannot plan restarts without argv[0]".to_string())
        })?;
        Ok(Self::new(program, Vec::new(), args.collect(), restart_dir))
    }

    pub fn interpreter(&self) -> &OsStr {
        &self.interpreter
    }

    pub fn original_argv(&self) -> &[OsString] {
        &self.original_argv
    }

    pub fn restart_dir(&self) -> &Path {
        &self.restart_dir
    }

    /// `[interpreter, flags..., original argv...]`.
    pub fn argv(&self) -> Vec<OsString> {
        std::iter::once(self.interpreter.clone())
            .chain(self.interpreter_flags.iter().cloned())
            .chain(self.original_argv.iter().cloned())
            .collect()
    }

    /// The argument vector to exec, honouring an explicit restart command.
    ///
    /// A configured command replaces interpreter and flags; the original
    /// arguments are always appended.
    pub fn restart_argv(&self, restart_cmd: Option<&str>) -> Vec<OsString> {
        match restart_cmd.map(str::trim).filter(|c| !c.is_empty()) {
            Some(cmd) => cmd
                .split(' ')
                .filter(|part| !part.is_empty())
                .map(OsString::from)
                .chain(self.original_argv.iter().cloned())
                .collect(),
            None => self.argv(),
        }
    }
}

/// Pick the directory to `chdir` into before re-exec.
///
/// `$PWD` wins when it names the same directory as the real working
/// directory (it keeps unresolved symlinks such as `/srv/app/current`);
/// otherwise the real working directory is used.
pub fn resolve_restart_dir(env_pwd: Option<&Path>, cwd: &Path) -> PathBuf {
    if let Some(pwd) = env_pwd {
        if same_directory(pwd, cwd) {
            return pwd.to_path_buf();
        }
        debug!(
            pwd = %pwd.display(),
            cwd = %cwd.display(),
            "$PWD does not match working directory; using working directory"
        );
    }
    cwd.to_path_buf()
}

#[cfg(unix)]
fn same_directory(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (std::fs::metadata(a), std::fs::metadata(b)) {
        (Ok(ma), Ok(mb)) => ma.ino() == mb.ino() && ma.dev() == mb.dev(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_directory(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(ca), Ok(cb)) => ca == cb,
        _ => false,
    }
}
