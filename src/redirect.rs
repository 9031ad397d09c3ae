// src/redirect.rs

//! Redirect stdout/stderr to files; reapplied on the hangup signal so
//! rotated log files are picked up.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info};

use crate::config::RedirectConfig;
use crate::errors::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IoRedirect {
    pub stdout: Option<PathBuf>,
    pub stderr: Option<PathBuf>,
    pub append: bool,
}

impl From<&RedirectConfig> for IoRedirect {
    fn from(cfg: &RedirectConfig) -> Self {
        Self {
            stdout: cfg.stdout.clone(),
            stderr: cfg.stderr.clone(),
            append: cfg.append,
        }
    }
}

impl IoRedirect {
    pub fn is_enabled(&self) -> bool {
        self.stdout.is_some() || self.stderr.is_some()
    }

    /// Open the targets and point fd 1 / fd 2 at them.
    pub fn apply(&self) -> Result<()> {
        if let Some(path) = &self.stdout {
            let file = self.open(path)?;
            redirect_fd(&file, 1).with_context(|| format!("redirecting stdout to {}", path.display()))?;
            info!(path = %path.display(), "stdout redirected");
        }
        if let Some(path) = &self.stderr {
            let file = self.open(path)?;
            redirect_fd(&file, 2).with_context(|| format!("redirecting stderr to {}", path.display()))?;
            info!(path = %path.display(), "stderr redirected");
        }

        if self.stdout.is_some() {
            let mut out = std::io::stdout().lock();
            let _ = writeln!(out, "{}", startup_banner());
            let _ = out.flush();
        }
        if self.stderr.is_some() {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", startup_banner());
        }
        Ok(())
    }

    fn open(&self, path: &Path) -> Result<File> {
        let mut opts = OpenOptions::new();
        opts.create(true);
        if self.append {
            opts.append(true);
        } else {
            opts.write(true).truncate(true);
        }
        let file = opts
            .open(path)
            .with_context(|| format!("opening {}", path.display()))?;
        debug!(path = %path.display(), append = self.append, "redirect target opened");
        Ok(file)
    }
}

pub fn startup_banner() -> String {
    format!(
        "=== respawn startup: {} ===",
        chrono::Local::now().to_rfc3339()
    )
}

#[cfg(unix)]
fn redirect_fd(file: &File, target: i32) -> std::io::Result<()> {
    use std::os::fd::AsRawFd;
    nix::unistd::dup2(file.as_raw_fd(), target)
        .map(|_| ())
        .map_err(std::io::Error::from)
}

#[cfg(not(unix))]
fn redirect_fd(_file: &File, target: i32) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        format!("redirecting descriptor {target} is not supported on this platform"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_copies_targets() {
        let cfg = RedirectConfig {
            stdout: Some("out.log".into()),
            stderr: None,
            append: true,
        };
        let r = IoRedirect::from(&cfg);
        assert!(r.is_enabled());
        assert_eq!(r.stdout.as_deref(), Some(Path::new("out.log")));
        assert!(r.append);
        assert!(!IoRedirect::default().is_enabled());
    }

    #[test]
    fn open_appends_or_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");
        std::fs::write(&path, "old\n").unwrap();

        let append = IoRedirect {
            append: true,
            ..Default::default()
        };
        let mut f = append.open(&path).unwrap();
        writeln!(f, "new").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "old\nnew\n");

        let truncate = IoRedirect::default();
        let mut f = truncate.open(&path).unwrap();
        writeln!(f, "fresh").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "fresh\n");
    }

    #[test]
    fn banner_has_timestamp() {
        let banner = startup_banner();
        assert!(banner.starts_with("=== respawn startup: "));
        assert!(banner.ends_with(" ==="));
    }
}
