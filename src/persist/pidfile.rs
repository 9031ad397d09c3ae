// src/persist/pidfile.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::errors::{LaunchError, Result};

/// A pidfile written by this process.
///
/// The file is only removed when the process cleaning up is the one that
/// wrote it and the file still holds that pid. A re-executed process keeps
/// the same pid and rewrites the file, so a restart never loses it; a
/// forked worker never removes it.
#[derive(Debug)]
pub struct PidRecord {
    path: PathBuf,
    pid: u32,
    cleaned: bool,
}

impl PidRecord {
    pub fn write(path: impl Into<PathBuf>) -> Result<Self> {
        Self::write_for(path, std::process::id())
    }

    pub fn write_for(path: impl Into<PathBuf>, pid: u32) -> Result<Self> {
        let path = path.into();
        fs::write(&path, format!("{pid}\n"))
            .map_err(|e| LaunchError::persistence("pidfile", &path, e))?;
        debug!(path = %path.display(), pid, "pidfile written");
        Ok(Self {
            path,
            pid,
            cleaned: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Remove the file if this process still owns it.
    pub fn cleanup(&mut self) -> bool {
        self.cleanup_as(std::process::id())
    }

    /// Ownership check against an explicit current pid.
    pub fn cleanup_as(&mut self, current_pid: u32) -> bool {
        if self.cleaned {
            return false;
        }
        self.cleaned = true;

        if current_pid != self.pid {
            debug!(current_pid, recorded = self.pid, "not the pidfile owner; leaving it");
            return false;
        }

        match read_pid(&self.path) {
            Some(pid) if pid == self.pid => match fs::remove_file(&self.path) {
                Ok(()) => true,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "could not remove pidfile");
                    false
                }
            },
            other => {
                debug!(path = %self.path.display(), found = ?other, "pidfile changed hands; leaving it");
                false
            }
        }
    }

    /// Forget the file without removing it (used right before re-exec).
    pub fn release(mut self) {
        self.cleaned = true;
    }
}

impl Drop for PidRecord {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Write this process's pid to `path`.
pub fn write_pid(path: &Path) -> Result<PidRecord> {
    PidRecord::write(path)
}

/// Pid stored in `path`, if readable.
pub fn read_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_removes_its_own_pidfile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.pid");
        let mut rec = PidRecord::write(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), format!("{}\n", std::process::id()));
        assert!(rec.cleanup());
        assert!(!path.exists());
    }

    #[test]
    fn other_process_never_removes_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.pid");
        let mut rec = PidRecord::write_for(&path, 4242).unwrap();
        assert!(!rec.cleanup_as(4243));
        assert!(path.exists());
    }

    #[test]
    fn rewritten_file_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.pid");
        let mut rec = PidRecord::write_for(&path, 10).unwrap();
        fs::write(&path, "11\n").unwrap();
        assert!(!rec.cleanup_as(10));
        assert_eq!(read_pid(&path), Some(11));
    }

    #[test]
    fn released_record_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.pid");
        PidRecord::write(&path).unwrap().release();
        assert!(path.exists());
    }

    #[test]
    fn unwritable_path_is_a_persistence_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = PidRecord::write(dir.path().join("missing/app.pid")).unwrap_err();
        assert!(matches!(err, LaunchError::PersistenceFailure { what: "pidfile", .. }));
    }
}
