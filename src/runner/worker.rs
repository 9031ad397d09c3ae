// src/runner/worker.rs

//! Individual worker process: spawn, signal, and wait.

use std::path::Path;
use std::process::Stdio;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::listeners::{ENV_PREFIX, handoff};

/// Variable carrying the worker's slot index.
pub const WORKER_INDEX_VAR: &str = "RESPAWN_WORKER_INDEX";
/// Variable carrying the configured environment name.
pub const ENVIRONMENT_VAR: &str = "RESPAWN_ENV";

/// Everything needed to start one copy of the server command.
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub command: Vec<String>,
    pub handoff_env: Vec<(String, String)>,
    pub environment: String,
}

/// Sent by the monitor task once the child is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExit {
    pub index: usize,
    pub generation: u64,
    pub pid: Option<u32>,
    pub code: Option<i32>,
}

#[derive(Debug)]
pub struct Worker {
    pub index: usize,
    pub generation: u64,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    kill_tx: Option<oneshot::Sender<()>>,
}

/// Start worker `index` in `dir` and attach its monitor task.
///
/// The monitor reports on `exits` exactly once. Dropping the returned
/// [`Worker`] kills the child.
pub fn spawn_worker(
    spec: &WorkerSpec,
    index: usize,
    generation: u64,
    dir: &Path,
    exits: mpsc::UnboundedSender<WorkerExit>,
) -> Result<Worker> {
    let (program, args) = spec
        .command
        .split_first()
        .context("worker command is empty")?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    for name in handoff::inherited_var_names(ENV_PREFIX) {
        cmd.env_remove(name);
    }
    cmd.envs(spec.handoff_env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .env(WORKER_INDEX_VAR, index.to_string())
        .env(ENVIRONMENT_VAR, &spec.environment);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning worker {index} ({program}) in {}", dir.display()))?;
    let pid = child.id();

    info!(index, generation, pid, "worker booted");

    let (kill_tx, mut kill_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let status = tokio::select! {
            status = child.wait() => status,
            _ = &mut kill_rx => {
                debug!(index, generation, pid, "killing worker");
                if let Err(e) = child.start_kill() {
                    warn!(index, pid, error = %e, "failed to kill worker");
                }
                child.wait().await
            }
        };

        let code = match status {
            Ok(status) => status.code(),
            Err(e) => {
                warn!(index, pid, error = %e, "waiting for worker failed");
                None
            }
        };

        let _ = exits.send(WorkerExit {
            index,
            generation,
            pid,
            code,
        });
    });

    Ok(Worker {
        index,
        generation,
        pid,
        started_at: Utc::now(),
        kill_tx: Some(kill_tx),
    })
}

impl Worker {
    /// Ask the worker to shut down gracefully.
    #[cfg(unix)]
    pub fn terminate(&mut self) {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let Some(pid) = self.pid else {
            return;
        };
        debug!(index = self.index, pid, "sending SIGTERM to worker");
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            debug!(index = self.index, pid, error = %e, "SIGTERM not delivered");
        }
    }

    #[cfg(not(unix))]
    pub fn terminate(&mut self) {
        self.kill();
    }

    /// Kill the worker without waiting for it.
    pub fn kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Whether `exit` reports this worker.
    pub fn is(&self, exit: &WorkerExit) -> bool {
        self.index == exit.index && self.generation == exit.generation && self.pid == exit.pid
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn spec(cmd: &[&str]) -> WorkerSpec {
        WorkerSpec {
            command: cmd.iter().map(|s| s.to_string()).collect(),
            handoff_env: vec![("RESPAWN_INHERIT_0".into(), "9:tcp://127.0.0.1:1".into())],
            environment: "test".into(),
        }
    }

    #[tokio::test]
    async fn exit_is_reported_with_index_and_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dir = std::env::temp_dir();
        let worker = spawn_worker(&spec(&["sh", "-c", "exit 3"]), 2, 7, &dir, tx).unwrap();
        assert!(worker.pid.is_some());

        let exit = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit.index, 2);
        assert_eq!(exit.generation, 7);
        assert_eq!(exit.code, Some(3));
    }

    #[tokio::test]
    async fn worker_sees_index_environment_and_handoff() {
        let tmp = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let script = "echo \"$RESPAWN_WORKER_INDEX $RESPAWN_ENV $RESPAWN_INHERIT_0\" > out.txt";
        let _worker = spawn_worker(&spec(&["sh", "-c", script]), 1, 0, tmp.path(), tx).unwrap();

        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let out = std::fs::read_to_string(tmp.path().join("out.txt")).unwrap();
        assert_eq!(out.trim(), "1 test 9:tcp://127.0.0.1:1");
    }

    #[tokio::test]
    async fn kill_stops_a_worker_ignoring_sigterm() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dir = std::env::temp_dir();
        let mut worker = spawn_worker(
            &spec(&["sh", "-c", "trap '' TERM; sleep 30"]),
            0,
            0,
            &dir,
            tx,
        )
        .unwrap();

        // Give the shell time to install its trap.
        tokio::time::sleep(Duration::from_millis(200)).await;
        worker.terminate();
        let still_running =
            tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
        assert!(still_running.is_err(), "SIGTERM should be ignored");

        worker.kill();
        let exit = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(worker.is(&exit));
        assert_eq!(exit.code, None);
    }
}
