// src/runner/process.rs

//! Command-backed runner.
//!
//! The served application is an external command. Single mode runs one copy
//! and finishes when it exits; cluster mode keeps `workers` copies alive,
//! respawning crashed ones after a short back-off. Every copy inherits the
//! listener descriptors and finds them through the handoff variables.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use serde_json::json;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::LauncherConfig;
use crate::errors::{LaunchError, Result};
use crate::listeners::ListenerSet;

use super::worker::{Worker, WorkerExit, WorkerSpec, spawn_worker};
use super::{Capabilities, Runner, RunnerFuture, RunnerMode};

/// Delay before a crashed cluster worker is started again.
pub const RESPAWN_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Directive {
    Stop,
    Halt,
    PhasedRestart,
}

#[derive(Debug, Clone)]
struct WorkerStatus {
    index: usize,
    pid: Option<u32>,
    phase: u64,
    started_at: String,
}

#[derive(Debug)]
pub struct ProcessRunner {
    mode: RunnerMode,
    spec: WorkerSpec,
    drain_timeout: Duration,
    source_dir: PathBuf,
    worker_dir: RwLock<PathBuf>,
    directives: mpsc::UnboundedSender<Directive>,
    inbox: Mutex<Option<mpsc::UnboundedReceiver<Directive>>>,
    started: AtomicBool,
    finished: watch::Sender<bool>,
    phase: AtomicU64,
    status: Mutex<Vec<WorkerStatus>>,
}

impl ProcessRunner {
    pub fn new(
        mode: RunnerMode,
        config: &LauncherConfig,
        listeners: &ListenerSet,
        restart_dir: &Path,
    ) -> Result<Self> {
        if config.command.is_empty() {
            return Err(LaunchError::ConfigError(
                "no command configured, nothing to run".to_string(),
            ));
        }

        // Workers receive the listeners by plain descriptor inheritance.
        #[cfg(unix)]
        for fd in listeners.raw_descriptors() {
            if !crate::listeners::set_cloexec(fd, false) {
                return Err(LaunchError::ConfigError(format!(
                    "listener descriptor {fd} cannot be shared with workers"
                )));
            }
        }

        let source_dir = config
            .directory
            .clone()
            .unwrap_or_else(|| restart_dir.to_path_buf());
        let worker_dir = resolve_dir(&source_dir);

        let (directives, inbox) = mpsc::unbounded_channel();
        let (finished, _) = watch::channel(false);

        Ok(Self {
            mode,
            spec: WorkerSpec {
                command: config.command.clone(),
                handoff_env: listeners.handoff_env(),
                environment: config.environment.clone(),
            },
            drain_timeout: config.drain_timeout,
            source_dir,
            worker_dir: RwLock::new(worker_dir),
            directives,
            inbox: Mutex::new(Some(inbox)),
            started: AtomicBool::new(false),
            finished,
            phase: AtomicU64::new(0),
            status: Mutex::new(Vec::new()),
        })
    }

    pub fn worker_dir(&self) -> PathBuf {
        self.worker_dir
            .read()
            .map(|d| d.clone())
            .unwrap_or_else(|_| self.source_dir.clone())
    }

    fn send(&self, directive: Directive) {
        if self.directives.send(directive).is_err() {
            debug!(?directive, "runner inbox closed; directive dropped");
        }
    }

    fn spawn(
        &self,
        index: usize,
        generation: u64,
        exits: &mpsc::UnboundedSender<WorkerExit>,
    ) -> Result<Worker> {
        spawn_worker(&self.spec, index, generation, &self.worker_dir(), exits.clone())
    }

    fn record(&self, workers: &[Option<Worker>]) {
        let phase = self.phase.load(Ordering::Acquire);
        let snapshot = workers
            .iter()
            .flatten()
            .map(|w| WorkerStatus {
                index: w.index,
                pid: w.pid,
                phase,
                started_at: w.started_at.to_rfc3339(),
            })
            .collect();
        if let Ok(mut status) = self.status.lock() {
            *status = snapshot;
        }
    }

    async fn supervise(&self, mut inbox: mpsc::UnboundedReceiver<Directive>) -> Result<()> {
        let (exit_tx, mut exit_rx) = mpsc::unbounded_channel::<WorkerExit>();
        let (respawn_tx, mut respawn_rx) = mpsc::unbounded_channel::<usize>();
        let mut generation: u64 = 0;
        let mut workers: Vec<Option<Worker>> = Vec::new();
        let mut retiring: Vec<Retiring> = Vec::new();
        let mut rolling: Option<usize> = None;
        let mut draining = false;

        for index in 0..self.mode.worker_count() {
            match self.spawn(index, generation, &exit_tx) {
                Ok(w) => workers.push(Some(w)),
                Err(e) => {
                    error!(index, error = %e, "worker failed to boot");
                    for w in workers.iter_mut().flatten() {
                        w.kill();
                    }
                    return Err(e);
                }
            }
        }
        self.record(&workers);

        loop {
            if draining && retiring.is_empty() && workers.iter().all(Option::is_none) {
                info!("- All workers stopped");
                return Ok(());
            }

            // Phased restart: the next slot is only replaced once the
            // previous old worker is gone.
            if let Some(slot) = rolling.filter(|_| retiring.is_empty() && !draining) {
                rolling = self.roll_slot(&mut workers, &mut retiring, slot, generation, &exit_tx);
                self.record(&workers);
                continue;
            }

            let wake = retiring
                .iter()
                .filter(|r| !r.killed)
                .map(|r| r.deadline)
                .min();

            tokio::select! {
                Some(directive) = inbox.recv() => match directive {
                    Directive::Stop => {
                        if draining {
                            continue;
                        }
                        info!("- Gracefully stopping, waiting for workers to finish");
                        draining = true;
                        rolling = None;
                        let deadline = Instant::now() + self.drain_timeout;
                        for w in workers.iter_mut().filter_map(Option::take) {
                            retiring.push(Retiring::start(w, deadline));
                        }
                        self.record(&workers);
                    }
                    Directive::Halt => {
                        for w in workers.iter_mut().flatten() {
                            w.kill();
                        }
                        for r in retiring.iter_mut() {
                            r.worker.kill();
                        }
                        workers.clear();
                        self.record(&workers);
                        return Ok(());
                    }
                    Directive::PhasedRestart => {
                        if draining || rolling.is_some() {
                            debug!("phased restart already in progress or stopping; ignored");
                            continue;
                        }
                        generation += 1;
                        let phase = self.phase.fetch_add(1, Ordering::AcqRel) + 1;
                        info!(phase, "- Starting phased worker restart");
                        rolling = Some(0);
                    }
                },

                Some(exit) = exit_rx.recv() => {
                    if let Some(pos) = retiring.iter().position(|r| r.worker.is(&exit)) {
                        let old = retiring.swap_remove(pos);
                        debug!(index = old.worker.index, pid = old.worker.pid, code = exit.code, "old worker exited");
                        continue;
                    }

                    let current = workers
                        .get(exit.index)
                        .and_then(Option::as_ref)
                        .is_some_and(|w| w.is(&exit));
                    if !current {
                        debug!(index = exit.index, generation = exit.generation, "stale worker exit ignored");
                        continue;
                    }
                    workers[exit.index] = None;
                    self.record(&workers);

                    if !self.mode.is_clustered() {
                        info!(code = exit.code, "server command exited");
                        return Ok(());
                    }

                    warn!(index = exit.index, pid = exit.pid, code = exit.code, "worker exited unexpectedly; respawning");
                    schedule_respawn(&respawn_tx, exit.index);
                },

                Some(index) = respawn_rx.recv() => {
                    if draining || workers.get(index).is_some_and(Option::is_some) {
                        continue;
                    }
                    match self.spawn(index, generation, &exit_tx) {
                        Ok(w) => {
                            workers[index] = Some(w);
                            self.record(&workers);
                        }
                        Err(e) => {
                            error!(index, error = %e, "worker respawn failed; retrying");
                            schedule_respawn(&respawn_tx, index);
                        }
                    }
                },

                _ = tokio::time::sleep_until(wake.unwrap_or_else(Instant::now)), if wake.is_some() => {
                    let now = Instant::now();
                    for r in retiring.iter_mut().filter(|r| !r.killed && r.deadline <= now) {
                        warn!(
                            index = r.worker.index,
                            pid = r.worker.pid,
                            "worker did not exit before the drain timeout; killing"
                        );
                        r.worker.kill();
                        r.killed = true;
                    }
                },
            }
        }
    }

    /// Replace the worker in `slot` and retire the old one. Returns the next
    /// slot to roll, or `None` once every slot has been replaced.
    fn roll_slot(
        &self,
        workers: &mut [Option<Worker>],
        retiring: &mut Vec<Retiring>,
        slot: usize,
        generation: u64,
        exits: &mpsc::UnboundedSender<WorkerExit>,
    ) -> Option<usize> {
        if slot >= workers.len() {
            info!("- Phased restart complete");
            return None;
        }
        match self.spawn(slot, generation, exits) {
            Ok(fresh) => {
                if let Some(old) = workers[slot].replace(fresh) {
                    info!(index = slot, pid = old.pid, "- Stopping old worker");
                    retiring.push(Retiring::start(old, Instant::now() + self.drain_timeout));
                }
            }
            Err(e) => {
                error!(index = slot, error = %e, "phased restart could not boot a replacement; keeping old worker");
            }
        }
        Some(slot + 1)
    }
}

/// An old worker that was sent SIGTERM and is given until `deadline`.
#[derive(Debug)]
struct Retiring {
    worker: Worker,
    deadline: Instant,
    killed: bool,
}

impl Retiring {
    fn start(mut worker: Worker, deadline: Instant) -> Self {
        worker.terminate();
        Self {
            worker,
            deadline,
            killed: false,
        }
    }
}

fn schedule_respawn(tx: &mpsc::UnboundedSender<usize>, index: usize) {
    let tx = tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(RESPAWN_BACKOFF).await;
        let _ = tx.send(index);
    });
}

fn resolve_dir(dir: &Path) -> PathBuf {
    std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf())
}

impl Runner for ProcessRunner {
    fn run(&self) -> RunnerFuture<'_, Result<()>> {
        Box::pin(async move {
            let inbox = self
                .inbox
                .lock()
                .ok()
                .and_then(|mut slot| slot.take())
                .ok_or_else(|| anyhow::anyhow!("process runner can only run once"))?;

            self.started.store(true, Ordering::Release);
            info!(
                mode = %self.mode,
                command = ?self.spec.command,
                dir = %self.worker_dir().display(),
                "starting server command"
            );
            let result = self.supervise(inbox).await;
            self.finished.send_replace(true);
            result
        })
    }

    fn stop(&self) {
        self.send(Directive::Stop);
    }

    fn stop_blocked(&self) -> RunnerFuture<'_, Result<()>> {
        Box::pin(async move {
            self.stop();
            if !self.started.load(Ordering::Acquire) {
                return Ok(());
            }
            let mut finished = self.finished.subscribe();
            let _ = finished.wait_for(|done| *done).await;
            Ok(())
        })
    }

    fn halt(&self) {
        self.send(Directive::Halt);
    }

    fn capabilities(&self) -> Capabilities {
        let clustered = self.mode.is_clustered();
        Capabilities {
            phased_restart: clustered,
            reload_worker_directory: clustered,
        }
    }

    fn phased_restart(&self) -> bool {
        if !self.mode.is_clustered() {
            return false;
        }
        self.send(Directive::PhasedRestart);
        true
    }

    fn reload_worker_directory(&self) -> bool {
        if !self.mode.is_clustered() {
            return false;
        }
        let dir = resolve_dir(&self.source_dir);
        info!("+ Changing to {}", dir.display());
        match self.worker_dir.write() {
            Ok(mut current) => {
                *current = dir;
                true
            }
            Err(_) => false,
        }
    }

    fn stats(&self) -> serde_json::Value {
        let status = self.status.lock().map(|s| s.clone()).unwrap_or_default();
        let workers: Vec<_> = status
            .iter()
            .map(|w| {
                json!({
                    "index": w.index,
                    "pid": w.pid,
                    "phase": w.phase,
                    "started_at": w.started_at,
                })
            })
            .collect();

        json!({
            "mode": self.mode.to_string(),
            "workers": self.mode.worker_count(),
            "running": workers.len(),
            "phase": self.phase.load(Ordering::Acquire),
            "worker_status": workers,
        })
    }
}
