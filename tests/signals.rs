// tests/signals.rs
#![cfg(unix)]

use std::ffi::OsString;
use std::sync::Arc;

use nix::sys::signal::{Signal, raise};

use respawn::launcher::{
    LaunchOutcome, Launcher, LauncherState, Request, SignalRouter, SupervisorHandle,
};
use respawn::listeners::ListenerSet;
use respawn::restart::RestartPlan;
use respawn::runner::{RunnerHandle, RunnerMode};
use respawn_test_utils::{
    CallLog, FakeRestarter, FakeRunner, LauncherConfigBuilder, init_tracing, with_timeout,
};

async fn wait_for(handle: &SupervisorHandle, mut done: impl FnMut(&SupervisorHandle) -> bool) {
    with_timeout(async {
        while !done(handle) {
            handle.notified().await;
        }
    })
    .await;
}

// Signals are process-wide, so everything runs in one test.
#[tokio::test]
async fn os_signals_drive_the_supervisor() {
    init_tracing();

    let handle = SupervisorHandle::new();
    let router = SignalRouter::install(&handle);
    assert_eq!(router.installed(), 5);

    raise(Signal::SIGHUP).unwrap();
    let mut seen = Vec::new();
    wait_for(&handle, |h| {
        seen.extend(h.take_pending());
        seen.contains(&Request::ReopenLogs)
    })
    .await;
    assert_eq!(handle.state(), LauncherState::Run);

    raise(Signal::SIGTERM).unwrap();
    wait_for(&handle, |h| h.state() == LauncherState::Stop).await;
    drop(router);

    // SIGUSR2 restarts a running launcher.
    let log = CallLog::default();
    let restarter = FakeRestarter::respawning(log.clone());
    let runner = RunnerHandle::new(RunnerMode::Single, Arc::new(FakeRunner::new(log.clone())));
    let launcher = Launcher::new(
        LauncherConfigBuilder::new().build(),
        ListenerSet::empty(),
        runner,
        RestartPlan::new("respawn", Vec::new(), vec![OsString::from("-w1")], "/"),
    )
    .with_restarter(restarter.clone());
    let launcher_handle = launcher.handle();

    let task = tokio::spawn(launcher.run());
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    raise(Signal::SIGUSR2).unwrap();

    let outcome = with_timeout(task).await.unwrap().unwrap();
    assert_eq!(outcome, LaunchOutcome::Respawned);
    assert_eq!(launcher_handle.state(), LauncherState::Restart);
    assert_eq!(restarter.requests().len(), 1);
}
