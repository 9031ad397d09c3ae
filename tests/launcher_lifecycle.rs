// tests/launcher_lifecycle.rs

use std::ffi::OsString;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use respawn::config::LauncherConfig;
use respawn::errors::LaunchError;
use respawn::launcher::{LaunchOutcome, Launcher, LauncherState};
use respawn::listeners::ListenerSet;
use respawn::restart::RestartPlan;
use respawn::runner::{RunnerHandle, RunnerMode};
use respawn_test_utils::{
    CallLog, FakeRestarter, FakeRunner, LauncherConfigBuilder, init_tracing, with_timeout,
};

fn plan() -> RestartPlan {
    RestartPlan::new(
        "/usr/local/bin/respawn",
        Vec::new(),
        vec![OsString::from("-w"), OsString::from("2")],
        std::env::temp_dir(),
    )
}

fn launcher(config: LauncherConfig, runner: FakeRunner, restarter: FakeRestarter) -> Launcher {
    let handle = RunnerHandle::new(RunnerMode::Single, Arc::new(runner));
    Launcher::new(config, ListenerSet::empty(), handle, plan())
        .with_restarter(restarter)
        .without_signal_handlers()
}

/// Give the launcher a moment to enter the runner before poking it.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn stop_drains_once_and_never_halts() {
    init_tracing();
    let log = CallLog::default();
    let l = launcher(
        LauncherConfigBuilder::new().build(),
        FakeRunner::new(log.clone()),
        FakeRestarter::failing(log.clone()),
    );
    let handle = l.handle();

    let task = tokio::spawn(l.run());
    settle().await;
    assert!(handle.stop());

    let outcome = with_timeout(task).await.unwrap().unwrap();
    assert_eq!(outcome, LaunchOutcome::Stopped);
    assert_eq!(log.count("stop_blocked"), 1);
    assert_eq!(log.count("halt"), 0);
    assert_eq!(log.count("export"), 0);
}

#[tokio::test]
async fn restart_tears_down_before_exporting() {
    init_tracing();
    let log = CallLog::default();
    let hook_calls = Arc::new(AtomicUsize::new(0));
    let hooks = Arc::clone(&hook_calls);
    let restarter = FakeRestarter::failing(log.clone());
    let l = launcher(
        LauncherConfigBuilder::new()
            .on_restart(move || {
                hooks.fetch_add(1, Ordering::SeqCst);
            })
            .build(),
        FakeRunner::new(log.clone()),
        restarter.clone(),
    );
    let handle = l.handle();

    let task = tokio::spawn(l.run());
    settle().await;
    assert!(handle.restart());

    let err = with_timeout(task).await.unwrap().unwrap_err();
    assert!(matches!(err, LaunchError::RestartFailure(_)));

    let before = log.position("before_restart").expect("before_restart called");
    let export = log.position("export").expect("export attempted");
    assert!(before < export, "calls: {:?}", log.calls());
    assert_eq!(log.count("stop_blocked"), 0);
    assert_eq!(hook_calls.load(Ordering::SeqCst), 1);

    let request = &restarter.requests()[0];
    assert_eq!(
        request.argv,
        vec![
            OsString::from("/usr/local/bin/respawn"),
            OsString::from("-w"),
            OsString::from("2")
        ]
    );
    assert_eq!(request.dir, std::env::temp_dir());
}

#[tokio::test]
async fn restart_cmd_replaces_the_interpreter() {
    init_tracing();
    let log = CallLog::default();
    let restarter = FakeRestarter::respawning(log.clone());
    let l = launcher(
        LauncherConfigBuilder::new()
            .restart_cmd("/opt/app/bin/respawn --quiet")
            .build(),
        FakeRunner::new(log.clone()),
        restarter.clone(),
    );
    assert!(l.restart());

    let outcome = with_timeout(l.run()).await.unwrap();
    assert_eq!(outcome, LaunchOutcome::Respawned);
    assert_eq!(
        restarter.requests()[0].argv,
        vec![
            OsString::from("/opt/app/bin/respawn"),
            OsString::from("--quiet"),
            OsString::from("-w"),
            OsString::from("2")
        ]
    );
}

#[tokio::test]
async fn phased_restart_without_capability_falls_back_to_one_restart() {
    init_tracing();
    let log = CallLog::default();
    let l = launcher(
        LauncherConfigBuilder::new().build(),
        FakeRunner::new(log.clone()),
        FakeRestarter::respawning(log.clone()),
    );
    let handle = l.handle();

    let task = tokio::spawn(l.run());
    settle().await;
    handle.phased_restart();

    let outcome = with_timeout(task).await.unwrap().unwrap();
    assert_eq!(outcome, LaunchOutcome::Respawned);
    assert_eq!(handle.state(), LauncherState::Restart);
    // Without the capability the runner is never asked.
    assert_eq!(log.count("phased_restart"), 0);
    assert_eq!(log.count("export"), 1);
}

#[tokio::test]
async fn refused_phased_restart_falls_back_as_well() {
    init_tracing();
    let log = CallLog::default();
    let l = launcher(
        LauncherConfigBuilder::new().build(),
        FakeRunner::new(log.clone()).refusing_phased(),
        FakeRestarter::respawning(log.clone()),
    );
    let handle = l.handle();

    let task = tokio::spawn(l.run());
    settle().await;
    handle.phased_restart();

    with_timeout(task).await.unwrap().unwrap();
    assert_eq!(log.count("phased_restart"), 1);
    assert_eq!(log.count("export"), 1);
}

#[tokio::test]
async fn accepted_phased_restart_keeps_running() {
    init_tracing();
    let log = CallLog::default();
    let l = launcher(
        LauncherConfigBuilder::new().build(),
        FakeRunner::new(log.clone()).clustered(),
        FakeRestarter::failing(log.clone()),
    );
    let handle = l.handle();

    let task = tokio::spawn(l.run());
    settle().await;
    handle.phased_restart();
    handle.reload_worker_directory();
    settle().await;
    assert_eq!(handle.state(), LauncherState::Run);
    assert_eq!(log.count("phased_restart"), 1);
    assert_eq!(log.count("reload_worker_directory"), 1);

    handle.stop();
    let outcome = with_timeout(task).await.unwrap().unwrap();
    assert_eq!(outcome, LaunchOutcome::Stopped);
    assert_eq!(log.count("export"), 0);
}

#[tokio::test]
async fn halt_skips_the_drain() {
    init_tracing();
    let log = CallLog::default();
    let l = launcher(
        LauncherConfigBuilder::new().build(),
        FakeRunner::new(log.clone()),
        FakeRestarter::failing(log.clone()),
    );
    let handle = l.handle();

    let task = tokio::spawn(l.run());
    settle().await;
    assert!(handle.halt());
    assert!(!handle.stop());

    let outcome = with_timeout(task).await.unwrap().unwrap();
    assert_eq!(outcome, LaunchOutcome::Halted);
    assert_eq!(log.count("halt"), 1);
    assert_eq!(log.count("stop_blocked"), 0);
}

#[tokio::test]
async fn interrupt_exits_after_one_graceful_stop() {
    init_tracing();
    let log = CallLog::default();
    let l = launcher(
        LauncherConfigBuilder::new().build(),
        FakeRunner::new(log.clone()),
        FakeRestarter::failing(log.clone()),
    );
    let handle = l.handle();

    let task = tokio::spawn(l.run());
    settle().await;
    handle.interrupt();

    let outcome = with_timeout(task).await.unwrap().unwrap();
    assert_eq!(outcome, LaunchOutcome::Exited);
    assert_eq!(handle.state(), LauncherState::Exit);
    assert_eq!(log.count("stop_blocked"), 1);
    assert_eq!(log.count("export"), 0);
}

#[tokio::test]
async fn restart_requested_then_stopped_only_stops() {
    init_tracing();
    let log = CallLog::default();
    let l = launcher(
        LauncherConfigBuilder::new().build(),
        FakeRunner::new(log.clone()),
        FakeRestarter::failing(log.clone()),
    );
    assert!(l.restart());
    assert!(l.stop());
    assert_eq!(l.state(), LauncherState::Stop);

    let outcome = with_timeout(l.run()).await.unwrap();
    assert_eq!(outcome, LaunchOutcome::Stopped);
    assert_eq!(log.count("stop"), 1);
    assert_eq!(log.count("export"), 0);
}

#[test]
fn title_lists_binds_and_tag() {
    let log = CallLog::default();
    let l = launcher(
        LauncherConfigBuilder::new()
            .bind("tcp://0.0.0.0:9292")
            .bind("unix:///tmp/app.sock")
            .tag("blue")
            .build(),
        FakeRunner::new(log.clone()),
        FakeRestarter::failing(log),
    );
    assert_eq!(
        l.title(),
        format!(
            "respawn {} (tcp://0.0.0.0:9292,unix:///tmp/app.sock) [blue]",
            env!("CARGO_PKG_VERSION")
        )
    );
}
