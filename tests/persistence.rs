// tests/persistence.rs

use std::sync::Arc;
use std::time::Duration;

use respawn::launcher::{LaunchOutcome, Launcher};
use respawn::listeners::ListenerSet;
use respawn::persist::{PidRecord, read_pid, read_state, write_state};
use respawn::restart::RestartPlan;
use respawn::runner::{RunnerHandle, RunnerMode};
use respawn_test_utils::{
    CallLog, FakeRestarter, FakeRunner, LauncherConfigBuilder, init_tracing, with_timeout,
};

#[test]
fn state_snapshot_holds_pid_and_config_without_hooks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("respawn.state");
    let config = LauncherConfigBuilder::new()
        .bind("tcp://127.0.0.1:9292")
        .workers(2)
        .control("tcp://127.0.0.1:9293", Some("secret"))
        .on_restart(|| {})
        .build();

    write_state(&path, 4321, &config).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(!text.contains("hooks"), "{text}");

    let state = read_state(&path).unwrap();
    assert_eq!(state.pid, 4321);
    assert_eq!(state.config["workers"].as_integer(), Some(2));
    assert_eq!(state.config["drain_timeout"].as_str(), Some("30s"));
    assert_eq!(
        state.config["binds"].as_array().unwrap()[0].as_str(),
        Some("tcp://127.0.0.1:9292")
    );
    assert_eq!(
        state.config["control"]["url"].as_str(),
        Some("tcp://127.0.0.1:9293")
    );
}

#[test]
fn pidfile_survives_a_foreign_cleanup() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.pid");

    // A worker that inherited the record must not remove the file.
    let mut inherited = PidRecord::write_for(&path, std::process::id() + 1).unwrap();
    assert!(!inherited.cleanup());
    assert!(path.exists());

    let mut own = PidRecord::write(&path).unwrap();
    assert_eq!(read_pid(&path), Some(std::process::id()));
    assert!(own.cleanup());
    assert!(!path.exists());
}

#[tokio::test]
async fn launcher_writes_and_removes_its_pidfile() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let pidfile = dir.path().join("respawn.pid");
    let state = dir.path().join("respawn.state");
    let log = CallLog::default();

    let config = LauncherConfigBuilder::new()
        .pidfile(&pidfile)
        .state_path(&state)
        .build();
    let runner = RunnerHandle::new(RunnerMode::Single, Arc::new(FakeRunner::new(log.clone())));
    let launcher = Launcher::new(
        config,
        ListenerSet::empty(),
        runner,
        RestartPlan::new("respawn", Vec::new(), Vec::new(), "/"),
    )
    .with_restarter(FakeRestarter::failing(log))
    .without_signal_handlers();
    let handle = launcher.handle();

    let task = tokio::spawn(launcher.run());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(read_pid(&pidfile), Some(std::process::id()));
    assert_eq!(read_state(&state).unwrap().pid, std::process::id());

    handle.stop();
    let outcome = with_timeout(task).await.unwrap().unwrap();
    assert_eq!(outcome, LaunchOutcome::Stopped);
    assert!(!pidfile.exists());
}

#[tokio::test]
async fn unwritable_pidfile_does_not_stop_startup() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let log = CallLog::default();
    let config = LauncherConfigBuilder::new()
        .pidfile(dir.path().join("missing/dir/respawn.pid"))
        .build();
    let runner = RunnerHandle::new(RunnerMode::Single, Arc::new(FakeRunner::new(log.clone())));
    let launcher = Launcher::new(
        config,
        ListenerSet::empty(),
        runner,
        RestartPlan::new("respawn", Vec::new(), Vec::new(), "/"),
    )
    .with_restarter(FakeRestarter::failing(log.clone()))
    .without_signal_handlers();
    launcher.stop();

    let outcome = with_timeout(launcher.run()).await.unwrap();
    assert_eq!(outcome, LaunchOutcome::Stopped);
    assert_eq!(log.count("run"), 1);
}
