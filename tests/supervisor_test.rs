//! Process supervisor tests against real child processes.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use hostwatch::error::WatchError;
use hostwatch::supervisor::{
    count_children, get_info, is_running, ProcessSupervisor, ProcessTable, SupervisorState,
};

fn supervisor_in(dir: &Path, suffix: &str) -> ProcessSupervisor {
    ProcessSupervisor::new(suffix).with_pid_dir(dir)
}

fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[test]
fn empty_arguments_are_configuration_errors() {
    let dir = tempfile::tempdir().unwrap();
    let mut supervisor = supervisor_in(dir.path(), "_empty");

    assert!(matches!(
        supervisor.start("", "cmd"),
        Err(WatchError::Configuration(_))
    ));
    assert!(matches!(
        supervisor.start("/tmp", ""),
        Err(WatchError::Configuration(_))
    ));
    assert_eq!(supervisor.pid(), None);
    assert_eq!(supervisor.state(), SupervisorState::Idle);
}

#[test]
fn start_and_stop_sleep() {
    let dir = tempfile::tempdir().unwrap();
    let mut supervisor = supervisor_in(dir.path(), "_sleep");

    let pid = supervisor.start(dir.path(), "/bin/sleep 30").unwrap();
    assert_eq!(supervisor.pid(), Some(pid));
    assert_eq!(supervisor.state(), SupervisorState::Running);
    assert!(supervisor.is_running(pid));
    assert!(count_children(pid) >= 1);
    assert!(!dir.path().join("pid_sleep").exists());
    assert!(wait_until(Duration::from_secs(1), || {
        get_info(pid).is_some_and(|info| info.comm == "sleep" && info.pgrp == pid)
    }));

    supervisor.stop();
    assert!(!is_running(pid));
    assert_eq!(supervisor.pid(), None);
    assert_eq!(supervisor.state(), SupervisorState::Idle);
    assert!(get_info(pid).is_none_or(|info| info.is_zombie()));
}

#[test]
fn stop_escalates_when_sigint_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("ignore_int.sh");
    fs::write(
        &script,
        "#!/bin/sh\ntrap '' INT\nwhile true; do sleep 1; done\n",
    )
    .unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    let mut supervisor = supervisor_in(dir.path(), "_trap");
    let pid = supervisor.start(dir.path(), "ignore_int.sh").unwrap();
    // Let the shell install its trap.
    thread::sleep(Duration::from_millis(300));
    assert!(is_running(pid));

    let started = Instant::now();
    supervisor.stop();
    assert!(!is_running(pid));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn second_start_replaces_the_first_process() {
    let dir = tempfile::tempdir().unwrap();
    let mut supervisor = supervisor_in(dir.path(), "_twice");

    let first = supervisor.start(dir.path(), "/bin/sleep 30").unwrap();
    let second = supervisor.start(dir.path(), "/bin/sleep\t30").unwrap();

    assert_ne!(first, second);
    assert!(!is_running(first));
    assert!(is_running(second));
    assert_eq!(supervisor.pid(), Some(second));
    supervisor.stop();
    assert!(!is_running(second));
}

#[test]
fn missing_pid_file_is_a_start_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mut supervisor = supervisor_in(&dir.path().join("no-such-dir"), "_nopid");

    let err = supervisor.start(dir.path(), "/bin/sleep 30").unwrap_err();
    assert!(matches!(err, WatchError::ProcessStart(_)));
    assert_eq!(supervisor.pid(), None);
    assert_eq!(supervisor.state(), SupervisorState::Idle);

    // The fork exited before the parent stopped waiting; it must not linger.
    let me = std::process::id() as i32;
    assert!(wait_until(Duration::from_millis(500), || {
        !ProcessTable::capture()
            .entries()
            .iter()
            .any(|info| info.ppid == me && info.is_zombie())
    }));
}

#[test]
fn missing_work_dir_is_a_start_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mut supervisor = supervisor_in(dir.path(), "_nodir");

    let err = supervisor
        .start(dir.path().join("not-a-dir"), "/bin/sleep 30")
        .unwrap_err();
    assert!(matches!(err, WatchError::ProcessStart(_)));
    assert_eq!(supervisor.pid(), None);
    assert_eq!(supervisor.state(), SupervisorState::Idle);
    assert!(!dir.path().join("pid_nodir").exists());
}

#[test]
fn started_process_is_running_and_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let mut supervisor = supervisor_in(dir.path(), "_handle");

    let pid = supervisor.start(dir.path(), "/bin/sleep  30").unwrap();
    assert!(supervisor.tracked_is_running());
    let handle = supervisor.handle();
    assert_eq!(handle.pid, Some(pid));
    assert_eq!(handle.work_dir, dir.path());
    assert_eq!(handle.pid_file, dir.path().join("pid_handle"));
    supervisor.stop();
}

#[test]
fn drop_stops_the_child() {
    let dir = tempfile::tempdir().unwrap();
    let pid = {
        let mut supervisor = supervisor_in(dir.path(), "_drop");
        supervisor.start(dir.path(), "/bin/sleep 30").unwrap()
    };
    assert!(!is_running(pid));
}
