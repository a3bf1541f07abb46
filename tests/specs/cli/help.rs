//! CLI surface: flags, help, and startup-failure exit discipline.

use crate::prelude::*;

#[test]
fn worker_watcher_help_exits_zero() {
    let assert = assert_cmd::Command::new(worker_watcher_binary())
        .arg("--help")
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    assert!(stdout.contains("worker-watcher"));
}

#[test]
fn worker_watcher_requires_a_worker_name() {
    assert_cmd::Command::new(worker_watcher_binary())
        .assert()
        .failure();
}

#[test]
fn worker_watcher_rejects_invalid_config() {
    let fabric = Fabric::new();
    assert_cmd::Command::new(worker_watcher_binary())
        .arg("marie")
        .arg("--max-concurrent")
        .arg("0")
        .env("SHARED_ROOT", fabric.root())
        .assert()
        .failure();
}

#[test]
fn worker_watcher_rejects_unparseable_env() {
    let fabric = Fabric::new();
    assert_cmd::Command::new(worker_watcher_binary())
        .arg("marie")
        .env("SHARED_ROOT", fabric.root())
        .env("MAX_CONCURRENT_TASKS", "lots")
        .assert()
        .failure();
}

#[test]
fn orchestrator_listener_help_exits_zero() {
    let assert = assert_cmd::Command::new(orchestrator_listener_binary())
        .arg("--help")
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    assert!(stdout.contains("orchestrator-listener"));
}

#[test]
fn worker_watcher_rejects_bad_log_format() {
    let fabric = Fabric::new();
    assert_cmd::Command::new(worker_watcher_binary())
        .arg("marie")
        .arg("--log-format")
        .arg("yaml")
        .env("SHARED_ROOT", fabric.root())
        .assert()
        .failure();
}
