//! Fleet listener: a frozen worker is reported unresponsive.

use crate::prelude::*;
use std::time::Duration;

#[test]
fn frozen_worker_raises_unresponsive_trigger() {
    let fabric = Fabric::new();
    let agent = fabric.stub_agent("agent-ok.sh", "echo hi");

    let worker = fabric.spawn_watcher(
        "marie",
        &[
            ("AGENT_COMMAND", agent.to_str().unwrap()),
            ("HEARTBEAT_INTERVAL", "1"),
        ],
    );
    assert!(wait_for_file(&fabric.heartbeat_file("marie"), WAIT_MAX));

    let _listener = fabric.spawn_listener(
        &["marie"],
        &[("LISTENER_TICK", "1"), ("HEARTBEAT_INTERVAL", "1")],
    );

    // Freeze the worker: heartbeats stop, the process stays alive.
    worker.sigstop();

    // Within 3x the heartbeat interval (plus tick slack) the listener
    // must notice and raise a trigger.
    let triggers_dir = fabric.path("triggers/orchestrator");
    assert!(
        wait_until(Duration::from_secs(15), || {
            std::fs::read_dir(&triggers_dir)
                .map(|entries| {
                    entries.flatten().any(|e| {
                        e.file_name()
                            .to_string_lossy()
                            .starts_with("worker_unresponsive_marie_")
                    })
                })
                .unwrap_or(false)
        }),
        "no unresponsive trigger for the frozen worker"
    );
}

#[test]
fn cleanly_stopped_worker_is_not_reported() {
    let fabric = Fabric::new();
    let agent = fabric.stub_agent("agent-ok.sh", "echo hi");

    let mut worker = fabric.spawn_watcher(
        "marie",
        &[
            ("AGENT_COMMAND", agent.to_str().unwrap()),
            ("HEARTBEAT_INTERVAL", "1"),
        ],
    );
    assert!(wait_for_file(&fabric.heartbeat_file("marie"), WAIT_MAX));

    let _listener = fabric.spawn_listener(
        &["marie"],
        &[("LISTENER_TICK", "1"), ("HEARTBEAT_INTERVAL", "1")],
    );

    worker.sigterm();
    let status = worker.wait_exit(Duration::from_secs(15));
    assert!(status.success());

    // Well past the staleness threshold: still no incident.
    std::thread::sleep(Duration::from_secs(5));
    let triggers_dir = fabric.path("triggers/orchestrator");
    let unresponsive = std::fs::read_dir(&triggers_dir)
        .map(|entries| {
            entries.flatten().any(|e| {
                e.file_name()
                    .to_string_lossy()
                    .starts_with("worker_unresponsive_")
            })
        })
        .unwrap_or(false);
    assert!(!unresponsive, "stopped worker was reported unresponsive");
}
