//! Graceful shutdown: SIGTERM drains and the final heartbeat says so.

use crate::prelude::*;
use std::time::Duration;

#[test]
fn sigterm_exits_zero_with_stopped_heartbeat() {
    let fabric = Fabric::new();
    let agent = fabric.stub_agent("agent-ok.sh", "echo hi");
    let mut worker = fabric.spawn_watcher(
        "marie",
        &[
            ("AGENT_COMMAND", agent.to_str().unwrap()),
            ("HEARTBEAT_INTERVAL", "1"),
        ],
    );

    let hb_path = fabric.heartbeat_file("marie");
    assert!(wait_until(WAIT_MAX, || {
        hb_path.exists() && fabric.read_json(&hb_path)["status"] == "alive"
    }));

    worker.sigterm();
    let status = worker.wait_exit(Duration::from_secs(15));
    assert!(status.success(), "expected clean exit, got {status:?}");

    let hb = fabric.read_json(&hb_path);
    assert_eq!(hb["status"], "stopped");
}

#[test]
fn in_flight_attempt_finishes_before_stop() {
    let fabric = Fabric::new();
    // Slow enough to overlap with SIGTERM, fast enough for the drain.
    let agent = fabric.stub_agent("agent-slowish.sh", "sleep 2\necho finished");
    let mut worker = fabric.spawn_watcher(
        "marie",
        &[
            ("AGENT_COMMAND", agent.to_str().unwrap()),
            ("HEARTBEAT_INTERVAL", "1"),
            ("TASK_TIMEOUT", "30"),
        ],
    );

    assert!(wait_for_file(&fabric.heartbeat_file("marie"), WAIT_MAX));
    fabric.write_task("marie", "t1", "slow but finishes");

    // Wait for the attempt to be in flight, then request shutdown.
    let hb_path = fabric.heartbeat_file("marie");
    assert!(wait_until(WAIT_MAX, || {
        fabric.read_json(&hb_path)["active_tasks"] == 1
    }));
    worker.sigterm();

    let status = worker.wait_exit(Duration::from_secs(60));
    assert!(status.success());

    // The drained attempt produced its result before the final beat.
    let result_path = fabric.result_file("marie", "t1");
    assert!(result_path.exists(), "in-flight task was not drained");
    assert_eq!(fabric.read_json(&hb_path)["status"], "stopped");

    // Nothing gets written after stopped: the task is fully consumed.
    assert!(!fabric.path("tasks/marie/t1.json").exists());
}
