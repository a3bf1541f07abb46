//! Happy path: a valid task produces exactly one completed result.

use crate::prelude::*;
use std::time::Duration;

#[test]
fn task_completes_within_five_seconds() {
    let fabric = Fabric::new();
    let agent = fabric.stub_agent("agent-ok.sh", "echo hi");
    let _worker = fabric.spawn_watcher(
        "marie",
        &[
            ("AGENT_COMMAND", agent.to_str().unwrap()),
            ("MAX_CONCURRENT_TASKS", "2"),
        ],
    );

    // Give the watcher a moment to establish its watch, then drop the task.
    assert!(wait_for_file(&fabric.heartbeat_file("marie"), WAIT_MAX));
    let task_path = fabric.write_task("marie", "t1", "echo hi");

    let result_path = fabric.result_file("marie", "t1");
    assert!(
        wait_for_file(&result_path, Duration::from_secs(5)),
        "result did not appear within 5s"
    );

    let result = fabric.read_json(&result_path);
    assert_eq!(result["task_id"], "t1");
    assert_eq!(result["worker"], "marie");
    assert_eq!(result["final_status"], "completed");
    assert_eq!(result["attempts"].as_array().unwrap().len(), 1);
    assert_eq!(result["attempts"][0]["exit_status"], "success");
    assert_eq!(result["attempts"][0]["stdout_excerpt"], "hi\n");

    // Original task is consumed; the trigger marks completion.
    assert!(wait_until(WAIT_MAX, || !task_path.exists()));
    assert!(fabric.path("triggers/marie/t1.done").exists());
    // No DLQ entry for a successful task.
    assert!(!fabric.dlq_file("marie", "t1").exists());
}

#[test]
fn metrics_endpoint_reports_processed_tasks() {
    let fabric = Fabric::new();
    let agent = fabric.stub_agent("agent-ok.sh", "echo hi");
    let worker = fabric.spawn_watcher("marie", &[("AGENT_COMMAND", agent.to_str().unwrap())]);

    assert!(wait_for_file(&fabric.heartbeat_file("marie"), WAIT_MAX));
    fabric.write_task("marie", "t1", "echo hi");
    assert!(wait_for_file(&fabric.result_file("marie", "t1"), WAIT_MAX));

    let response = http_get(worker.metrics_port, "/metrics");
    assert!(response.contains("200"), "unexpected response: {response}");
    assert!(response.contains("watcher_tasks_processed_total"));
    assert!(response.contains(r#"worker="marie""#));
    assert!(response.contains("watcher_circuit_breaker_state"));
}

#[test]
fn heartbeat_carries_vitals() {
    let fabric = Fabric::new();
    let agent = fabric.stub_agent("agent-ok.sh", "echo hi");
    let _worker = fabric.spawn_watcher(
        "marie",
        &[
            ("AGENT_COMMAND", agent.to_str().unwrap()),
            ("HEARTBEAT_INTERVAL", "1"),
        ],
    );

    let hb_path = fabric.heartbeat_file("marie");
    assert!(wait_for_file(&hb_path, WAIT_MAX));

    fabric.write_task("marie", "t1", "echo hi");
    assert!(wait_for_file(&fabric.result_file("marie", "t1"), WAIT_MAX));

    assert!(wait_until(WAIT_MAX, || {
        let hb = fabric.read_json(&hb_path);
        hb["status"] == "alive" && hb["completed_total"] == 1
    }));
    let hb = fabric.read_json(&hb_path);
    assert_eq!(hb["worker"], "marie");
    assert_eq!(hb["circuit_state"], "closed");
}
