//! Dead-letter queue: retry exhaustion and invalid payloads.

use crate::prelude::*;

#[test]
fn exhausted_retries_land_in_dlq() {
    let fabric = Fabric::new();
    let agent = fabric.stub_agent("agent-fail.sh", "echo broken >&2\nexit 1");
    let _worker = fabric.spawn_watcher(
        "marie",
        &[
            ("AGENT_COMMAND", agent.to_str().unwrap()),
            ("MAX_RETRIES", "2"),
            ("INITIAL_RETRY_DELAY", "0"),
        ],
    );

    assert!(wait_for_file(&fabric.heartbeat_file("marie"), WAIT_MAX));
    let task_path = fabric.write_task("marie", "t2", "doomed");

    let dlq_path = fabric.dlq_file("marie", "t2");
    assert!(wait_for_file(&dlq_path, WAIT_MAX));

    let record = fabric.read_json(&dlq_path);
    assert_eq!(record["final_status"], "dead_lettered");
    let attempts = record["attempts"].as_array().unwrap();
    assert_eq!(attempts.len(), 3);
    for attempt in attempts {
        assert_eq!(attempt["exit_status"], "failed");
        assert!(attempt["stderr_excerpt"]
            .as_str()
            .unwrap()
            .contains("broken"));
    }

    // Exactly one terminal record: no result file, task consumed.
    assert!(!fabric.result_file("marie", "t2").exists());
    assert!(wait_until(WAIT_MAX, || !task_path.exists()));
}

#[test]
fn invalid_payload_is_dead_lettered_without_retry() {
    let fabric = Fabric::new();
    let agent = fabric.stub_agent("agent-ok.sh", "echo hi");
    let _worker = fabric.spawn_watcher("marie", &[("AGENT_COMMAND", agent.to_str().unwrap())]);

    assert!(wait_for_file(&fabric.heartbeat_file("marie"), WAIT_MAX));

    // Not valid task JSON at all.
    let dir = fabric.path("tasks/marie");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("t3.json"), b"{this is not json").unwrap();

    let dlq_path = fabric.dlq_file("marie", "t3");
    assert!(wait_for_file(&dlq_path, WAIT_MAX));

    let record = fabric.read_json(&dlq_path);
    assert_eq!(record["final_status"], "dead_lettered");
    let attempts = record["attempts"].as_array().unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0]["exit_status"], "invalid_payload");
}

#[test]
fn task_id_mismatch_is_invalid_payload() {
    let fabric = Fabric::new();
    let agent = fabric.stub_agent("agent-ok.sh", "echo hi");
    let _worker = fabric.spawn_watcher("marie", &[("AGENT_COMMAND", agent.to_str().unwrap())]);

    assert!(wait_for_file(&fabric.heartbeat_file("marie"), WAIT_MAX));

    let dir = fabric.path("tasks/marie");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("t4.json"),
        br#"{"task_id": "different", "worker": "marie", "description": "x"}"#,
    )
    .unwrap();

    let dlq_path = fabric.dlq_file("marie", "t4");
    assert!(wait_for_file(&dlq_path, WAIT_MAX));
    let record = fabric.read_json(&dlq_path);
    assert_eq!(record["attempts"][0]["exit_status"], "invalid_payload");
}
