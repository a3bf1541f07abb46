//! Fleet listener: completion aggregation end to end.

use crate::prelude::*;
use std::time::Duration;

fn result_json(worker: &str, task_id: &str, final_status: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "task_id": task_id,
        "worker": worker,
        "description": "echo hi",
        "attempts": [{
            "attempt_number": 1,
            "started_at": "2026-01-05T12:00:00Z",
            "finished_at": "2026-01-05T12:00:01Z",
            "exit_status": if final_status == "completed" { "success" } else { "failed" },
            "stdout_excerpt": "",
            "stderr_excerpt": "",
            "duration_seconds": 1.0,
        }],
        "final_status": final_status,
        "completed_at": "2026-01-05T12:00:01Z",
    }))
    .unwrap()
}

#[test]
fn result_file_raises_done_trigger_and_persists_state() {
    let fabric = Fabric::new();
    let _listener = fabric.spawn_listener(&["marie"], &[("LISTENER_TICK", "1")]);

    // Listener creates its watch dirs at startup.
    let results_dir = fabric.path("results/marie");
    assert!(wait_until(WAIT_MAX, || results_dir.exists()));

    // Simulate a worker's atomic write: tmp sibling, then rename in.
    let tmp = results_dir.join("t9.tmp");
    std::fs::write(&tmp, result_json("marie", "t9", "completed")).unwrap();
    std::fs::rename(&tmp, results_dir.join("t9.json")).unwrap();

    let trigger = fabric.path("triggers/orchestrator/t9.done");
    assert!(
        wait_for_file(&trigger, Duration::from_secs(5)),
        "completion trigger not raised"
    );

    // Aggregate state is persisted with the completion.
    let state_path = fabric.path("state/orchestrator.json");
    assert!(wait_until(WAIT_MAX, || {
        state_path.exists()
            && fabric.read_json(&state_path)["fleet"]["tasks"]["t9"]["state"] == "completed"
    }));
}

#[test]
fn dlq_file_is_aggregated_as_dead_lettered() {
    let fabric = Fabric::new();
    let _listener = fabric.spawn_listener(&["marie"], &[("LISTENER_TICK", "1")]);

    let dlq_dir = fabric.path("dlq/marie");
    assert!(wait_until(WAIT_MAX, || dlq_dir.exists()));

    let tmp = dlq_dir.join("t8.tmp");
    std::fs::write(&tmp, result_json("marie", "t8", "dead_lettered")).unwrap();
    std::fs::rename(&tmp, dlq_dir.join("t8.json")).unwrap();

    assert!(wait_for_file(
        &fabric.path("triggers/orchestrator/t8.done"),
        WAIT_MAX
    ));

    let state_path = fabric.path("state/orchestrator.json");
    assert!(wait_until(WAIT_MAX, || {
        state_path.exists()
            && fabric.read_json(&state_path)["fleet"]["tasks"]["t8"]["state"] == "dead_lettered"
    }));
}

#[test]
fn restart_rebuilds_state_from_results_on_disk() {
    let fabric = Fabric::new();

    // Results written while no listener was alive.
    let results_dir = fabric.path("results/marie");
    std::fs::create_dir_all(&results_dir).unwrap();
    std::fs::write(
        results_dir.join("t7.json"),
        result_json("marie", "t7", "completed"),
    )
    .unwrap();

    let _listener = fabric.spawn_listener(&["marie"], &[("LISTENER_TICK", "1")]);

    let state_path = fabric.path("state/orchestrator.json");
    assert!(wait_until(WAIT_MAX, || {
        state_path.exists()
            && fabric.read_json(&state_path)["fleet"]["tasks"]["t7"]["state"] == "completed"
    }));
}
