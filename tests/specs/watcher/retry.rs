//! Retry with exponential backoff: fail twice, succeed on the third try.

use crate::prelude::*;

/// Stub that fails its first two invocations and succeeds afterwards,
/// tracking attempts in a sibling counter file.
const FLAKY_AGENT: &str = r#"
count_file="$0.count"
n=$(cat "$count_file" 2>/dev/null || echo 0)
n=$((n+1))
echo "$n" > "$count_file"
if [ "$n" -lt 3 ]; then
    echo "transient failure $n" >&2
    exit 1
fi
echo "recovered"
"#;

#[test]
fn fails_twice_then_succeeds_with_backoff() {
    let fabric = Fabric::new();
    let agent = fabric.stub_agent("agent-flaky.sh", FLAKY_AGENT);
    let _worker = fabric.spawn_watcher(
        "marie",
        &[
            ("AGENT_COMMAND", agent.to_str().unwrap()),
            ("MAX_RETRIES", "3"),
            ("INITIAL_RETRY_DELAY", "1"),
            ("RETRY_BACKOFF", "2"),
        ],
    );

    assert!(wait_for_file(&fabric.heartbeat_file("marie"), WAIT_MAX));
    fabric.write_task("marie", "t1", "do the work");

    let result_path = fabric.result_file("marie", "t1");
    // 1s + 2s of backoff plus execution; allow slack.
    assert!(wait_for_file(&result_path, std::time::Duration::from_secs(20)));

    let result = fabric.read_json(&result_path);
    assert_eq!(result["final_status"], "completed");

    let attempts = result["attempts"].as_array().unwrap();
    assert_eq!(attempts.len(), 3);
    assert_eq!(attempts[0]["exit_status"], "failed");
    assert_eq!(attempts[1]["exit_status"], "failed");
    assert_eq!(attempts[2]["exit_status"], "success");
    assert!(attempts[0]["stderr_excerpt"]
        .as_str()
        .unwrap()
        .contains("transient failure 1"));

    // Backoff: the third attempt starts at least 1s + 2s after the first.
    let first = seconds_of_day(&attempts[0]["started_at"]);
    let mut third = seconds_of_day(&attempts[2]["started_at"]);
    if third < first {
        third += 86_400.0;
    }
    assert!(third - first >= 3.0, "attempts were not spaced by backoff");
}

/// Seconds-of-day from an RFC 3339 timestamp; spacing is all that
/// matters here, so no date parsing library is needed.
fn seconds_of_day(value: &serde_json::Value) -> f64 {
    let s = value.as_str().unwrap();
    let time = s.split('T').nth(1).unwrap().trim_end_matches('Z');
    let mut parts = time.split(':');
    let h: f64 = parts.next().unwrap().parse().unwrap();
    let m: f64 = parts.next().unwrap().parse().unwrap();
    let sec: f64 = parts.next().unwrap().parse().unwrap();
    h * 3600.0 + m * 60.0 + sec
}
