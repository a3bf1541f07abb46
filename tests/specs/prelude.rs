//! Test helpers for behavioral specifications.
//!
//! Provides a small DSL over a temporary shared root: stub agent
//! scripts, task producers, process guards, and file polling.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

/// Default polling budget for file assertions.
pub const WAIT_MAX: Duration = Duration::from_secs(10);
pub const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Directories that may hold freshly built workspace binaries, in
/// preference order: the llvm-cov target (coverage runs), the normal
/// debug profile, and the directory two levels above the running test
/// binary (target/debug/deps/specs-<hash> → target/debug), which still
/// resolves when CARGO_MANIFEST_DIR is stale.
fn candidate_build_dirs() -> Vec<PathBuf> {
    let target = Path::new(env!("CARGO_MANIFEST_DIR")).join("target");
    let mut dirs = vec![
        target.join("llvm-cov-target").join("debug"),
        target.join("debug"),
    ];
    if let Ok(test_exe) = std::env::current_exe() {
        if let Some(profile_dir) = test_exe.ancestors().nth(2) {
            dirs.push(profile_dir.to_path_buf());
        }
    }
    dirs
}

/// Locate a workspace binary by name, panicking with the searched
/// locations if it has not been built yet.
fn binary_path(name: &str) -> PathBuf {
    let dirs = candidate_build_dirs();
    dirs.iter()
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.exists())
        .unwrap_or_else(|| {
            panic!("binary {name:?} not found in {dirs:?}; build the workspace first")
        })
}

pub fn worker_watcher_binary() -> PathBuf {
    binary_path("worker-watcher")
}

pub fn orchestrator_listener_binary() -> PathBuf {
    binary_path("orchestrator-listener")
}

/// Grab an ephemeral TCP port for a worker's metrics endpoint.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// A temporary shared root plus helpers for producing tasks and stubs.
pub struct Fabric {
    root: tempfile::TempDir,
}

impl Fabric {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.path().join(rel)
    }

    /// Write an executable stub agent script and return its path.
    pub fn stub_agent(&self, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let bin_dir = self.path("bin");
        std::fs::create_dir_all(&bin_dir).unwrap();
        let script = bin_dir.join(name);
        std::fs::write(&script, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    /// Drop a task file for `worker`.
    pub fn write_task(&self, worker: &str, task_id: &str, description: &str) -> PathBuf {
        let dir = self.path(&format!("tasks/{worker}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("{task_id}.json"));
        let body = serde_json::json!({
            "task_id": task_id,
            "worker": worker,
            "description": description,
        });
        std::fs::write(&path, serde_json::to_vec(&body).unwrap()).unwrap();
        path
    }

    pub fn result_file(&self, worker: &str, task_id: &str) -> PathBuf {
        self.path(&format!("results/{worker}/{task_id}.json"))
    }

    pub fn dlq_file(&self, worker: &str, task_id: &str) -> PathBuf {
        self.path(&format!("dlq/{worker}/{task_id}.json"))
    }

    pub fn heartbeat_file(&self, worker: &str) -> PathBuf {
        self.path(&format!("heartbeats/{worker}.json"))
    }

    pub fn read_json(&self, path: &Path) -> serde_json::Value {
        let bytes = std::fs::read(path)
            .unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()));
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|e| panic!("malformed JSON in {}: {e}", path.display()))
    }

    /// Spawn a worker-watcher with the given env overrides.
    pub fn spawn_watcher(&self, worker: &str, envs: &[(&str, &str)]) -> ProcGuard {
        let port = free_port();
        let mut cmd = Command::new(worker_watcher_binary());
        cmd.arg(worker)
            .env("SHARED_ROOT", self.root())
            .env("METRICS_PORT", port.to_string())
            .env("LOG_LEVEL", "info")
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        for (key, value) in envs {
            cmd.env(key, value);
        }
        let mut guard = ProcGuard::spawn(cmd);
        guard.metrics_port = port;
        guard
    }

    /// Spawn an orchestrator-listener for the given workers.
    pub fn spawn_listener(&self, workers: &[&str], envs: &[(&str, &str)]) -> ProcGuard {
        let mut cmd = Command::new(orchestrator_listener_binary());
        if !workers.is_empty() {
            cmd.arg("--workers").arg(workers.join(","));
        }
        cmd.env("SHARED_ROOT", self.root())
            .env("LOG_LEVEL", "info")
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        for (key, value) in envs {
            cmd.env(key, value);
        }
        ProcGuard::spawn(cmd)
    }
}

/// Child process that is killed when the guard drops.
pub struct ProcGuard {
    child: Option<Child>,
    /// Metrics port assigned at spawn time (workers only).
    pub metrics_port: u16,
}

impl ProcGuard {
    fn spawn(mut cmd: Command) -> Self {
        let child = cmd.spawn().expect("failed to spawn binary");
        Self {
            child: Some(child),
            metrics_port: 0,
        }
    }

    pub fn pid(&self) -> u32 {
        self.child.as_ref().map(|c| c.id()).unwrap_or(0)
    }

    fn signal(&self, sig: &str) {
        let _ = Command::new("kill")
            .arg(sig)
            .arg(self.pid().to_string())
            .status();
    }

    pub fn sigterm(&self) {
        self.signal("-TERM");
    }

    pub fn sigstop(&self) {
        self.signal("-STOP");
    }

    pub fn sigkill(&mut self) {
        if let Some(child) = &mut self.child {
            let _ = child.kill();
            let _ = child.wait();
        }
        self.child = None;
    }

    /// Wait for exit, panicking if the process outlives the timeout.
    pub fn wait_exit(&mut self, timeout: Duration) -> std::process::ExitStatus {
        let deadline = Instant::now() + timeout;
        loop {
            let polled = self
                .child
                .as_mut()
                .expect("process already reaped")
                .try_wait()
                .unwrap();
            if let Some(status) = polled {
                self.child = None;
                return status;
            }
            assert!(
                Instant::now() < deadline,
                "process did not exit within {timeout:?}"
            );
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Drop for ProcGuard {
    fn drop(&mut self) {
        if let Some(child) = &mut self.child {
            // SIGCONT first in case a spec suspended it.
            let _ = Command::new("kill")
                .arg("-CONT")
                .arg(child.id().to_string())
                .status();
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Poll until `pred` holds or the timeout expires.
pub fn wait_until(timeout: Duration, mut pred: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if pred() {
            return true;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    pred()
}

/// Poll until `path` exists.
pub fn wait_for_file(path: &Path, timeout: Duration) -> bool {
    wait_until(timeout, || path.exists())
}

/// Blocking HTTP GET returning the raw response (for `/metrics`).
pub fn http_get(port: u16, target: &str) -> String {
    use std::io::{Read, Write};

    let mut stream = std::net::TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    write!(stream, "GET {target} HTTP/1.0\r\nHost: localhost\r\n\r\n").unwrap();
    let mut response = String::new();
    let _ = stream.read_to_string(&mut response);
    response
}
