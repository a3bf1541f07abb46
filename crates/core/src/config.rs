// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime configuration and shared-root path derivation.
//!
//! Settings come from environment variables with documented defaults;
//! CLI flags override env at the binary layer. Configs are immutable
//! after construction and validated up front so bad deployments fail at
//! startup instead of mid-dispatch.

use crate::retry::RetryPolicy;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default shared filesystem root when `SHARED_ROOT` is unset.
pub const DEFAULT_SHARED_ROOT: &str = "/var/lib/fabric";

/// Configuration errors are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },

    #[error("failed to create directory {path}: {source}")]
    DirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            name,
            reason: reason.into(),
        }
    }
}

/// Log encoding selected via `LOG_FORMAT` / `--log-format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::invalid(
                "log_format",
                format!("expected 'text' or 'json', got {other:?}"),
            )),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

fn env_string(name: &'static str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn env_u64(name: &'static str) -> Result<Option<u64>, ConfigError> {
    match env_string(name) {
        Some(s) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::invalid(name, format!("expected integer, got {s:?}"))),
        None => Ok(None),
    }
}

fn env_f64(name: &'static str) -> Result<Option<f64>, ConfigError> {
    match env_string(name) {
        Some(s) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| ConfigError::invalid(name, format!("expected number, got {s:?}"))),
        None => Ok(None),
    }
}

fn env_secs(name: &'static str) -> Result<Option<Duration>, ConfigError> {
    Ok(env_u64(name)?.map(Duration::from_secs))
}

/// Immutable per-worker runtime settings.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub worker_name: String,
    pub shared_root: PathBuf,
    /// Upper bound on simultaneous attempts.
    pub max_concurrent_tasks: usize,
    pub task_timeout: Duration,
    pub max_retries: u32,
    pub initial_retry_delay: Duration,
    pub retry_backoff_multiplier: f64,
    pub retry_max_delay: Duration,
    pub circuit_failure_threshold: u32,
    pub circuit_open_duration: Duration,
    pub heartbeat_interval: Duration,
    pub metrics_port: u16,
    pub log_format: LogFormat,
    /// Timeout on advisory lock acquisition.
    pub lock_wait: Duration,
    /// Cadence of the tasks-directory rescan that re-offers deferred work.
    pub rescan_interval: Duration,
    /// Agent CLI invoked per task; the task description is appended
    /// after `-p`.
    pub agent_command: String,
}

impl WatcherConfig {
    /// Defaults for `worker_name` under `shared_root`, not yet validated.
    pub fn new(worker_name: impl Into<String>, shared_root: impl Into<PathBuf>) -> Self {
        Self {
            worker_name: worker_name.into(),
            shared_root: shared_root.into(),
            max_concurrent_tasks: 3,
            task_timeout: Duration::from_secs(600),
            max_retries: 3,
            initial_retry_delay: Duration::from_secs(1),
            retry_backoff_multiplier: 2.0,
            retry_max_delay: Duration::from_secs(60),
            circuit_failure_threshold: 5,
            circuit_open_duration: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(10),
            metrics_port: 9090,
            log_format: LogFormat::Text,
            lock_wait: Duration::from_secs(30),
            rescan_interval: Duration::from_secs(10),
            agent_command: "claude".to_string(),
        }
    }

    /// Build from environment variables, validated.
    pub fn from_env(worker_name: impl Into<String>) -> Result<Self, ConfigError> {
        let shared_root = env_string("SHARED_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SHARED_ROOT));
        let mut config = Self::new(worker_name, shared_root);

        if let Some(n) = env_u64("MAX_CONCURRENT_TASKS")? {
            config.max_concurrent_tasks = n as usize;
        }
        if let Some(d) = env_secs("TASK_TIMEOUT")? {
            config.task_timeout = d;
        }
        if let Some(n) = env_u64("MAX_RETRIES")? {
            config.max_retries = n as u32;
        }
        if let Some(d) = env_secs("INITIAL_RETRY_DELAY")? {
            config.initial_retry_delay = d;
        }
        if let Some(m) = env_f64("RETRY_BACKOFF")? {
            config.retry_backoff_multiplier = m;
        }
        if let Some(d) = env_secs("RETRY_MAX_DELAY")? {
            config.retry_max_delay = d;
        }
        if let Some(n) = env_u64("CIRCUIT_THRESHOLD")? {
            config.circuit_failure_threshold = n as u32;
        }
        if let Some(d) = env_secs("CIRCUIT_OPEN_DURATION")? {
            config.circuit_open_duration = d;
        }
        if let Some(d) = env_secs("HEARTBEAT_INTERVAL")? {
            config.heartbeat_interval = d;
        }
        if let Some(p) = env_u64("METRICS_PORT")? {
            config.metrics_port = u16::try_from(p)
                .map_err(|_| ConfigError::invalid("METRICS_PORT", format!("{p} out of range")))?;
        }
        if let Some(s) = env_string("LOG_FORMAT") {
            config.log_format = s.parse()?;
        }
        if let Some(d) = env_secs("LOCK_WAIT")? {
            config.lock_wait = d;
        }
        if let Some(d) = env_secs("RESCAN_INTERVAL")? {
            config.rescan_interval = d;
        }
        if let Some(cmd) = env_string("AGENT_COMMAND") {
            config.agent_command = cmd;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values outside documented ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_name.trim().is_empty() {
            return Err(ConfigError::invalid("worker_name", "must not be empty"));
        }
        if self.worker_name.contains(['/', '\\']) || self.worker_name.starts_with('.') {
            return Err(ConfigError::invalid(
                "worker_name",
                format!("{:?} is not filesystem-safe", self.worker_name),
            ));
        }
        if self.max_concurrent_tasks == 0 || self.max_concurrent_tasks > 64 {
            return Err(ConfigError::invalid(
                "max_concurrent_tasks",
                format!("{} outside 1..=64", self.max_concurrent_tasks),
            ));
        }
        if self.task_timeout.is_zero() {
            return Err(ConfigError::invalid("task_timeout", "must be positive"));
        }
        if self.max_retries > 20 {
            return Err(ConfigError::invalid(
                "max_retries",
                format!("{} exceeds 20", self.max_retries),
            ));
        }
        if self.retry_backoff_multiplier < 1.0 || !self.retry_backoff_multiplier.is_finite() {
            return Err(ConfigError::invalid(
                "retry_backoff_multiplier",
                format!("{} must be >= 1.0", self.retry_backoff_multiplier),
            ));
        }
        if self.retry_max_delay < self.initial_retry_delay {
            return Err(ConfigError::invalid(
                "retry_max_delay",
                "must be >= initial_retry_delay",
            ));
        }
        if self.circuit_failure_threshold == 0 {
            return Err(ConfigError::invalid(
                "circuit_failure_threshold",
                "must be >= 1",
            ));
        }
        if self.circuit_open_duration.is_zero() {
            return Err(ConfigError::invalid(
                "circuit_open_duration",
                "must be positive",
            ));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::invalid(
                "heartbeat_interval",
                "must be positive",
            ));
        }
        if self.metrics_port == 0 {
            return Err(ConfigError::invalid("metrics_port", "must be non-zero"));
        }
        if self.lock_wait.is_zero() {
            return Err(ConfigError::invalid("lock_wait", "must be positive"));
        }
        if self.rescan_interval.is_zero() {
            return Err(ConfigError::invalid("rescan_interval", "must be positive"));
        }
        if self.agent_command.trim().is_empty() {
            return Err(ConfigError::invalid("agent_command", "must not be empty"));
        }
        Ok(())
    }

    pub fn paths(&self) -> WorkerPaths {
        WorkerPaths::new(&self.shared_root, &self.worker_name)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: self.initial_retry_delay,
            backoff_multiplier: self.retry_backoff_multiplier,
            max_delay: self.retry_max_delay,
        }
    }

    /// Bounded queue capacity between the file watcher and the dispatcher.
    pub fn queue_capacity(&self) -> usize {
        self.max_concurrent_tasks * 8
    }

    /// Grace period for in-flight attempts during shutdown.
    pub fn drain_grace(&self) -> Duration {
        self.task_timeout + Duration::from_secs(10)
    }
}

/// Per-worker locations under the shared root.
#[derive(Debug, Clone)]
pub struct WorkerPaths {
    shared_root: PathBuf,
    worker: String,
}

impl WorkerPaths {
    pub fn new(shared_root: impl Into<PathBuf>, worker: impl Into<String>) -> Self {
        Self {
            shared_root: shared_root.into(),
            worker: worker.into(),
        }
    }

    pub fn worker(&self) -> &str {
        &self.worker
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.shared_root.join("tasks").join(&self.worker)
    }

    pub fn results_dir(&self) -> PathBuf {
        self.shared_root.join("results").join(&self.worker)
    }

    pub fn dlq_dir(&self) -> PathBuf {
        self.shared_root.join("dlq").join(&self.worker)
    }

    pub fn triggers_dir(&self) -> PathBuf {
        self.shared_root.join("triggers").join(&self.worker)
    }

    pub fn heartbeat_file(&self) -> PathBuf {
        self.shared_root
            .join("heartbeats")
            .join(format!("{}.json", self.worker))
    }

    pub fn task_file(&self, task_id: &str) -> PathBuf {
        self.tasks_dir().join(format!("{task_id}.json"))
    }

    pub fn result_file(&self, task_id: &str) -> PathBuf {
        self.results_dir().join(format!("{task_id}.json"))
    }

    pub fn dlq_file(&self, task_id: &str) -> PathBuf {
        self.dlq_dir().join(format!("{task_id}.json"))
    }

    pub fn done_trigger(&self, task_id: &str) -> PathBuf {
        self.triggers_dir().join(format!("{task_id}.done"))
    }

    /// Create every directory this worker writes into.
    pub fn ensure(&self) -> Result<(), ConfigError> {
        let heartbeats_dir = self.shared_root.join("heartbeats");
        for dir in [
            self.tasks_dir(),
            self.results_dir(),
            self.dlq_dir(),
            self.triggers_dir(),
            heartbeats_dir,
        ] {
            std::fs::create_dir_all(&dir)
                .map_err(|source| ConfigError::DirCreate { path: dir, source })?;
        }
        Ok(())
    }
}

/// Fleet-level locations for the orchestrator listener.
#[derive(Debug, Clone)]
pub struct FleetPaths {
    shared_root: PathBuf,
}

impl FleetPaths {
    pub fn new(shared_root: impl Into<PathBuf>) -> Self {
        Self {
            shared_root: shared_root.into(),
        }
    }

    pub fn shared_root(&self) -> &Path {
        &self.shared_root
    }

    pub fn heartbeats_dir(&self) -> PathBuf {
        self.shared_root.join("heartbeats")
    }

    pub fn orchestrator_triggers_dir(&self) -> PathBuf {
        self.shared_root.join("triggers").join("orchestrator")
    }

    pub fn state_file(&self) -> PathBuf {
        self.shared_root.join("state").join("orchestrator.json")
    }

    pub fn worker(&self, name: &str) -> WorkerPaths {
        WorkerPaths::new(&self.shared_root, name)
    }

    /// Discover worker names from subdirectories of `tasks/` and `results/`.
    pub fn discover_workers(&self) -> Vec<String> {
        let mut names = std::collections::BTreeSet::new();
        for parent in ["tasks", "results"] {
            let dir = self.shared_root.join(parent);
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    if let Some(name) = entry.file_name().to_str() {
                        names.insert(name.to_string());
                    }
                }
            }
        }
        names.into_iter().collect()
    }

    /// Create the directories the listener itself writes into.
    pub fn ensure(&self) -> Result<(), ConfigError> {
        let state_dir = self.shared_root.join("state");
        for dir in [
            self.orchestrator_triggers_dir(),
            self.heartbeats_dir(),
            state_dir,
        ] {
            std::fs::create_dir_all(&dir)
                .map_err(|source| ConfigError::DirCreate { path: dir, source })?;
        }
        Ok(())
    }
}

/// Immutable settings for the orchestrator listener.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub shared_root: PathBuf,
    /// Explicit worker list; empty means discover from the shared root.
    pub workers: Vec<String>,
    pub tick_interval: Duration,
    pub heartbeat_interval: Duration,
    /// Tasks in flight longer than this are marked timed out.
    pub fleet_task_timeout: Duration,
    pub log_format: LogFormat,
}

impl ListenerConfig {
    pub fn new(shared_root: impl Into<PathBuf>) -> Self {
        Self {
            shared_root: shared_root.into(),
            workers: Vec::new(),
            tick_interval: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(10),
            fleet_task_timeout: Duration::from_secs(1200),
            log_format: LogFormat::Text,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let shared_root = env_string("SHARED_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SHARED_ROOT));
        let mut config = Self::new(shared_root);

        if let Some(d) = env_secs("LISTENER_TICK")? {
            config.tick_interval = d;
        }
        if let Some(d) = env_secs("HEARTBEAT_INTERVAL")? {
            config.heartbeat_interval = d;
        }
        match env_secs("FLEET_TASK_TIMEOUT")? {
            Some(d) => config.fleet_task_timeout = d,
            // Default: 2x the worker task timeout.
            None => {
                if let Some(task_timeout) = env_secs("TASK_TIMEOUT")? {
                    config.fleet_task_timeout = task_timeout * 2;
                }
            }
        }
        if let Some(s) = env_string("LOG_FORMAT") {
            config.log_format = s.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval.is_zero() {
            return Err(ConfigError::invalid("tick_interval", "must be positive"));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::invalid(
                "heartbeat_interval",
                "must be positive",
            ));
        }
        if self.fleet_task_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "fleet_task_timeout",
                "must be positive",
            ));
        }
        for worker in &self.workers {
            if worker.trim().is_empty() || worker.contains(['/', '\\']) {
                return Err(ConfigError::invalid(
                    "workers",
                    format!("{worker:?} is not a valid worker name"),
                ));
            }
        }
        Ok(())
    }

    pub fn paths(&self) -> FleetPaths {
        FleetPaths::new(&self.shared_root)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
