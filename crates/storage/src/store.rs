// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator state persistence.
//!
//! The listener's aggregate [`FleetState`] is snapshotted to
//! `state/orchestrator.json`. A corrupt snapshot is archived rather than
//! deleted so the incident can be inspected; recovery is a fresh
//! filesystem reconciliation.

use crate::atomic::{write_json_atomic, AtomicWriteError};
use chrono::{DateTime, Utc};
use fabric_core::FleetState;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Write(#[from] AtomicWriteError),
}

/// On-disk snapshot envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedState {
    saved_at: DateTime<Utc>,
    fleet: FleetState,
}

/// What loading the snapshot found.
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(FleetState),
    /// No snapshot yet (first run).
    Missing,
    /// Malformed JSON; the file was archived for inspection.
    Corrupt { archived_to: PathBuf },
}

/// Atomic JSON persistence for [`FleetState`].
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist the fleet state atomically.
    pub fn save(&self, fleet: &FleetState, now: DateTime<Utc>) -> Result<(), StateStoreError> {
        let persisted = PersistedState {
            saved_at: now,
            fleet: fleet.clone(),
        };
        write_json_atomic(&self.path, &persisted)?;
        Ok(())
    }

    /// Load the last snapshot.
    ///
    /// Malformed JSON is moved to `<path>.corrupt-<epoch_ms>` and
    /// reported as [`LoadOutcome::Corrupt`]; callers rebuild from the
    /// filesystem ground truth.
    pub fn load(&self, now: DateTime<Utc>) -> Result<LoadOutcome, StateStoreError> {
        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LoadOutcome::Missing);
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<PersistedState>(&content) {
            Ok(persisted) => Ok(LoadOutcome::Loaded(persisted.fleet)),
            Err(error) => {
                let archived_to = self.corrupt_path(now);
                warn!(
                    %error,
                    path = %self.path.display(),
                    archive = %archived_to.display(),
                    "corrupt state snapshot, archiving and rebuilding from filesystem",
                );
                fs::rename(&self.path, &archived_to)?;
                Ok(LoadOutcome::Corrupt { archived_to })
            }
        }
    }

    fn corrupt_path(&self, now: DateTime<Utc>) -> PathBuf {
        PathBuf::from(format!(
            "{}.corrupt-{}",
            self.path.display(),
            now.timestamp_millis()
        ))
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
