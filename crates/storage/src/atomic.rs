// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic JSON file writes (tmp + fsync + rename).

use serde::Serialize;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AtomicWriteError {
    #[error("IO error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error for {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Write `value` as JSON to `path` atomically.
///
/// A crash mid-write leaves only the `.tmp` sibling behind; the
/// destination is either absent, the old content, or the new content.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), AtomicWriteError> {
    let io_err = |source: std::io::Error| AtomicWriteError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let tmp_path = path.with_extension("tmp");

    // Write to temp file and sync
    {
        let file = File::create(&tmp_path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, value).map_err(|source| AtomicWriteError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        let file = writer.into_inner().map_err(|e| io_err(e.into_error()))?;
        file.sync_all().map_err(io_err)?;
    }

    // Atomic rename
    fs::rename(&tmp_path, path).map_err(io_err)?;

    Ok(())
}

#[cfg(test)]
#[path = "atomic_tests.rs"]
mod tests;
