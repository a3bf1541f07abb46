// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Directory watching via kernel file notifications.
//!
//! Wraps `notify` to produce new-`.json`-file events on a channel. The
//! watcher thread suspends on kernel events; nothing polls. Callers run
//! [`scan_json_dir`] once at startup to recover files that appeared
//! while no watcher was alive.

use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors establishing or scanning a watch. Fatal at startup.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to watch {path}: {source}")]
    SetupFailed {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("failed to scan {path}: {source}")]
    ScanFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Keeps the underlying OS watch registered; dropping it stops events.
#[derive(Debug)]
pub struct DirWatcher {
    _watcher: RecommendedWatcher,
}

/// True for visible `*.json` files (tmp siblings and dotfiles excluded).
fn is_json_file(path: &Path) -> bool {
    let visible = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| !n.starts_with('.'));
    visible && path.extension().is_some_and(|ext| ext == "json")
}

/// A new file lands in a watched directory either by direct creation or
/// by rename (the atomic-write discipline renames tmp files in).
fn is_arrival(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Name(
                RenameMode::To | RenameMode::Both | RenameMode::Any
            ))
    )
}

/// Watch `dir` for arriving `.json` files, sending each path on `tx`.
///
/// Events for files already present are NOT emitted; pair with
/// [`scan_json_dir`] for restart recovery. Send failures after the
/// receiver closes are ignored (the consumer is shutting down).
pub fn watch_json_dir(dir: &Path, tx: mpsc::Sender<PathBuf>) -> Result<DirWatcher, WatchError> {
    let mut watcher =
        notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
            let event = match res {
                Ok(event) => event,
                Err(error) => {
                    tracing::warn!(%error, "file watcher error event");
                    return;
                }
            };
            if !is_arrival(&event.kind) {
                return;
            }
            for path in event.paths {
                if is_json_file(&path) {
                    let _ = tx.blocking_send(path);
                }
            }
        })
        .map_err(|source| WatchError::SetupFailed {
            path: dir.to_path_buf(),
            source,
        })?;

    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .map_err(|source| WatchError::SetupFailed {
            path: dir.to_path_buf(),
            source,
        })?;

    Ok(DirWatcher { _watcher: watcher })
}

/// One-shot scan for pre-existing `.json` files, oldest first.
pub fn scan_json_dir(dir: &Path) -> Result<Vec<PathBuf>, WatchError> {
    let entries = std::fs::read_dir(dir).map_err(|source| WatchError::ScanFailed {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<(SystemTime, PathBuf)> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| is_json_file(path))
        .map(|path| {
            let modified = std::fs::metadata(&path)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, path)
        })
        .collect();

    files.sort();
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

#[cfg(test)]
#[path = "fs_watch_tests.rs"]
mod tests;
