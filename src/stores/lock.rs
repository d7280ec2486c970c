/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Lock markers: the single-writer discipline over store directories.
//!
//! Every store directory holds a `LOCK` file for as long as some process has the store open. The file
//! contains the holder's process id.
//!
//! A [`LockMarker`] removes its file when dropped. A process that crashes cannot do that, so its
//! markers outlive it and keep blocking [`Exclusive`](LockPolicy::Exclusive) opens until either:
//! 1. A [`Reclaim`](LockPolicy::Reclaim) open takes the marker over (the repair protocol opens stores
//!    this way, since it runs before anything else in the process), or
//! 2. [`clear_locks`] removes every marker under the data directory.
//!
//! Both only touch a marker whose holder is gone: its process id does not name a running process, or
//! the file holds no process id at all (the holder crashed between creating and writing it). A
//! marker held by a running process, including the current one, always blocks.

use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    process,
};

use super::StoreError;

/// Name of the lock marker file inside a store directory.
pub const LOCK_FILE_NAME: &str = "LOCK";

/// What to do when a store directory already contains a lock marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockPolicy {
    /// Fail with [`StoreError::Locked`].
    Exclusive,

    /// Treat the marker as stale and take it over.
    Reclaim,
}

/// Held lock marker of one store directory.
#[derive(Debug)]
pub struct LockMarker {
    path: PathBuf,
}

impl LockMarker {
    /// Create the lock marker of `store_dir` (creating `store_dir` itself if it does not exist yet).
    pub fn acquire(store_dir: &Path, policy: LockPolicy) -> Result<LockMarker, StoreError> {
        fs::create_dir_all(store_dir).map_err(|err| StoreError::Io {
            path: store_dir.to_path_buf(),
            source: err,
        })?;

        let path = lock_path(store_dir);
        let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => match policy {
                LockPolicy::Exclusive => return Err(StoreError::Locked { marker: path }),
                LockPolicy::Reclaim => {
                    if holder_alive(&path) {
                        return Err(StoreError::Locked { marker: path });
                    }
                    log::warn!("Reclaiming stale lock marker {}", path.display());
                    OpenOptions::new()
                        .write(true)
                        .truncate(true)
                        .open(&path)
                        .map_err(|err| StoreError::Io {
                            path: path.clone(),
                            source: err,
                        })?
                }
            },
            Err(err) => return Err(StoreError::Io { path, source: err }),
        };

        let mut file = file;
        write!(file, "{}", process::id()).map_err(|err| StoreError::Io {
            path: path.clone(),
            source: err,
        })?;

        Ok(LockMarker { path })
    }

    /// Path of the marker file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockMarker {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => (),
            Err(err) if err.kind() == io::ErrorKind::NotFound => (),
            Err(err) => log::warn!(
                "Failed to remove lock marker {}: {}",
                self.path.display(),
                err
            ),
        }
    }
}

/// Path of the lock marker of `store_dir`.
pub fn lock_path(store_dir: &Path) -> PathBuf {
    store_dir.join(LOCK_FILE_NAME)
}

/// Remove the stale lock marker of every store directory directly under `data_dir`, returning the
/// paths of the markers that were removed.
///
/// Idempotent: directories without a marker are skipped, and a `data_dir` that does not exist has
/// nothing to clear. Markers whose holder is still running are left in place. Store contents are never
/// read.
pub fn clear_locks(data_dir: &Path) -> io::Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(data_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };

    let mut removed = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }

        let marker = lock_path(&entry.path());
        if !marker.exists() {
            continue;
        }
        if holder_alive(&marker) {
            log::warn!(
                "Leaving lock marker {} in place: its holder is still running",
                marker.display()
            );
            continue;
        }
        match fs::remove_file(&marker) {
            Ok(()) => removed.push(marker),
            Err(err) if err.kind() == io::ErrorKind::NotFound => (),
            Err(err) => return Err(err),
        }
    }

    removed.sort();
    Ok(removed)
}

/// Process id written in the marker at `marker`, if it holds one.
pub fn holder_pid(marker: &Path) -> Option<u32> {
    fs::read_to_string(marker).ok()?.trim().parse().ok()
}

// Whether the process that wrote the marker at `marker` is still running.
fn holder_alive(marker: &Path) -> bool {
    match holder_pid(marker) {
        None => false,
        Some(pid) if pid == process::id() => true,
        Some(pid) => process_running(pid),
    }
}

#[cfg(target_os = "linux")]
fn process_running(pid: u32) -> bool {
    Path::new(&format!("/proc/{}", pid)).exists()
}

// Without procfs there is no way to tell, so only markers of the current process are considered held.
#[cfg(not(target_os = "linux"))]
fn process_running(_pid: u32) -> bool {
    false
}
