/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! An opened store together with the lock marker of its directory.

use std::path::{Path, PathBuf};

use super::{
    lock::{LockMarker, LockPolicy},
    pluggables::{KVGet, KVStore},
    StoreError, StoreKind,
};

/// A [`KVStore`] opened from its directory under a data directory.
///
/// The lock marker is acquired before the store is opened, and removed after the store is closed:
/// dropping a `StoreHandle` drops `kv_store` first, then `lock`.
pub struct StoreHandle<K: KVStore> {
    kv_store: K,
    kind: StoreKind,
    dir: PathBuf,
    lock: LockMarker,
}

impl<K: KVStore> StoreHandle<K> {
    /// Lock, then open, the `kind` store under `data_dir`.
    pub fn open(
        data_dir: &Path,
        kind: StoreKind,
        policy: LockPolicy,
    ) -> Result<StoreHandle<K>, StoreError> {
        let dir = data_dir.join(kind.dir_name());
        let lock = LockMarker::acquire(&dir, policy)?;
        let kv_store = K::open(&dir).map_err(|err| StoreError::Io {
            path: dir.clone(),
            source: err,
        })?;

        log::debug!("Opened {} store at {}", kind, dir.display());

        Ok(StoreHandle {
            kv_store,
            kind,
            dir,
            lock,
        })
    }

    /// Atomically apply `wb` to the store.
    pub(crate) fn write(&mut self, wb: K::WriteBatch) -> Result<(), StoreError> {
        self.kv_store.write(wb).map_err(|err| StoreError::Io {
            path: self.dir.clone(),
            source: err,
        })
    }

    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    /// Directory the store lives in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the lock marker this handle holds.
    pub fn lock_path(&self) -> &Path {
        self.lock.path()
    }
}

impl<K: KVStore> KVGet for StoreHandle<K> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.kv_store.get(key)
    }
}
