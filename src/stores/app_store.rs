/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The versioned app store: the application's key-value state, one version per committed block.
//!
//! # Versions
//!
//! Committing the block at height `h` produces version `h`. Versions are strictly sequential: the
//! only version that can be committed is `latest_version + 1`.
//!
//! Together with every version the store keeps:
//! 1. The version's app hash, which chains the previous version's app hash with the version's updates
//!    (see [`next_app_hash`]), and
//! 2. An undo record: the updates that revert the version's changes. Undo records are what let
//!    [`load_version`](VersionedAppStore::load_version) truncate the store back to an earlier version.
//!
//! # Async commit pipeline
//!
//! An application may commit versions faster than it makes them durable downstream. The store
//! tracks this with a second counter, `commit_version`: the highest version flushed through the
//! pipeline. It never exceeds `latest_version`, and a [pipelined](CommitMode::Pipelined) commit
//! refuses to run more than `depth` versions ahead of it.

use std::path::Path;

use crate::{
    consistency::ConsistencyChecks,
    types::{
        crypto_primitives::{finalize, CryptoHasher, Digest},
        data_types::{AppVersion, CryptoHash},
        update_sets::AppStateUpdates,
    },
};

use super::{
    handle::StoreHandle,
    lock::LockPolicy,
    pluggables::{get_value, set_value, KVGet, KVStore, Key, WriteBatch},
    variables::*,
    StoreError, StoreKind,
};

/// How a [`commit`](VersionedAppStore::commit) advances `commit_version`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitMode {
    /// The new version is flushed along with the commit.
    Flushed,

    /// The new version is left for a later [`flush`](VersionedAppStore::flush), as long as it is at most
    /// `depth` versions ahead of `commit_version`.
    Pipelined { depth: u64 },
}

pub struct VersionedAppStore<K: KVStore> {
    store: StoreHandle<K>,
}

impl<K: KVStore> VersionedAppStore<K> {
    /// Open the app store in the `application` subdirectory of `data_dir`.
    pub fn open(data_dir: &Path, policy: LockPolicy) -> Result<VersionedAppStore<K>, StoreError> {
        Ok(VersionedAppStore {
            store: StoreHandle::open(data_dir, StoreKind::Application, policy)?,
        })
    }

    /// Write the app state a chain starts with as `version`, and return its app hash.
    ///
    /// `version` has no undo record: nothing can be truncated below it.
    pub fn initialize(
        &mut self,
        initial_state: &AppStateUpdates,
        version: AppVersion,
    ) -> Result<CryptoHash, StoreError> {
        if let Some(latest_version) =
            get_value::<AppVersion>(&self.store, &LATEST_VERSION, Key::LatestVersion)?
        {
            return Err(StoreError::AlreadyInitialized { latest_version });
        }

        let app_hash = next_app_hash(&CryptoHash::zero(), version, initial_state);
        let mut wb = K::WriteBatch::new();
        apply_updates(&mut wb, initial_state);
        set_value(
            &mut wb,
            &concat(&VERSION_APP_HASH, &version.to_le_bytes()),
            &app_hash,
            Key::VersionAppHash { version },
        )?;
        set_value(&mut wb, &LATEST_VERSION, &version, Key::LatestVersion)?;
        set_value(&mut wb, &COMMIT_VERSION, &version, Key::CommitVersion)?;
        self.store.write(wb)?;

        Ok(app_hash)
    }

    /// Highest version written, or 0 if the store is empty.
    pub fn latest_version(&self) -> Result<AppVersion, StoreError> {
        Ok(get_value(&self.store, &LATEST_VERSION, Key::LatestVersion)?
            .unwrap_or(AppVersion::new(0)))
    }

    /// Highest version flushed through the async commit pipeline, or 0 if the store is empty.
    pub fn commit_version(&self) -> Result<AppVersion, StoreError> {
        Ok(get_value(&self.store, &COMMIT_VERSION, Key::CommitVersion)?
            .unwrap_or(AppVersion::new(0)))
    }

    /// Get the value at `key` in the app state of the latest version.
    pub fn app_state(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.store.get(&concat(&APP_STATE, key))
    }

    /// Get the app hash of `version`, if the store retains it.
    pub fn app_hash(&self, version: AppVersion) -> Result<Option<CryptoHash>, StoreError> {
        Ok(get_value(
            &self.store,
            &concat(&VERSION_APP_HASH, &version.to_le_bytes()),
            Key::VersionAppHash { version },
        )?)
    }

    /// Atomically apply `updates` as `version`, and return the version's app hash.
    pub fn commit(
        &mut self,
        version: AppVersion,
        updates: &AppStateUpdates,
        mode: CommitMode,
    ) -> Result<CryptoHash, StoreError> {
        let latest_version = self.latest_version()?;
        if version != latest_version + 1 {
            return Err(StoreError::NonSequentialVersion {
                expected: latest_version + 1,
                got: version,
            });
        }

        let commit_version = match mode {
            CommitMode::Flushed => version,
            CommitMode::Pipelined { depth } => {
                let commit_version = self.commit_version()?;
                if version - commit_version > depth {
                    return Err(StoreError::PipelineDepthExceeded {
                        version,
                        commit_version,
                        depth,
                    });
                }
                commit_version
            }
        };

        let prev_app_hash = self
            .app_hash(latest_version)?
            .unwrap_or(CryptoHash::zero());
        let app_hash = next_app_hash(&prev_app_hash, version, updates);

        let mut undo = AppStateUpdates::new();
        for (key, _) in updates.inserts() {
            match self.app_state(key) {
                Some(prev_value) => undo.insert(key.clone(), prev_value),
                None => undo.delete(key.clone()),
            }
        }
        for key in updates.deletes() {
            if let Some(prev_value) = self.app_state(key) {
                undo.insert(key.clone(), prev_value);
            }
        }

        let mut wb = K::WriteBatch::new();
        apply_updates(&mut wb, updates);
        set_value(
            &mut wb,
            &concat(&VERSION_UNDO, &version.to_le_bytes()),
            &undo,
            Key::VersionUndo { version },
        )?;
        set_value(
            &mut wb,
            &concat(&VERSION_APP_HASH, &version.to_le_bytes()),
            &app_hash,
            Key::VersionAppHash { version },
        )?;
        set_value(&mut wb, &LATEST_VERSION, &version, Key::LatestVersion)?;
        set_value(&mut wb, &COMMIT_VERSION, &commit_version, Key::CommitVersion)?;
        self.store.write(wb)?;

        Ok(app_hash)
    }

    /// Mark every version up to and including `version` as flushed through the async commit pipeline.
    pub fn flush(&mut self, version: AppVersion) -> Result<(), StoreError> {
        let latest_version = self.latest_version()?;
        if version > latest_version {
            return Err(StoreError::VersionAboveLatest {
                requested: version,
                latest: latest_version,
            });
        }
        if version <= self.commit_version()? {
            return Ok(());
        }

        let mut wb = K::WriteBatch::new();
        set_value(&mut wb, &COMMIT_VERSION, &version, Key::CommitVersion)?;
        self.store.write(wb)
    }

    /// Truncate the store back to `version`, discarding every later version.
    ///
    /// Loading the latest version is a no-op. Loading an earlier one requires
    /// `checks.version_check` to be relaxed, and fails without writing anything if any of the
    /// discarded versions lacks an undo record.
    pub fn load_version(
        &mut self,
        version: AppVersion,
        checks: ConsistencyChecks,
    ) -> Result<(), StoreError> {
        let latest_version = self.latest_version()?;
        if version > latest_version {
            return Err(StoreError::VersionAboveLatest {
                requested: version,
                latest: latest_version,
            });
        }
        if version == latest_version {
            return Ok(());
        }
        if checks.version_check {
            return Err(StoreError::VersionBelowLatest {
                requested: version,
                latest: latest_version,
            });
        }

        // Newest first, so that in the batch the undo record of the oldest discarded version is
        // applied last.
        let mut undos = Vec::new();
        let mut discarded = latest_version;
        while discarded > version {
            let undo: AppStateUpdates = get_value(
                &self.store,
                &concat(&VERSION_UNDO, &discarded.to_le_bytes()),
                Key::VersionUndo { version: discarded },
            )?
            .ok_or(StoreError::VersionHistoryMissing { version: discarded })?;
            undos.push((discarded, undo));
            discarded = AppVersion::new(discarded.int() - 1);
        }

        let mut wb = K::WriteBatch::new();
        for (discarded, undo) in &undos {
            apply_updates(&mut wb, undo);
            wb.delete(&concat(&VERSION_UNDO, &discarded.to_le_bytes()));
            wb.delete(&concat(&VERSION_APP_HASH, &discarded.to_le_bytes()));
        }
        set_value(&mut wb, &LATEST_VERSION, &version, Key::LatestVersion)?;
        let commit_version = self.commit_version()?.min(version);
        set_value(&mut wb, &COMMIT_VERSION, &commit_version, Key::CommitVersion)?;
        self.store.write(wb)?;

        log::info!(
            "Truncated app store from version {} to version {}",
            latest_version,
            version
        );
        Ok(())
    }
}

/// App hash of `version`, given the app hash of the version before it and the updates `version`
/// applies.
pub fn next_app_hash(
    prev_app_hash: &CryptoHash,
    version: AppVersion,
    updates: &AppStateUpdates,
) -> CryptoHash {
    let mut hasher = CryptoHasher::new();
    hasher.update(prev_app_hash.bytes());
    hasher.update(version.to_le_bytes());
    for (key, value) in updates.sorted_inserts() {
        hasher.update((key.len() as u64).to_le_bytes());
        hasher.update(key);
        hasher.update((value.len() as u64).to_le_bytes());
        hasher.update(value);
    }
    // Separates the inserts from the deletes.
    hasher.update([0xff]);
    for key in updates.sorted_deletes() {
        hasher.update((key.len() as u64).to_le_bytes());
        hasher.update(key);
    }
    finalize(hasher)
}

fn apply_updates(wb: &mut impl WriteBatch, updates: &AppStateUpdates) {
    for (key, value) in updates.inserts() {
        wb.set(&concat(&APP_STATE, key), value);
    }
    for key in updates.deletes() {
        wb.delete(&concat(&APP_STATE, key));
    }
}
