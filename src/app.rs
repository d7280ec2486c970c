/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Trait definition for pluggable applications: [`App`].
//!
//! An `App` is the deterministic state transition function of a chain. Given a block and the
//! committed app state it executes on top of, it computes the updates the block makes to the app
//! state, the validator set and the consensus parameters. It never writes anything itself: the
//! [`BlockExecutor`](crate::executor::BlockExecutor) commits what it returns.
//!
//! # Determinism requirements
//!
//! Replaying a block during state repair must produce exactly the same updates the block produced
//! when it was first executed, otherwise the repaired app store diverges from every other replica's.
//! So `execute_block` must return the same response every time it is called with the same request.
//!
//! In particular, an app that executes transactions in parallel (see
//! [`parallel_txs`](ExecuteBlockRequest::parallel_txs)) must join every worker before returning, and
//! must merge the workers' results in an order that does not depend on scheduling.

use crate::{
    stores::{
        app_store::{CommitMode, VersionedAppStore},
        pluggables::KVStore,
        StoreError,
    },
    consistency::ConsistencyChecks,
    types::{
        block::{Block, BlockID},
        consensus_params::ConsensusParams,
        data_types::{AppVersion, BlockHeight, CryptoHash},
        snapshot::ConsensusSnapshot,
        update_sets::{AppStateUpdates, ValidatorSetUpdates},
    },
};

pub trait App<K: KVStore>: Send {
    /// Execute `request.block()` on top of `request.app_state()`.
    fn execute_block(&mut self, request: ExecuteBlockRequest<K>) -> ExecuteBlockResponse;
}

/// Request for an [`App`] to execute a block.
pub struct ExecuteBlockRequest<'a, K: KVStore> {
    block: &'a Block,
    block_id: &'a BlockID,
    snapshot: &'a ConsensusSnapshot,
    app_state: AppStateView<'a, K>,
    parallel_txs: bool,
}

impl<'a, K: KVStore> ExecuteBlockRequest<'a, K> {
    pub(crate) fn new(
        block: &'a Block,
        block_id: &'a BlockID,
        snapshot: &'a ConsensusSnapshot,
        app_state: AppStateView<'a, K>,
        parallel_txs: bool,
    ) -> Self {
        Self {
            block,
            block_id,
            snapshot,
            app_state,
            parallel_txs,
        }
    }

    /// The block to execute.
    pub fn block(&self) -> &Block {
        self.block
    }

    pub fn block_id(&self) -> &BlockID {
        self.block_id
    }

    /// The consensus snapshot the block executes under.
    pub fn snapshot(&self) -> &ConsensusSnapshot {
        self.snapshot
    }

    /// The committed app state the block executes on top of.
    pub fn app_state(&self) -> &AppStateView<'a, K> {
        &self.app_state
    }

    /// Whether the app may execute the block's transactions in parallel.
    pub fn parallel_txs(&self) -> bool {
        self.parallel_txs
    }
}

/// Response from an [`App`] to an [`ExecuteBlockRequest`].
pub enum ExecuteBlockResponse {
    /// The block is valid. Updates produced by the block at height `h` are effective from `h + 1`.
    Valid {
        app_state_updates: Option<AppStateUpdates>,
        validator_set_updates: Option<ValidatorSetUpdates>,
        consensus_params_updates: Option<ConsensusParams>,
    },

    /// The block is invalid under the app's rules. Since every block in the ledger has been
    /// finalized, this aborts whatever was applying the block.
    Invalid,
}

/// Read-only view of the committed app state, at the latest version of the app store.
pub struct AppStateView<'a, K: KVStore> {
    store: &'a VersionedAppStore<K>,
}

impl<'a, K: KVStore> AppStateView<'a, K> {
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.store.app_state(key)
    }
}

/// An [`App`] bound to the versioned app store it executes on.
pub struct AppInstance<K: KVStore, A: App<K>> {
    app: A,
    store: VersionedAppStore<K>,
}

/// What an [`AppInstance`] reports about itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AppInfo {
    /// Height of the last block the app committed.
    pub last_block_height: BlockHeight,

    /// App hash after that block.
    pub last_block_app_hash: CryptoHash,
}

impl<K: KVStore, A: App<K>> AppInstance<K, A> {
    pub fn new(app: A, store: VersionedAppStore<K>) -> Self {
        Self { app, store }
    }

    /// The app store's latest version: the application version.
    pub fn latest_version(&self) -> Result<AppVersion, StoreError> {
        self.store.latest_version()
    }

    /// The app store's async commit version.
    pub fn commit_version(&self) -> Result<AppVersion, StoreError> {
        self.store.commit_version()
    }

    /// Move the app back to `version`, discarding every later version.
    pub fn load_start_version(
        &mut self,
        version: AppVersion,
        checks: ConsistencyChecks,
    ) -> Result<(), StoreError> {
        self.store.load_version(version, checks)
    }

    /// Mark every version up to `version` as flushed through the async commit pipeline.
    pub fn flush(&mut self, version: AppVersion) -> Result<(), StoreError> {
        self.store.flush(version)
    }

    pub fn info(&self) -> Result<AppInfo, StoreError> {
        let latest_version = self.store.latest_version()?;
        Ok(AppInfo {
            last_block_height: latest_version.height(),
            last_block_app_hash: self
                .store
                .app_hash(latest_version)?
                .unwrap_or(CryptoHash::zero()),
        })
    }

    pub fn store(&self) -> &VersionedAppStore<K> {
        &self.store
    }

    /// Give back the app and its store.
    pub fn into_parts(self) -> (A, VersionedAppStore<K>) {
        (self.app, self.store)
    }

    pub(crate) fn execute(
        &mut self,
        block: &Block,
        block_id: &BlockID,
        snapshot: &ConsensusSnapshot,
        parallel_txs: bool,
    ) -> ExecuteBlockResponse {
        let request = ExecuteBlockRequest::new(
            block,
            block_id,
            snapshot,
            AppStateView { store: &self.store },
            parallel_txs,
        );
        self.app.execute_block(request)
    }

    pub(crate) fn commit(
        &mut self,
        version: AppVersion,
        updates: &AppStateUpdates,
        mode: CommitMode,
    ) -> Result<CryptoHash, StoreError> {
        self.store.commit(version, updates, mode)
    }
}
