/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The three persistent stores of a node, and the lock markers that guard them.
//!
//! # Data directory layout
//!
//! A node keeps each of its stores in its own subdirectory of a single data directory:
//!
//! |Subdirectory|Store|Accessor|
//! |---|---|---|
//! |`application`|Versioned app store|[`VersionedAppStore`](app_store::VersionedAppStore)|
//! |`blockstore`|Block ledger|[`BlockLedger`](ledger::BlockLedger)|
//! |`state`|Consensus store|[`ConsensusStore`](consensus_store::ConsensusStore)|
//!
//! Each store is a [`KVStore`](pluggables::KVStore) chosen by the library user, opened through a
//! [`StoreHandle`](handle::StoreHandle) that holds the directory's [lock marker](lock) while open.
//! The layout of stored variables inside each store is documented in [`variables`].

use std::{fmt::Display, io, path::PathBuf};

use crate::types::data_types::{AppVersion, BlockHeight};

pub use pluggables::{KVGetError, KVSetError};

pub mod app_store;

pub mod consensus_store;

pub mod handle;

pub mod ledger;

pub mod lock;

pub mod pluggables;

pub mod variables;

/// Name of the subdirectory holding the versioned app store.
pub const APPLICATION_DB: &str = "application";

/// Name of the subdirectory holding the block ledger.
pub const BLOCK_STORE_DB: &str = "blockstore";

/// Name of the subdirectory holding the consensus store.
pub const STATE_DB: &str = "state";

/// The three stores in a data directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreKind {
    Application,
    BlockStore,
    State,
}

impl StoreKind {
    /// Name of the subdirectory this store lives in.
    pub const fn dir_name(&self) -> &'static str {
        match self {
            StoreKind::Application => APPLICATION_DB,
            StoreKind::BlockStore => BLOCK_STORE_DB,
            StoreKind::State => STATE_DB,
        }
    }
}

impl Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

/// Error when opening, reading or writing one of the stores.
///
/// Every variant is fatal to the operation that produced it. Nothing in this crate retries.
#[derive(Debug)]
pub enum StoreError {
    KVGetError(KVGetError),
    KVSetError(KVSetError),

    /// The filesystem or the [`KVStore`](pluggables::KVStore) failed on `path`.
    Io {
        path: PathBuf,
        source: io::Error,
    },

    /// The store's directory already holds a lock marker, and either the store was opened with
    /// [`LockPolicy::Exclusive`](lock::LockPolicy::Exclusive) or the marker's holder is still running.
    Locked {
        marker: PathBuf,
    },

    // Block ledger.
    NonContiguousBlock {
        expected: BlockHeight,
        got: BlockHeight,
    },
    PrevHashMismatch {
        height: BlockHeight,
    },
    IncorrectBlock {
        height: BlockHeight,
    },

    // Consensus store.
    SnapshotDiscontinuity {
        snapshot_height: BlockHeight,
        ledger_height: BlockHeight,
    },

    // Versioned app store.
    AlreadyInitialized {
        latest_version: AppVersion,
    },
    NonSequentialVersion {
        expected: AppVersion,
        got: AppVersion,
    },
    VersionAboveLatest {
        requested: AppVersion,
        latest: AppVersion,
    },
    VersionBelowLatest {
        requested: AppVersion,
        latest: AppVersion,
    },
    VersionHistoryMissing {
        version: AppVersion,
    },
    PipelineDepthExceeded {
        version: AppVersion,
        commit_version: AppVersion,
        depth: u64,
    },
}

impl From<KVGetError> for StoreError {
    fn from(value: KVGetError) -> Self {
        StoreError::KVGetError(value)
    }
}

impl From<KVSetError> for StoreError {
    fn from(value: KVSetError) -> Self {
        StoreError::KVSetError(value)
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::KVGetError(KVGetError::DeserializeValueError { key, source }) => {
                write!(f, "failed to deserialize {}: {}", key, source)
            }
            StoreError::KVGetError(KVGetError::ValueExpectedButNotFound { key }) => {
                write!(f, "{} is missing", key)
            }
            StoreError::KVGetError(KVGetError::Ed25519DalekError { key, source }) => {
                write!(f, "{} holds an invalid verifying key: {}", key, source)
            }
            StoreError::KVSetError(KVSetError::SerializeValueError { key, source }) => {
                write!(f, "failed to serialize {}: {}", key, source)
            }
            StoreError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            StoreError::Locked { marker } => {
                write!(f, "store is locked by {}", marker.display())
            }
            StoreError::NonContiguousBlock { expected, got } => write!(
                f,
                "cannot append block at height {}, expected height {}",
                got, expected
            ),
            StoreError::PrevHashMismatch { height } => write!(
                f,
                "block at height {} does not extend the latest block",
                height
            ),
            StoreError::IncorrectBlock { height } => {
                write!(f, "block at height {} fails its integrity check", height)
            }
            StoreError::SnapshotDiscontinuity {
                snapshot_height,
                ledger_height,
            } => write!(
                f,
                "consensus snapshot at height {} does not match ledger height {}",
                snapshot_height, ledger_height
            ),
            StoreError::AlreadyInitialized { latest_version } => write!(
                f,
                "app store is already initialized at version {}",
                latest_version
            ),
            StoreError::NonSequentialVersion { expected, got } => write!(
                f,
                "cannot commit app version {}, expected version {}",
                got, expected
            ),
            StoreError::VersionAboveLatest { requested, latest } => write!(
                f,
                "cannot load app version {} above latest version {}",
                requested, latest
            ),
            StoreError::VersionBelowLatest { requested, latest } => write!(
                f,
                "loading app version {} below latest version {} requires the version check to be relaxed",
                requested, latest
            ),
            StoreError::VersionHistoryMissing { version } => {
                write!(f, "undo record of app version {} is missing", version)
            }
            StoreError::PipelineDepthExceeded {
                version,
                commit_version,
                depth,
            } => write!(
                f,
                "app version {} is more than {} versions ahead of commit version {}",
                version, depth, commit_version
            ),
        }
    }
}
