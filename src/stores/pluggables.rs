/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Traits for pluggable store persistence.
//!
//! The three stores (block ledger, consensus store, versioned app store) are all plain key-value stores
//! from the point of view of this crate. Library users choose the embedded database behind them by
//! implementing [`KVStore`], and this crate puts every stored variable at the
//! [key paths](super::variables) it owns.

use std::{fmt::Display, io, path::Path};

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::data_types::{AppVersion, BlockHeight};

/// An embedded key-value store living in its own directory on disk.
pub trait KVStore: KVGet + Send + 'static {
    type WriteBatch: WriteBatch;

    /// Open (creating if necessary) the store in the directory at `path`.
    ///
    /// Implementations do not need to guard against concurrent opens: every open made by this crate goes
    /// through a [`StoreHandle`](super::handle::StoreHandle), which holds the directory's
    /// [lock marker](super::lock) for as long as the store is open.
    fn open(path: &Path) -> io::Result<Self>
    where
        Self: Sized;

    /// Atomically apply `wb`. Either every operation in the batch becomes durable, or none does.
    fn write(&mut self, wb: Self::WriteBatch) -> io::Result<()>;
}

pub trait KVGet {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
}

/// A batch of writes applied atomically by [`KVStore::write`].
///
/// If the same key is `set` or `delete`d more than once in a batch, the operation made last wins.
pub trait WriteBatch {
    fn new() -> Self;
    fn set(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);
}

/// Read the value at `key` from `kv` and deserialize it, returning `Ok(None)` if the key is not set.
pub(crate) fn get_value<T: BorshDeserialize>(
    kv: &impl KVGet,
    key: &[u8],
    name: Key,
) -> Result<Option<T>, KVGetError> {
    match kv.get(key) {
        None => Ok(None),
        Some(bytes) => T::deserialize(&mut bytes.as_slice())
            .map(Some)
            .map_err(|err| KVGetError::DeserializeValueError {
                key: name,
                source: err,
            }),
    }
}

/// Serialize `value` and set it at `key` in `wb`.
pub(crate) fn set_value<T: BorshSerialize>(
    wb: &mut impl WriteBatch,
    key: &[u8],
    value: &T,
    name: Key,
) -> Result<(), KVSetError> {
    let bytes = value
        .try_to_vec()
        .map_err(|err| KVSetError::SerializeValueError {
            key: name,
            source: err,
        })?;
    wb.set(key, &bytes);
    Ok(())
}

/// Error when trying to read a value corresponding to a given key from a [key value store][KVStore].
/// The error may arise in the following circumstances:
/// 1. The value corresponding to a given key cannot be deserialized into its expected type,
/// 2. The value corresponding to a given key cannot be found, even though it is expected to be there,
/// 3. A stored validator identity is not a valid Ed25519 verifying key.
#[derive(Debug)]
pub enum KVGetError {
    DeserializeValueError {
        key: Key,
        source: std::io::Error,
    },
    ValueExpectedButNotFound {
        key: Key,
    },
    Ed25519DalekError {
        key: Key,
        source: ed25519_dalek::SignatureError,
    },
}

/// Error when writing a key-value pair into a write batch: the value could not be serialized.
#[derive(Debug)]
pub enum KVSetError {
    SerializeValueError { key: Key, source: std::io::Error },
}

/// Names of the variables stored by this crate, used in error reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    // Block ledger.
    LedgerBaseHeight,
    LedgerHeight,
    BlockAtHeight { height: BlockHeight },
    BlockMetaAtHeight { height: BlockHeight },

    // Consensus store.
    ConsensusSnapshot,
    ValidatorsInfo { height: BlockHeight },
    ConsensusParamsInfo { height: BlockHeight },

    // Versioned app store.
    AppState { key: Vec<u8> },
    LatestVersion,
    CommitVersion,
    VersionAppHash { version: AppVersion },
    VersionUndo { version: AppVersion },
}

impl Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::LedgerBaseHeight => write!(f, "Ledger Base Height"),
            Key::LedgerHeight => write!(f, "Ledger Height"),
            Key::BlockAtHeight { height } => write!(f, "Block at height {}", height),
            Key::BlockMetaAtHeight { height } => write!(f, "Block Meta at height {}", height),
            Key::ConsensusSnapshot => write!(f, "Consensus Snapshot"),
            Key::ValidatorsInfo { height } => write!(f, "Validators at height {}", height),
            Key::ConsensusParamsInfo { height } => {
                write!(f, "Consensus Params at height {}", height)
            }
            Key::AppState { key } => write!(f, "App State for key {:?}", key),
            Key::LatestVersion => write!(f, "Latest Version"),
            Key::CommitVersion => write!(f, "Commit Version"),
            Key::VersionAppHash { version } => write!(f, "App Hash of version {}", version),
            Key::VersionUndo { version } => write!(f, "Undo record of version {}", version),
        }
    }
}
