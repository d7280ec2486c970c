/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The consensus snapshot: the context needed to execute the next block.
//!
//! # Heights in a snapshot
//!
//! A snapshot whose `last_block_height` is `H` describes the chain right after block `H` was
//! executed, and is only valid for executing block `H + 1`:
//!
//! |Field|Effective at|
//! |---|---|
//! |`last_validators`|`H - 1`|
//! |`validators`|`H`|
//! |`next_validators`|`H + 1`|
//! |`consensus_params`|`H + 1`|
//! |`app_hash`|app state after `H`|
//!
//! The consensus store keeps the per-height history of validator sets and consensus parameters
//! alongside the latest snapshot, which is what lets the
//! [checkpoint reconstructor](crate::repair::checkpoint) build a snapshot for an arbitrary past height.

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    block::BlockID,
    consensus_params::ConsensusParams,
    crypto_primitives::SignatureError,
    data_types::{BlockHeight, ChainID, CryptoHash, Timestamp},
    validator_set::{ValidatorSet, ValidatorSetBytes},
};

#[derive(Clone, Debug, PartialEq)]
pub struct ConsensusSnapshot {
    pub chain_id: ChainID,
    pub initial_height: BlockHeight,

    pub last_block_height: BlockHeight,
    pub last_block_id: Option<BlockID>,
    pub last_block_time: Timestamp,

    pub validators: ValidatorSet,
    pub last_validators: ValidatorSet,
    pub next_validators: ValidatorSet,
    /// Height from which `next_validators` has been effective.
    pub last_height_validators_changed: BlockHeight,

    pub consensus_params: ConsensusParams,
    /// Height from which `consensus_params` has been effective.
    pub last_height_params_changed: BlockHeight,

    pub app_hash: CryptoHash,
}

impl ConsensusSnapshot {
    /// Whether this snapshot has not seen any block yet, i.e., it was bootstrapped from [`Genesis`]
    /// and never advanced.
    pub fn is_genesis(&self) -> bool {
        self.last_block_id.is_none()
    }
}

/// Intermediate representation of [`ConsensusSnapshot`] for safe serialization and deserialization.
///
/// See [`ValidatorSetBytes`] for why this exists.
#[derive(BorshSerialize, BorshDeserialize)]
pub(crate) struct ConsensusSnapshotBytes {
    chain_id: ChainID,
    initial_height: BlockHeight,
    last_block_height: BlockHeight,
    last_block_id: Option<BlockID>,
    last_block_time: Timestamp,
    validators: ValidatorSetBytes,
    last_validators: ValidatorSetBytes,
    next_validators: ValidatorSetBytes,
    last_height_validators_changed: BlockHeight,
    consensus_params: ConsensusParams,
    last_height_params_changed: BlockHeight,
    app_hash: CryptoHash,
}

impl From<&ConsensusSnapshot> for ConsensusSnapshotBytes {
    fn from(snapshot: &ConsensusSnapshot) -> Self {
        ConsensusSnapshotBytes {
            chain_id: snapshot.chain_id,
            initial_height: snapshot.initial_height,
            last_block_height: snapshot.last_block_height,
            last_block_id: snapshot.last_block_id,
            last_block_time: snapshot.last_block_time,
            validators: (&snapshot.validators).into(),
            last_validators: (&snapshot.last_validators).into(),
            next_validators: (&snapshot.next_validators).into(),
            last_height_validators_changed: snapshot.last_height_validators_changed,
            consensus_params: snapshot.consensus_params,
            last_height_params_changed: snapshot.last_height_params_changed,
            app_hash: snapshot.app_hash,
        }
    }
}

impl TryFrom<ConsensusSnapshotBytes> for ConsensusSnapshot {
    type Error = SignatureError;

    fn try_from(bytes: ConsensusSnapshotBytes) -> Result<Self, Self::Error> {
        Ok(ConsensusSnapshot {
            chain_id: bytes.chain_id,
            initial_height: bytes.initial_height,
            last_block_height: bytes.last_block_height,
            last_block_id: bytes.last_block_id,
            last_block_time: bytes.last_block_time,
            validators: bytes.validators.try_into()?,
            last_validators: bytes.last_validators.try_into()?,
            next_validators: bytes.next_validators.try_into()?,
            last_height_validators_changed: bytes.last_height_validators_changed,
            consensus_params: bytes.consensus_params,
            last_height_params_changed: bytes.last_height_params_changed,
            app_hash: bytes.app_hash,
        })
    }
}

/// What a chain starts from when the consensus store holds no snapshot yet.
#[derive(Clone, Debug)]
pub struct Genesis {
    pub chain_id: ChainID,
    /// Height of the first block. Must be at least 1.
    pub initial_height: BlockHeight,
    pub genesis_time: Timestamp,
    pub validators: ValidatorSet,
    pub consensus_params: ConsensusParams,
    /// App hash of the app state the chain starts with.
    pub app_hash: CryptoHash,
}

impl Genesis {
    /// The snapshot "right before" `initial_height`: every validator field holds the genesis
    /// validators, and no block has been executed yet.
    pub fn into_snapshot(self) -> ConsensusSnapshot {
        let genesis_height = BlockHeight::new(self.initial_height.int().saturating_sub(1));
        ConsensusSnapshot {
            chain_id: self.chain_id,
            initial_height: self.initial_height,
            last_block_height: genesis_height,
            last_block_id: None,
            last_block_time: self.genesis_time,
            validators: self.validators.clone(),
            last_validators: self.validators.clone(),
            next_validators: self.validators,
            last_height_validators_changed: genesis_height,
            consensus_params: self.consensus_params,
            last_height_params_changed: genesis_height,
            app_hash: self.app_hash,
        }
    }
}
