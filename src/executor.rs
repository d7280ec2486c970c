/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The execution boundary: applies one finalized block to the app and the consensus store.
//!
//! [`BlockExecutor::apply_block`] is the only path through which a block changes persistent state,
//! both during normal operation and during state repair. Applying the block at height `h`:
//! 1. Validates the block against the snapshot it executes under: chain ID, hash integrity,
//!    block ID, consensus parameter limits, and (if the height continuity check is enforced)
//!    that the block directly extends the snapshot.
//! 2. Executes the block through the [`App`].
//! 3. Commits the resulting app state updates as app version `h`.
//! 4. Computes the snapshot at `h`, and saves it along with the validator set and consensus
//!    parameters it says are effective at `h + 1`.
//!
//! Steps 3 and 4 write to different stores, so a crash between them leaves the app store one version
//! ahead of the consensus store. This, and a crash inside the app's async commit pipeline, is what
//! the [repair protocol](crate::repair) recovers from.

use std::fmt::Display;

use crate::{
    app::{App, AppInfo, AppInstance, ExecuteBlockResponse},
    consistency::ConsistencyChecks,
    stores::{app_store::CommitMode, consensus_store::ConsensusStore, pluggables::KVStore, StoreError},
    types::{
        block::{Block, BlockID},
        data_types::{AppVersion, BlockHeight, ChainID, CryptoHash},
        snapshot::ConsensusSnapshot,
    },
};

pub struct BlockExecutor<'a, K: KVStore, A: App<K>> {
    app: &'a mut AppInstance<K, A>,
    consensus_store: &'a mut ConsensusStore<K>,
    checks: ConsistencyChecks,
    parallel_txs: bool,
    commit_mode: CommitMode,
}

impl<'a, K: KVStore, A: App<K>> BlockExecutor<'a, K, A> {
    pub fn new(
        app: &'a mut AppInstance<K, A>,
        consensus_store: &'a mut ConsensusStore<K>,
        checks: ConsistencyChecks,
        parallel_txs: bool,
        commit_mode: CommitMode,
    ) -> Self {
        Self {
            app,
            consensus_store,
            checks,
            parallel_txs,
            commit_mode,
        }
    }

    /// Apply `block` on top of `snapshot`, returning the snapshot after `block`.
    pub fn apply_block(
        &mut self,
        snapshot: &ConsensusSnapshot,
        block_id: &BlockID,
        block: &Block,
    ) -> Result<ConsensusSnapshot, ExecutionError> {
        self.validate_block(snapshot, block_id, block)?;

        let (app_state_updates, validator_set_updates, consensus_params_updates) =
            match self.app.execute(block, block_id, snapshot, self.parallel_txs) {
                ExecuteBlockResponse::Valid {
                    app_state_updates,
                    validator_set_updates,
                    consensus_params_updates,
                } => (
                    app_state_updates.unwrap_or_default(),
                    validator_set_updates.filter(|updates| !updates.is_empty()),
                    consensus_params_updates,
                ),
                ExecuteBlockResponse::Invalid => {
                    return Err(ExecutionError::InvalidBlock {
                        height: block.height,
                    })
                }
            };

        let app_hash = self.app.commit(
            AppVersion::at_height(block.height),
            &app_state_updates,
            self.commit_mode,
        )?;

        let effective_height = block.height + 1;
        let mut next_validators = snapshot.next_validators.clone();
        let mut last_height_validators_changed = snapshot.last_height_validators_changed;
        if let Some(validator_set_updates) = &validator_set_updates {
            next_validators.apply_updates(validator_set_updates);
            last_height_validators_changed = effective_height;
        }

        let (consensus_params, last_height_params_changed) = match consensus_params_updates {
            Some(consensus_params) => (consensus_params, effective_height),
            None => (snapshot.consensus_params, snapshot.last_height_params_changed),
        };

        let next_snapshot = ConsensusSnapshot {
            chain_id: snapshot.chain_id,
            initial_height: snapshot.initial_height,
            last_block_height: block.height,
            last_block_id: Some(*block_id),
            last_block_time: block.timestamp,
            validators: snapshot.next_validators.clone(),
            last_validators: snapshot.validators.clone(),
            next_validators,
            last_height_validators_changed,
            consensus_params,
            last_height_params_changed,
            app_hash,
        };
        self.consensus_store.save_snapshot(&next_snapshot)?;

        Ok(next_snapshot)
    }

    /// What the app reports about the last block it committed.
    pub fn info(&self) -> Result<AppInfo, ExecutionError> {
        Ok(self.app.info()?)
    }

    fn validate_block(
        &self,
        snapshot: &ConsensusSnapshot,
        block_id: &BlockID,
        block: &Block,
    ) -> Result<(), ExecutionError> {
        if block.chain_id != snapshot.chain_id {
            return Err(ExecutionError::WrongChain {
                expected: snapshot.chain_id,
                got: block.chain_id,
            });
        }

        if !block.is_correct() {
            return Err(ExecutionError::IncorrectBlock {
                height: block.height,
            });
        }

        if *block_id != BlockID::of(block) {
            return Err(ExecutionError::BlockIDMismatch {
                height: block.height,
            });
        }

        if !snapshot.consensus_params.admits(block) {
            return Err(ExecutionError::ConsensusParamsViolated {
                height: block.height,
            });
        }

        if self.checks.height_continuity_check {
            if block.height != snapshot.last_block_height + 1 {
                return Err(ExecutionError::HeightDiscontinuity {
                    expected: snapshot.last_block_height + 1,
                    got: block.height,
                });
            }

            let expected_prev_hash = snapshot
                .last_block_id
                .map(|last_block_id| last_block_id.hash)
                .unwrap_or(CryptoHash::zero());
            if block.prev_hash != expected_prev_hash {
                return Err(ExecutionError::PrevHashMismatch {
                    height: block.height,
                });
            }
        }

        Ok(())
    }
}

/// Error when applying a block.
///
/// Every variant is fatal. The app store stays at the last version that was atomically committed.
#[derive(Debug)]
pub enum ExecutionError {
    WrongChain { expected: ChainID, got: ChainID },
    IncorrectBlock { height: BlockHeight },
    BlockIDMismatch { height: BlockHeight },
    ConsensusParamsViolated { height: BlockHeight },
    HeightDiscontinuity { expected: BlockHeight, got: BlockHeight },
    PrevHashMismatch { height: BlockHeight },

    /// The [`App`] rejected the block.
    InvalidBlock { height: BlockHeight },

    StoreError(StoreError),
}

impl From<StoreError> for ExecutionError {
    fn from(value: StoreError) -> Self {
        ExecutionError::StoreError(value)
    }
}

impl Display for ExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionError::WrongChain { expected, got } => write!(
                f,
                "block belongs to chain {}, expected chain {}",
                got.int(),
                expected.int()
            ),
            ExecutionError::IncorrectBlock { height } => {
                write!(f, "block at height {} fails its integrity check", height)
            }
            ExecutionError::BlockIDMismatch { height } => {
                write!(f, "block ID does not match block at height {}", height)
            }
            ExecutionError::ConsensusParamsViolated { height } => write!(
                f,
                "block at height {} exceeds the consensus parameters' limits",
                height
            ),
            ExecutionError::HeightDiscontinuity { expected, got } => write!(
                f,
                "cannot apply block at height {}, expected height {}",
                got, expected
            ),
            ExecutionError::PrevHashMismatch { height } => write!(
                f,
                "block at height {} does not extend the last applied block",
                height
            ),
            ExecutionError::InvalidBlock { height } => {
                write!(f, "app rejected block at height {}", height)
            }
            ExecutionError::StoreError(err) => write!(f, "{}", err),
        }
    }
}
