/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Reconstruction of the consensus snapshot that replay starts from.
//!
//! The consensus store only keeps the latest snapshot, but replay has to start from the snapshot right
//! after the block at the start version. The parts of the snapshot that block execution depends
//! on are the validator sets and the consensus parameters, and those are recoverable from the store's
//! [per-height history](crate::stores::consensus_store):
//!
//! |Snapshot field|History record read|
//! |---|---|
//! |`validators`|validators at `start`|
//! |`last_validators`|validators at `start - 1`|
//! |`next_validators`|validators at `start + 1`|
//! |`consensus_params`|consensus params at `start + 1`|
//!
//! Every other field is copied from the latest snapshot. In particular, `last_block_height` keeps
//! pointing at the latest block, so replaying on top of a checkpoint requires the height continuity
//! check to be relaxed.

use crate::{
    stores::{consensus_store::ConsensusStore, pluggables::KVStore},
    types::{
        data_types::{AppVersion, BlockHeight},
        snapshot::ConsensusSnapshot,
    },
};

use super::{CheckpointRecord, RepairError};

/// Build the snapshot to replay from when the app has been moved back to `start`.
///
/// Fails without returning a partial snapshot if any of the history records is missing.
pub fn construct_start_state<K: KVStore>(
    snapshot: &ConsensusSnapshot,
    consensus_store: &ConsensusStore<K>,
    start: AppVersion,
) -> Result<ConsensusSnapshot, RepairError> {
    let height = start.height();
    let prev_height = height.checked_prev().ok_or(RepairError::ZeroStartVersion)?;
    let next_height = height + 1;

    let validators = consensus_store
        .load_validators(height)?
        .ok_or(missing_validators(height))?;
    let last_validators = consensus_store
        .load_validators(prev_height)?
        .ok_or(missing_validators(prev_height))?;
    let next_validators = consensus_store
        .load_validators(next_height)?
        .ok_or(missing_validators(next_height))?;
    let consensus_params = consensus_store
        .load_consensus_params(next_height)?
        .ok_or(RepairError::CheckpointRecordMissing {
            record: CheckpointRecord::ConsensusParams,
            height: next_height,
        })?;

    let mut checkpoint = snapshot.clone();
    checkpoint.validators = validators.value;
    checkpoint.last_validators = last_validators.value;
    checkpoint.next_validators = next_validators.value;
    checkpoint.last_height_validators_changed = next_validators.last_height_changed;
    checkpoint.consensus_params = consensus_params.value;
    checkpoint.last_height_params_changed = consensus_params.last_height_changed;

    Ok(checkpoint)
}

fn missing_validators(height: BlockHeight) -> RepairError {
    RepairError::CheckpointRecordMissing {
        record: CheckpointRecord::Validators,
        height,
    }
}
