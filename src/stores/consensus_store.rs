/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The consensus store: the latest [`ConsensusSnapshot`] and the per-height history of validator
//! sets and consensus parameters.
//!
//! # History records
//!
//! Every [`save_snapshot`](ConsensusStore::save_snapshot) of a snapshot at height `H` records the
//! validator set and the consensus parameters effective at `H + 1`. Validator sets rarely change, so
//! a record only holds the full value at the height where the value changed. At every other height
//! it holds the height of the last change, and readers follow that pointer:
//!
//! |Height|Validators Info|
//! |---|---|
//! |`10`|`{ last_height_changed: 10, validator_set: Some(..) }`|
//! |`11`|`{ last_height_changed: 10, validator_set: None }`|
//! |`12`|`{ last_height_changed: 10, validator_set: None }`|
//!
//! Saving the genesis snapshot (at height `initial_height - 1`) additionally records both values at
//! the genesis height itself, so that every height from genesis on has a record.

use std::path::Path;

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{
    consistency::ConsistencyChecks,
    types::{
        consensus_params::ConsensusParams,
        data_types::BlockHeight,
        snapshot::{ConsensusSnapshot, ConsensusSnapshotBytes, Genesis},
        validator_set::{ValidatorSet, ValidatorSetBytes},
    },
};

use super::{
    handle::StoreHandle,
    lock::LockPolicy,
    pluggables::{get_value, set_value, KVGetError, KVStore, Key, WriteBatch},
    variables::*,
    StoreError, StoreKind,
};

/// A value read from the per-height history, together with the height it last changed at.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryRecord<T> {
    pub value: T,
    pub last_height_changed: BlockHeight,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct ValidatorsInfo {
    last_height_changed: BlockHeight,
    validator_set: Option<ValidatorSetBytes>,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct ConsensusParamsInfo {
    last_height_changed: BlockHeight,
    consensus_params: Option<ConsensusParams>,
}

pub struct ConsensusStore<K: KVStore> {
    store: StoreHandle<K>,
}

impl<K: KVStore> ConsensusStore<K> {
    /// Open the consensus store in the `state` subdirectory of `data_dir`.
    pub fn open(data_dir: &Path, policy: LockPolicy) -> Result<ConsensusStore<K>, StoreError> {
        Ok(ConsensusStore {
            store: StoreHandle::open(data_dir, StoreKind::State, policy)?,
        })
    }

    /// Get the latest saved snapshot, if any.
    pub fn load_snapshot(&self) -> Result<Option<ConsensusSnapshot>, StoreError> {
        let snapshot_bytes: Option<ConsensusSnapshotBytes> =
            get_value(&self.store, &CONSENSUS_SNAPSHOT, Key::ConsensusSnapshot)?;
        match snapshot_bytes {
            None => Ok(None),
            Some(bytes) => Ok(Some(ConsensusSnapshot::try_from(bytes).map_err(|err| {
                KVGetError::Ed25519DalekError {
                    key: Key::ConsensusSnapshot,
                    source: err,
                }
            })?)),
        }
    }

    /// Get the latest saved snapshot, or the snapshot `genesis` bootstraps if none was ever saved.
    ///
    /// The bootstrapped snapshot is not saved. If `checks.height_continuity_check` is set, a saved
    /// snapshot must be at `ledger_height` or directly below it.
    pub fn load_snapshot_or_genesis(
        &self,
        ledger_height: BlockHeight,
        checks: ConsistencyChecks,
        genesis: impl FnOnce() -> Genesis,
    ) -> Result<ConsensusSnapshot, StoreError> {
        let snapshot = match self.load_snapshot()? {
            Some(snapshot) => snapshot,
            None => {
                log::info!("No consensus snapshot saved, bootstrapping from genesis");
                return Ok(genesis().into_snapshot());
            }
        };

        if checks.height_continuity_check
            && snapshot.last_block_height != ledger_height
            && snapshot.last_block_height + 1 != ledger_height
        {
            return Err(StoreError::SnapshotDiscontinuity {
                snapshot_height: snapshot.last_block_height,
                ledger_height,
            });
        }

        Ok(snapshot)
    }

    /// Atomically save `snapshot` as the latest snapshot, together with the validator set and the
    /// consensus parameters it says are effective at `snapshot.last_block_height + 1`.
    pub fn save_snapshot(&mut self, snapshot: &ConsensusSnapshot) -> Result<(), StoreError> {
        let mut wb = K::WriteBatch::new();
        let next_height = snapshot.last_block_height + 1;

        if snapshot.is_genesis() {
            let genesis_height = snapshot.last_block_height;
            set_validators_info(
                &mut wb,
                genesis_height,
                genesis_height,
                &snapshot.validators,
            )?;
            set_consensus_params_info(
                &mut wb,
                genesis_height,
                genesis_height,
                &snapshot.consensus_params,
            )?;
        }

        set_validators_info(
            &mut wb,
            next_height,
            snapshot.last_height_validators_changed,
            &snapshot.next_validators,
        )?;
        set_consensus_params_info(
            &mut wb,
            next_height,
            snapshot.last_height_params_changed,
            &snapshot.consensus_params,
        )?;
        set_value(
            &mut wb,
            &CONSENSUS_SNAPSHOT,
            &ConsensusSnapshotBytes::from(snapshot),
            Key::ConsensusSnapshot,
        )?;

        self.store.write(wb)
    }

    /// Get the validator set effective at `height`, or `None` if no record was saved for `height`.
    pub fn load_validators(
        &self,
        height: BlockHeight,
    ) -> Result<Option<HistoryRecord<ValidatorSet>>, StoreError> {
        let info: Option<ValidatorsInfo> = get_value(
            &self.store,
            &concat(&VALIDATORS_INFO, &height.to_le_bytes()),
            Key::ValidatorsInfo { height },
        )?;
        let Some(info) = info else {
            return Ok(None);
        };

        let (validator_set_bytes, key) = match info.validator_set {
            Some(validator_set_bytes) => (validator_set_bytes, Key::ValidatorsInfo { height }),
            None => {
                let changed = info.last_height_changed;
                let key = Key::ValidatorsInfo { height: changed };
                let changed_info: Option<ValidatorsInfo> = get_value(
                    &self.store,
                    &concat(&VALIDATORS_INFO, &changed.to_le_bytes()),
                    key.clone(),
                )?;
                let validator_set_bytes = changed_info
                    .and_then(|changed_info| changed_info.validator_set)
                    .ok_or(KVGetError::ValueExpectedButNotFound { key: key.clone() })?;
                (validator_set_bytes, key)
            }
        };

        let validator_set = ValidatorSet::try_from(validator_set_bytes)
            .map_err(|err| KVGetError::Ed25519DalekError { key, source: err })?;
        Ok(Some(HistoryRecord {
            value: validator_set,
            last_height_changed: info.last_height_changed,
        }))
    }

    /// Get the consensus parameters effective at `height`, or `None` if no record was saved for
    /// `height`.
    pub fn load_consensus_params(
        &self,
        height: BlockHeight,
    ) -> Result<Option<HistoryRecord<ConsensusParams>>, StoreError> {
        let info: Option<ConsensusParamsInfo> = get_value(
            &self.store,
            &concat(&CONSENSUS_PARAMS_INFO, &height.to_le_bytes()),
            Key::ConsensusParamsInfo { height },
        )?;
        let Some(info) = info else {
            return Ok(None);
        };

        let consensus_params = match info.consensus_params {
            Some(consensus_params) => consensus_params,
            None => {
                let changed = info.last_height_changed;
                let changed_info: Option<ConsensusParamsInfo> = get_value(
                    &self.store,
                    &concat(&CONSENSUS_PARAMS_INFO, &changed.to_le_bytes()),
                    Key::ConsensusParamsInfo { height: changed },
                )?;
                changed_info
                    .and_then(|changed_info| changed_info.consensus_params)
                    .ok_or(KVGetError::ValueExpectedButNotFound {
                        key: Key::ConsensusParamsInfo { height: changed },
                    })?
            }
        };

        Ok(Some(HistoryRecord {
            value: consensus_params,
            last_height_changed: info.last_height_changed,
        }))
    }
}

fn set_validators_info(
    wb: &mut impl WriteBatch,
    height: BlockHeight,
    last_height_changed: BlockHeight,
    validator_set: &ValidatorSet,
) -> Result<(), StoreError> {
    let info = ValidatorsInfo {
        last_height_changed,
        validator_set: (height == last_height_changed).then(|| validator_set.into()),
    };
    Ok(set_value(
        wb,
        &concat(&VALIDATORS_INFO, &height.to_le_bytes()),
        &info,
        Key::ValidatorsInfo { height },
    )?)
}

fn set_consensus_params_info(
    wb: &mut impl WriteBatch,
    height: BlockHeight,
    last_height_changed: BlockHeight,
    consensus_params: &ConsensusParams,
) -> Result<(), StoreError> {
    let info = ConsensusParamsInfo {
        last_height_changed,
        consensus_params: (height == last_height_changed).then_some(*consensus_params),
    };
    Ok(set_value(
        wb,
        &concat(&CONSENSUS_PARAMS_INFO, &height.to_le_bytes()),
        &info,
        Key::ConsensusParamsInfo { height },
    )?)
}
