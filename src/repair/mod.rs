/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The state repair protocol: bringing the app store back in sync with the block ledger after an
//! unclean shutdown.
//!
//! # Why stores diverge
//!
//! Executing a finalized block writes to three stores one after another: the block ledger already
//! holds the block, then the app commits its version, then the consensus store saves the next
//! snapshot. On top of that, the app's async commit pipeline may have committed versions that it
//! has not yet flushed. A crash anywhere in this sequence leaves the app behind the ledger, possibly
//! with versions that were never made durable downstream.
//!
//! # Protocol
//!
//! [`repair_state`] runs before anything else in the process:
//! 1. Relax the [consistency checks](crate::consistency) for the duration of the run.
//! 2. Read the ledger height `L` (0 if the data directory has no ledger). If
//!    `L <= start_block_height + pipeline_depth` the chain is too short for the pipeline to have lost
//!    anything: skip.
//! 3. Load the consensus snapshot (or bootstrap it from genesis).
//! 4. Resolve the start version: the operator's `start_height` if set, else the app's latest version
//!    minus `pipeline_depth`. It must not be 0, and the app must not be ahead of the ledger.
//! 5. If the async commit version already equals `L`, the app is caught up: skip. If it is below the
//!    start version, start from it instead.
//! 6. [Reconstruct](checkpoint) the snapshot at the start version, then truncate the app store to it.
//! 7. [Replay](replay) every block from the start version up to `L`, checking after each block that
//!    the app reports it as committed.
//! 8. Clear every stale lock marker in the data directory.
//!
//! Stores are opened with [`LockPolicy::Reclaim`], which takes over markers left by a crashed process
//! but fails with [`StoreError::Locked`] if a running process still holds a store.
//!
//! Reconstruction happens before truncation, so a run that fails on a missing history record has not
//! written to any store.
//!
//! # Outcomes
//!
//! A run that did not need to replay anything is still a success ([`RepairOutcome::NotNeeded`],
//! [`RepairOutcome::AlreadyCaughtUp`]), and clears lock markers like a run that did. Any failure is
//! returned as a [`RepairError`] without clearing lock markers. [`repair_state_on_start`] turns
//! failures into a panic, for callers that cannot start without a consistent state.

use std::{fmt::Display, io, path::PathBuf, time::SystemTime};

use crate::{
    app::{App, AppInstance},
    config::Configuration,
    consistency::{ConsistencyChecks, RepairContext},
    event_handlers::EventHandlers,
    events::*,
    executor::{BlockExecutor, ExecutionError},
    stores::{
        app_store::{CommitMode, VersionedAppStore},
        consensus_store::ConsensusStore,
        ledger::BlockLedger,
        lock::{clear_locks, LockPolicy},
        pluggables::KVStore,
        StoreError, BLOCK_STORE_DB,
    },
    types::{
        data_types::{AppVersion, BlockHeight, CryptoHash},
        snapshot::{ConsensusSnapshot, Genesis},
    },
};

pub mod checkpoint;

pub(crate) mod replay;

/// What a successful [`repair_state`] run did.
#[derive(Clone, Debug, PartialEq)]
pub enum RepairOutcome {
    /// The ledger is too short for the async commit pipeline to have lost any version.
    NotNeeded {
        ledger_height: BlockHeight,
        start_block_height: BlockHeight,
    },

    /// The app's async commit version already equals the ledger height.
    AlreadyCaughtUp { ledger_height: BlockHeight },

    /// Every block in `(start_version, end_height]` was replayed.
    Repaired {
        start_version: AppVersion,
        end_height: BlockHeight,
        app_hash: CryptoHash,
        snapshot: ConsensusSnapshot,
    },
}

/// Run the state repair protocol on the stores in `config.data_dir`.
///
/// `context`'s consistency checks are relaxed for the duration of the run, and restored before this
/// function returns, whether it succeeds or fails. `genesis` is only called if the consensus store
/// has no snapshot.
pub fn repair_state<K: KVStore, A: App<K>>(
    config: Configuration,
    context: &mut RepairContext,
    app: A,
    genesis: impl FnOnce() -> Genesis,
) -> Result<RepairOutcome, RepairError> {
    let mut config = config;
    let handlers = EventHandlers::from_config(&mut config);

    let checks_override = context.override_checks();
    let outcome = repair_with_stores::<K, A>(
        &config,
        checks_override.checks(),
        app,
        genesis,
        &handlers,
    )?;

    let removed = clear_locks(&config.data_dir).map_err(|err| RepairError::ClearLocks {
        data_dir: config.data_dir.clone(),
        source: err,
    })?;
    handlers.fire_handlers(Event::ClearLocks(ClearLocksEvent {
        timestamp: SystemTime::now(),
        data_dir: config.data_dir.clone(),
        removed,
    }));

    checks_override.restore();
    Ok(outcome)
}

/// Run [`repair_state`], panicking if it fails.
pub fn repair_state_on_start<K: KVStore, A: App<K>>(
    config: Configuration,
    context: &mut RepairContext,
    app: A,
    genesis: impl FnOnce() -> Genesis,
) -> RepairOutcome {
    match repair_state::<K, A>(config, context, app, genesis) {
        Ok(outcome) => outcome,
        Err(err) => {
            log::error!("State repair failed: {}", err);
            panic!("State repair failed: {}", err)
        }
    }
}

// Every store opened here is closed, and its lock marker removed, when this function returns.
fn repair_with_stores<K: KVStore, A: App<K>>(
    config: &Configuration,
    checks: ConsistencyChecks,
    app: A,
    genesis: impl FnOnce() -> Genesis,
    handlers: &EventHandlers,
) -> Result<RepairOutcome, RepairError> {
    let start_block_height = config.start_block_height;

    // A data directory without a ledger has nothing to replay. Opening the ledger would create it.
    if !config.data_dir.join(BLOCK_STORE_DB).is_dir() {
        return Ok(ledger_too_short(
            BlockHeight::new(0),
            start_block_height,
            handlers,
        ));
    }

    let ledger = BlockLedger::<K>::open(&config.data_dir, LockPolicy::Reclaim)?;
    let ledger_height = ledger.height()?;
    if ledger_height <= start_block_height.saturating_add(config.pipeline_depth) {
        return Ok(ledger_too_short(ledger_height, start_block_height, handlers));
    }

    let app_store = VersionedAppStore::<K>::open(&config.data_dir, LockPolicy::Reclaim)?;
    let mut app = AppInstance::new(app, app_store);
    let mut consensus_store = ConsensusStore::<K>::open(&config.data_dir, LockPolicy::Reclaim)?;
    let snapshot = consensus_store.load_snapshot_or_genesis(ledger_height, checks, genesis)?;

    let app_version = app.latest_version()?;
    if app_version.height() > ledger_height {
        return Err(RepairError::AppAheadOfLedger {
            app_version,
            ledger_height,
        });
    }

    let mut start_version = if config.start_height != 0 {
        AppVersion::new(config.start_height)
    } else {
        app_version.saturating_sub(config.pipeline_depth)
    };
    if start_version == AppVersion::new(0) {
        return Err(RepairError::ZeroStartVersion);
    }

    let commit_version = app.commit_version()?;
    handlers.fire_handlers(Event::StartRepair(StartRepairEvent {
        timestamp: SystemTime::now(),
        ledger_height,
        start_version,
        commit_version,
    }));

    if commit_version.height() == ledger_height {
        handlers.fire_handlers(Event::SkipRepair(SkipRepairEvent {
            timestamp: SystemTime::now(),
            ledger_height,
            reason: SkipReason::AlreadyCaughtUp,
        }));
        return Ok(RepairOutcome::AlreadyCaughtUp { ledger_height });
    }

    if commit_version < start_version {
        start_version = commit_version;
        if start_version == AppVersion::new(0) {
            return Err(RepairError::ZeroStartVersion);
        }
    }

    let checkpoint = checkpoint::construct_start_state(&snapshot, &consensus_store, start_version)?;
    handlers.fire_handlers(Event::ReconstructCheckpoint(ReconstructCheckpointEvent {
        timestamp: SystemTime::now(),
        start_version,
    }));

    app.load_start_version(start_version, checks)?;

    let mut executor = BlockExecutor::new(
        &mut app,
        &mut consensus_store,
        checks,
        config.parallel_txs,
        CommitMode::Flushed,
    );
    let snapshot = replay::replay(
        &mut executor,
        &ledger,
        checkpoint,
        start_version,
        ledger_height,
        handlers,
    )?;
    let app_hash = executor.info()?.last_block_app_hash;

    handlers.fire_handlers(Event::EndRepair(EndRepairEvent {
        timestamp: SystemTime::now(),
        start_version,
        end_height: ledger_height,
        app_hash,
    }));

    Ok(RepairOutcome::Repaired {
        start_version,
        end_height: ledger_height,
        app_hash,
        snapshot,
    })
}

fn ledger_too_short(
    ledger_height: BlockHeight,
    start_block_height: BlockHeight,
    handlers: &EventHandlers,
) -> RepairOutcome {
    handlers.fire_handlers(Event::SkipRepair(SkipRepairEvent {
        timestamp: SystemTime::now(),
        ledger_height,
        reason: SkipReason::LedgerTooShort { start_block_height },
    }));
    RepairOutcome::NotNeeded {
        ledger_height,
        start_block_height,
    }
}

/// History record read while [reconstructing](checkpoint::construct_start_state) a checkpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckpointRecord {
    Validators,
    ConsensusParams,
}

impl Display for CheckpointRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointRecord::Validators => write!(f, "validator set"),
            CheckpointRecord::ConsensusParams => write!(f, "consensus params"),
        }
    }
}

/// Error that aborts a [`repair_state`] run.
#[derive(Debug)]
pub enum RepairError {
    /// The resolved start version is 0, which has no block to replay from.
    ZeroStartVersion,

    AppAheadOfLedger {
        app_version: AppVersion,
        ledger_height: BlockHeight,
    },

    CheckpointRecordMissing {
        record: CheckpointRecord,
        height: BlockHeight,
    },

    BlockMissing {
        height: BlockHeight,
    },

    /// After replaying the block at `height`, the app reported `committed_height` as its last
    /// committed block.
    ReplayDiverged {
        height: BlockHeight,
        committed_height: BlockHeight,
    },

    ClearLocks {
        data_dir: PathBuf,
        source: io::Error,
    },

    StoreError(StoreError),

    ExecutionError(ExecutionError),
}

impl From<StoreError> for RepairError {
    fn from(value: StoreError) -> Self {
        RepairError::StoreError(value)
    }
}

impl From<ExecutionError> for RepairError {
    fn from(value: ExecutionError) -> Self {
        RepairError::ExecutionError(value)
    }
}

impl Display for RepairError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepairError::ZeroStartVersion => write!(f, "resolved start version is 0"),
            RepairError::AppAheadOfLedger {
                app_version,
                ledger_height,
            } => write!(
                f,
                "app version {} is ahead of ledger height {}",
                app_version, ledger_height
            ),
            RepairError::CheckpointRecordMissing { record, height } => {
                write!(f, "no {} recorded at height {}", record, height)
            }
            RepairError::BlockMissing { height } => {
                write!(f, "ledger has no block at height {}", height)
            }
            RepairError::ReplayDiverged {
                height,
                committed_height,
            } => write!(
                f,
                "replayed block at height {} but app reports height {} as committed",
                height, committed_height
            ),
            RepairError::ClearLocks { data_dir, source } => write!(
                f,
                "failed to clear lock markers in {}: {}",
                data_dir.display(),
                source
            ),
            RepairError::StoreError(err) => write!(f, "{}", err),
            RepairError::ExecutionError(err) => write!(f, "{}", err),
        }
    }
}
