/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of the events published by a state repair run, for event handling and logging.
//!
//! An event for a given action indicates that the action has been completed.
//!
//! Users can register handlers for each event type through the repair
//! [`Configuration`](crate::config::Configuration). If
//! [`log_events`](crate::config::Configuration::log_events) is set, every event is also
//! [logged](crate::logging).

use std::{path::PathBuf, time::SystemTime};

use crate::types::data_types::{AppVersion, BlockHeight, CryptoHash};

pub enum Event {
    StartRepair(StartRepairEvent),
    SkipRepair(SkipRepairEvent),
    ReconstructCheckpoint(ReconstructCheckpointEvent),
    ReplayBlock(ReplayBlockEvent),
    EndRepair(EndRepairEvent),
    ClearLocks(ClearLocksEvent),
}

/// The stores have been inspected and the start version resolved.
pub struct StartRepairEvent {
    pub timestamp: SystemTime,
    pub ledger_height: BlockHeight,
    pub start_version: AppVersion,
    pub commit_version: AppVersion,
}

/// The repair run decided that no replay is needed.
pub struct SkipRepairEvent {
    pub timestamp: SystemTime,
    pub ledger_height: BlockHeight,
    pub reason: SkipReason,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The ledger is no higher than `start_block_height` plus the pipeline depth.
    LedgerTooShort { start_block_height: BlockHeight },

    /// The app's async commit pipeline already reached the ledger height.
    AlreadyCaughtUp,
}

/// A consensus snapshot has been reconstructed for `start_version`.
pub struct ReconstructCheckpointEvent {
    pub timestamp: SystemTime,
    pub start_version: AppVersion,
}

/// The block at `height` has been replayed, and the app reports `height` as committed with `app_hash`.
pub struct ReplayBlockEvent {
    pub timestamp: SystemTime,
    pub height: BlockHeight,
    pub app_hash: CryptoHash,
}

/// Every block from `start_version + 1` to `end_height` has been replayed.
pub struct EndRepairEvent {
    pub timestamp: SystemTime,
    pub start_version: AppVersion,
    pub end_height: BlockHeight,
    pub app_hash: CryptoHash,
}

/// The lock markers under `data_dir` have been cleared. `removed` lists the ones that existed.
pub struct ClearLocksEvent {
    pub timestamp: SystemTime,
    pub data_dir: PathBuf,
    pub removed: Vec<PathBuf>,
}
