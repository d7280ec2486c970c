/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the repair
//! [config](crate::config::Configuration).
//!
//! This crate logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [ReplayBlock](crate::events::ReplayBlockEvent) is printed:
//!
//! ```text
//! ReplayBlock, 1701329264, 104, fNGCJykq0MZfS5dBeX8Rkx2mDn9Kq1AvCjRn8kQ3bJE
//! ```
//!
//! In the snippet:
//! - The third value is the height the app reports as committed after the block.
//! - The fourth value is the Base64 encoding of the app hash after the block. It is printed in full so
//!   that the lines of different replicas can be compared.

use std::time::SystemTime;

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};

use crate::events::*;

// Names of each event in PascalCase for printing:
pub const START_REPAIR: &str = "StartRepair";
pub const SKIP_REPAIR: &str = "SkipRepair";
pub const RECONSTRUCT_CHECKPOINT: &str = "ReconstructCheckpoint";
pub const REPLAY_BLOCK: &str = "ReplayBlock";
pub const END_REPAIR: &str = "EndRepair";
pub const CLEAR_LOCKS: &str = "ClearLocks";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for StartRepairEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |start_repair_event: &StartRepairEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                START_REPAIR,
                secs_since_unix_epoch(start_repair_event.timestamp),
                start_repair_event.ledger_height,
                start_repair_event.start_version,
                start_repair_event.commit_version
            )
        };
        Box::new(logger)
    }
}

impl Logger for SkipRepairEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |skip_repair_event: &SkipRepairEvent| match skip_repair_event.reason {
            SkipReason::LedgerTooShort { start_block_height } => log::info!(
                "{}, {}, {}, LedgerTooShort, {}",
                SKIP_REPAIR,
                secs_since_unix_epoch(skip_repair_event.timestamp),
                skip_repair_event.ledger_height,
                start_block_height
            ),
            SkipReason::AlreadyCaughtUp => log::info!(
                "{}, {}, {}, AlreadyCaughtUp",
                SKIP_REPAIR,
                secs_since_unix_epoch(skip_repair_event.timestamp),
                skip_repair_event.ledger_height
            ),
        };
        Box::new(logger)
    }
}

impl Logger for ReconstructCheckpointEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |reconstruct_checkpoint_event: &ReconstructCheckpointEvent| {
            log::info!(
                "{}, {}, {}",
                RECONSTRUCT_CHECKPOINT,
                secs_since_unix_epoch(reconstruct_checkpoint_event.timestamp),
                reconstruct_checkpoint_event.start_version
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReplayBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |replay_block_event: &ReplayBlockEvent| {
            log::info!(
                "{}, {}, {}, {}",
                REPLAY_BLOCK,
                secs_since_unix_epoch(replay_block_event.timestamp),
                replay_block_event.height,
                STANDARD_NO_PAD.encode(replay_block_event.app_hash.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for EndRepairEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |end_repair_event: &EndRepairEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                END_REPAIR,
                secs_since_unix_epoch(end_repair_event.timestamp),
                end_repair_event.start_version,
                end_repair_event.end_height,
                STANDARD_NO_PAD.encode(end_repair_event.app_hash.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for ClearLocksEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |clear_locks_event: &ClearLocksEvent| {
            log::info!(
                "{}, {}, {}, {}",
                CLEAR_LOCKS,
                secs_since_unix_epoch(clear_locks_event.timestamp),
                clear_locks_event.data_dir.display(),
                clear_locks_event.removed.len()
            )
        };
        Box::new(logger)
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}
