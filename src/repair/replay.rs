/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Sequential replay of ledger blocks through the execution boundary.

use std::time::SystemTime;

use crate::{
    app::App,
    event_handlers::EventHandlers,
    events::{Event, ReplayBlockEvent},
    executor::BlockExecutor,
    stores::{ledger::BlockLedger, pluggables::KVStore},
    types::{
        data_types::{AppVersion, BlockHeight},
        snapshot::ConsensusSnapshot,
    },
};

use super::RepairError;

/// Apply every block in `(start, end]` in height order, each on top of the snapshot the previous one
/// produced, and return the snapshot after `end`.
///
/// After each block the app is asked which height it committed, and replay stops unless that is the
/// block's height. Replay also stops at the first block that is missing from the ledger or fails to
/// apply. Blocks applied before that stay applied.
pub(crate) fn replay<K: KVStore, A: App<K>>(
    executor: &mut BlockExecutor<K, A>,
    ledger: &BlockLedger<K>,
    snapshot: ConsensusSnapshot,
    start: AppVersion,
    end: BlockHeight,
    handlers: &EventHandlers,
) -> Result<ConsensusSnapshot, RepairError> {
    let mut snapshot = snapshot;
    let mut height = start.height() + 1;
    while height <= end {
        let block = ledger
            .block(height)?
            .ok_or(RepairError::BlockMissing { height })?;
        let block_meta = ledger
            .block_meta(height)?
            .ok_or(RepairError::BlockMissing { height })?;

        snapshot = executor.apply_block(&snapshot, &block_meta.block_id, &block)?;
        let info = executor.info()?;
        if info.last_block_height != height {
            return Err(RepairError::ReplayDiverged {
                height,
                committed_height: info.last_block_height,
            });
        }

        handlers.fire_handlers(Event::ReplayBlock(ReplayBlockEvent {
            timestamp: SystemTime::now(),
            height: info.last_block_height,
            app_hash: info.last_block_app_hash,
        }));

        height += 1;
    }

    Ok(snapshot)
}
