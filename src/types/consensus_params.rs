/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Consensus parameters: chain-wide limits that a block must respect to be executed.

use borsh::{BorshDeserialize, BorshSerialize};

use super::{block::Block, data_types::DataLen};

/// Limits on the contents of a block.
///
/// The parameters that govern the block at height `h` are the ones recorded in the consensus store as
/// effective at `h`. An [`App`](crate::app::App) may replace them by returning
/// `consensus_params_updates`; the replacement governs blocks from the next height on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ConsensusParams {
    /// Maximum number of datums (transactions) in a block.
    pub max_block_txs: u32,

    /// Maximum total number of payload bytes in a block.
    pub max_block_bytes: u64,
}

impl ConsensusParams {
    pub const fn new(max_block_txs: u32, max_block_bytes: u64) -> Self {
        Self {
            max_block_txs,
            max_block_bytes,
        }
    }

    /// Check whether `block` respects these limits.
    pub fn admits(&self, block: &Block) -> bool {
        block.data.len() <= DataLen::new(self.max_block_txs)
            && block.data.byte_len() <= self.max_block_bytes
    }
}

impl Default for ConsensusParams {
    fn default() -> Self {
        ConsensusParams::new(10_000, 21 * 1024 * 1024)
    }
}
