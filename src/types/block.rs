/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the block record stored in the ledger, and the metadata sidecar that identifies it.

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    crypto_primitives::{finalize, CryptoHasher, Digest},
    data_types::{BlockHeight, ChainID, CryptoHash, Data, DataLen, Timestamp},
};

/// An immutable entry of the block ledger.
///
/// `hash` commits to every header field (`chain_id`, `height`, `prev_hash`, `timestamp` and
/// `data_hash`), and `data_hash` commits to `data`, so a block can be checked for integrity with
/// [`is_correct`](Self::is_correct) without any outside context.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Block {
    pub chain_id: ChainID,
    pub height: BlockHeight,
    pub prev_hash: CryptoHash,
    pub timestamp: Timestamp,
    pub data_hash: CryptoHash,
    pub hash: CryptoHash,
    pub data: Data,
}

impl Block {
    pub fn new(
        chain_id: ChainID,
        height: BlockHeight,
        prev_hash: CryptoHash,
        timestamp: Timestamp,
        data: Data,
    ) -> Block {
        let data_hash = Block::data_hash(&data);
        Block {
            chain_id,
            height,
            prev_hash,
            timestamp,
            data_hash,
            hash: Block::hash(chain_id, height, &prev_hash, timestamp, &data_hash),
            data,
        }
    }

    pub fn hash(
        chain_id: ChainID,
        height: BlockHeight,
        prev_hash: &CryptoHash,
        timestamp: Timestamp,
        data_hash: &CryptoHash,
    ) -> CryptoHash {
        let mut hasher = CryptoHasher::new();
        hasher.update(chain_id.int().to_le_bytes());
        hasher.update(height.to_le_bytes());
        hasher.update(prev_hash.bytes());
        hasher.update(timestamp.millis().to_le_bytes());
        hasher.update(data_hash.bytes());
        finalize(hasher)
    }

    /// Hash each datum's length followed by its bytes, so that moving bytes between datums changes the
    /// hash.
    pub fn data_hash(data: &Data) -> CryptoHash {
        let mut hasher = CryptoHasher::new();
        for datum in data.iter() {
            hasher.update((datum.bytes().len() as u64).to_le_bytes());
            hasher.update(datum.bytes());
        }
        finalize(hasher)
    }

    /// Checks that `data_hash` matches `data` and that `hash` matches the header fields.
    pub fn is_correct(&self) -> bool {
        self.data_hash == Block::data_hash(&self.data)
            && self.hash
                == Block::hash(
                    self.chain_id,
                    self.height,
                    &self.prev_hash,
                    self.timestamp,
                    &self.data_hash,
                )
    }
}

/// Canonical identifier of a block, passed to the execution boundary alongside the block itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct BlockID {
    pub hash: CryptoHash,
    pub data_hash: CryptoHash,
}

impl BlockID {
    /// Get the `BlockID` of `block`.
    pub fn of(block: &Block) -> BlockID {
        BlockID {
            hash: block.hash,
            data_hash: block.data_hash,
        }
    }
}

/// Sidecar record stored next to every block in the ledger.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct BlockMeta {
    pub block_id: BlockID,
    pub height: BlockHeight,
    pub num_txs: DataLen,
}

impl BlockMeta {
    pub fn of(block: &Block) -> BlockMeta {
        BlockMeta {
            block_id: BlockID::of(block),
            height: block.height,
            num_txs: block.data.len(),
        }
    }
}
