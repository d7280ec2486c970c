/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The block ledger: the append-only, height-indexed record of every finalized block.
//!
//! The ledger is the source of truth the other two stores are repaired against. Its latest height
//! is what a node's app store and consensus store must catch up to, and every block the repair
//! protocol replays is read from here.
//!
//! Heights in the ledger are contiguous from [`base_height`](BlockLedger::base_height) up to
//! [`height`](BlockLedger::height), and every block's `prev_hash` is the hash of the block below it.
//! [`append_block`](BlockLedger::append_block) is the only way to grow the ledger, and it refuses any
//! block that would break either property.

use std::path::Path;

use crate::types::{
    block::{Block, BlockMeta},
    data_types::BlockHeight,
};

use super::{
    handle::StoreHandle,
    lock::LockPolicy,
    pluggables::{get_value, set_value, Key, KVStore, WriteBatch},
    variables::*,
    StoreError, StoreKind,
};

pub struct BlockLedger<K: KVStore> {
    store: StoreHandle<K>,
}

impl<K: KVStore> BlockLedger<K> {
    /// Open the ledger in the `blockstore` subdirectory of `data_dir`.
    pub fn open(data_dir: &Path, policy: LockPolicy) -> Result<BlockLedger<K>, StoreError> {
        Ok(BlockLedger {
            store: StoreHandle::open(data_dir, StoreKind::BlockStore, policy)?,
        })
    }

    /// Height of the latest block in the ledger, or 0 if the ledger is empty.
    pub fn height(&self) -> Result<BlockHeight, StoreError> {
        Ok(get_value(&self.store, &LEDGER_HEIGHT, Key::LedgerHeight)?.unwrap_or(BlockHeight::new(0)))
    }

    /// Height of the first block in the ledger, or 0 if the ledger is empty.
    pub fn base_height(&self) -> Result<BlockHeight, StoreError> {
        Ok(get_value(&self.store, &LEDGER_BASE_HEIGHT, Key::LedgerBaseHeight)?
            .unwrap_or(BlockHeight::new(0)))
    }

    /// Get the block at `height`, if the ledger has one.
    pub fn block(&self, height: BlockHeight) -> Result<Option<Block>, StoreError> {
        Ok(get_value(
            &self.store,
            &concat(&BLOCK_AT_HEIGHT, &height.to_le_bytes()),
            Key::BlockAtHeight { height },
        )?)
    }

    /// Get the metadata sidecar of the block at `height`, if the ledger has one.
    pub fn block_meta(&self, height: BlockHeight) -> Result<Option<BlockMeta>, StoreError> {
        Ok(get_value(
            &self.store,
            &concat(&BLOCK_META_AT_HEIGHT, &height.to_le_bytes()),
            Key::BlockMetaAtHeight { height },
        )?)
    }

    /// Append `block` and its metadata sidecar to the ledger.
    ///
    /// The first block appended to an empty ledger may have any height of at least 1, and becomes the
    /// ledger's base. Every later block must sit at `height + 1` and extend the latest block.
    pub fn append_block(&mut self, block: &Block) -> Result<(), StoreError> {
        if !block.is_correct() {
            return Err(StoreError::IncorrectBlock {
                height: block.height,
            });
        }

        let latest_height = self.height()?;
        let mut wb = K::WriteBatch::new();
        if latest_height == BlockHeight::new(0) {
            if block.height == BlockHeight::new(0) {
                return Err(StoreError::NonContiguousBlock {
                    expected: BlockHeight::new(1),
                    got: block.height,
                });
            }
            set_value(
                &mut wb,
                &LEDGER_BASE_HEIGHT,
                &block.height,
                Key::LedgerBaseHeight,
            )?;
        } else {
            if block.height != latest_height + 1 {
                return Err(StoreError::NonContiguousBlock {
                    expected: latest_height + 1,
                    got: block.height,
                });
            }
            let latest_block = self.block(latest_height)?.ok_or(StoreError::KVGetError(
                super::KVGetError::ValueExpectedButNotFound {
                    key: Key::BlockAtHeight {
                        height: latest_height,
                    },
                },
            ))?;
            if block.prev_hash != latest_block.hash {
                return Err(StoreError::PrevHashMismatch {
                    height: block.height,
                });
            }
        }

        set_value(
            &mut wb,
            &concat(&BLOCK_AT_HEIGHT, &block.height.to_le_bytes()),
            block,
            Key::BlockAtHeight {
                height: block.height,
            },
        )?;
        set_value(
            &mut wb,
            &concat(&BLOCK_META_AT_HEIGHT, &block.height.to_le_bytes()),
            &BlockMeta::of(block),
            Key::BlockMetaAtHeight {
                height: block.height,
            },
        )?;
        set_value(&mut wb, &LEDGER_HEIGHT, &block.height, Key::LedgerHeight)?;

        self.store.write(wb)
    }
}
