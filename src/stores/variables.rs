/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Byte-prefixes that specify where each stored variable lives in its store's key-value store.
//!
//! # List of stored variables
//!
//! ## Block ledger (`blockstore`)
//!
//! |Variable|Type|Description|
//! |---|---|---|
//! |Ledger Base Height|[`BlockHeight`](crate::types::data_types::BlockHeight)|Height of the first block in the ledger.|
//! |Ledger Height|[`BlockHeight`](crate::types::data_types::BlockHeight)|Height of the latest block in the ledger.|
//! |Block at Height|[`BlockHeight`](crate::types::data_types::BlockHeight) -> [`Block`](crate::types::block::Block)|Every block in the ledger.|
//! |Block Meta at Height|[`BlockHeight`](crate::types::data_types::BlockHeight) -> [`BlockMeta`](crate::types::block::BlockMeta)|Metadata sidecar of every block.|
//!
//! ## Consensus store (`state`)
//!
//! |Variable|Type|Description|
//! |---|---|---|
//! |Consensus Snapshot|[`ConsensusSnapshot`](crate::types::snapshot::ConsensusSnapshot)|The latest snapshot.|
//! |Validators Info|[`BlockHeight`](crate::types::data_types::BlockHeight) -> `ValidatorsInfo`|Validator set effective at each height: either the full set (at the height it changed) or the height it last changed.|
//! |Consensus Params Info|[`BlockHeight`](crate::types::data_types::BlockHeight) -> `ConsensusParamsInfo`|Same as Validators Info, for consensus parameters.|
//!
//! ## Versioned app store (`application`)
//!
//! |Variable|Type|Description|
//! |---|---|---|
//! |App State|[`Vec<u8>`] -> [`Vec<u8>`]|The app state at the latest version.|
//! |Latest Version|[`AppVersion`](crate::types::data_types::AppVersion)|Highest version written.|
//! |Commit Version|[`AppVersion`](crate::types::data_types::AppVersion)|Highest version flushed through the async commit pipeline.|
//! |Version App Hash|[`AppVersion`](crate::types::data_types::AppVersion) -> [`CryptoHash`](crate::types::data_types::CryptoHash)|App hash of every retained version.|
//! |Version Undo|[`AppVersion`](crate::types::data_types::AppVersion) -> [`AppStateUpdates`](crate::types::update_sets::AppStateUpdates)|Updates that revert a version to the one before it.|
//!
//! Single values sit at their one-byte constant key. Mappings sit at the constant prefix concatenated
//! with the little-endian bytes of the height or version (or, for App State, the raw app key). Every
//! value is Borsh-serialized.

// Block ledger.
pub const LEDGER_BASE_HEIGHT: [u8; 1] = [0];
pub const LEDGER_HEIGHT: [u8; 1] = [1];
pub const BLOCK_AT_HEIGHT: [u8; 1] = [2];
pub const BLOCK_META_AT_HEIGHT: [u8; 1] = [3];

// Consensus store.
pub const CONSENSUS_SNAPSHOT: [u8; 1] = [0];
pub const VALIDATORS_INFO: [u8; 1] = [1];
pub const CONSENSUS_PARAMS_INFO: [u8; 1] = [2];

// Versioned app store.
pub const APP_STATE: [u8; 1] = [0];
pub const LATEST_VERSION: [u8; 1] = [1];
pub const COMMIT_VERSION: [u8; 1] = [2];
pub const VERSION_APP_HASH: [u8; 1] = [3];
pub const VERSION_UNDO: [u8; 1] = [4];

/// Concatenate two byteslices into one vector.
pub fn concat(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut res = Vec::with_capacity(a.len() + b.len());
    res.extend_from_slice(a);
    res.extend_from_slice(b);
    res
}
