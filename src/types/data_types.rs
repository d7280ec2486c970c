/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that exist only to store bytes, and do not have any major "active" behavior.

use std::{
    fmt::{self, Debug, Display, Formatter},
    hash::Hash,
    ops::{Add, AddAssign, Sub},
};

use borsh::{BorshDeserialize, BorshSerialize};

/// Number that uniquely identifies a blockchain.
///
/// Every block in the same ledger should share the same `ChainID`. The execution boundary refuses to
/// apply a block whose chain ID differs from the one in the consensus snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct ChainID(u64);

impl ChainID {
    /// Create a new `ChainID` with an `int` value.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the `u64` value of this `ChainID`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

/// Height of a block in the block ledger.
///
/// Heights in a ledger are contiguous, starting at the ledger's base height and increasing by 1 for
/// every appended block. A height of 0 is used to mean "no blocks yet".
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct BlockHeight(u64);

impl BlockHeight {
    /// Create a new `BlockHeight` with an `int` inner value.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` value of this `BlockHeight`.
    pub const fn int(&self) -> u64 {
        self.0
    }

    /// Get the little-endian representation of the inner `u64` value of this `BlockHeight`.
    pub fn to_le_bytes(&self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    /// Get the height directly below this one, or `None` if this is height 0.
    pub fn checked_prev(&self) -> Option<BlockHeight> {
        self.0.checked_sub(1).map(BlockHeight)
    }

    /// Add `n` to this height, stopping at `u64::MAX`.
    pub const fn saturating_add(&self, n: u64) -> BlockHeight {
        BlockHeight(self.0.saturating_add(n))
    }
}

impl Display for BlockHeight {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl AddAssign<u64> for BlockHeight {
    fn add_assign(&mut self, rhs: u64) {
        self.0.add_assign(rhs)
    }
}

impl Add<u64> for BlockHeight {
    type Output = BlockHeight;
    fn add(self, rhs: u64) -> Self::Output {
        BlockHeight::new(self.0.add(rhs))
    }
}

impl Sub<BlockHeight> for BlockHeight {
    type Output = u64;
    fn sub(self, rhs: BlockHeight) -> Self::Output {
        self.0 - rhs.0
    }
}

/// Version of the application's versioned store.
///
/// Every committed block produces exactly one new version, numbered after the height of the block
/// that produced it. The two are therefore directly comparable through [`AppVersion::height`] and
/// [`AppVersion::at_height`].
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct AppVersion(u64);

impl AppVersion {
    /// Create a new `AppVersion` wrapping `int`.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` value of this `AppVersion`.
    pub const fn int(&self) -> u64 {
        self.0
    }

    /// The version produced by committing the block at `height`.
    pub const fn at_height(height: BlockHeight) -> Self {
        Self(height.int())
    }

    /// The height of the block whose commit produced this version.
    pub const fn height(&self) -> BlockHeight {
        BlockHeight::new(self.0)
    }

    /// Get the little-endian representation of the inner `u64` value of this `AppVersion`.
    pub fn to_le_bytes(&self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    /// Subtract `depth` from this version, stopping at 0.
    pub fn saturating_sub(&self, depth: u64) -> AppVersion {
        AppVersion(self.0.saturating_sub(depth))
    }
}

impl Display for AppVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl Add<u64> for AppVersion {
    type Output = AppVersion;
    fn add(self, rhs: u64) -> Self::Output {
        AppVersion(self.0.add(rhs))
    }
}

impl Sub<AppVersion> for AppVersion {
    type Output = u64;
    fn sub(self, rhs: AppVersion) -> Self::Output {
        self.0 - rhs.0
    }
}

/// Milliseconds since the Unix Epoch, as recorded in a block by its proposer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, BorshDeserialize, BorshSerialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a new `Timestamp` wrapping `millis`.
    pub const fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Get the inner number of milliseconds since the Unix Epoch.
    pub const fn millis(&self) -> u64 {
        self.0
    }
}

/// 32-byte cryptographic hash.
///
/// Block hashes, data hashes and app hashes are all SHA256 hashes produced with
/// [`CryptoHasher`](super::crypto_primitives::CryptoHasher).
#[derive(Clone, Copy, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    /// Create a new `CryptoHash` wrapping `bytes`.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The all-zeroes hash. Used as the `prev_hash` of the first block in a ledger and as the app hash
    /// "before" the first app version.
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Get the inner `[u8; 32]` value of this `CryptoHash`.
    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Display for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque transaction payload of a [`Block`](super::block::Block).
///
/// The repair protocol never interprets `Data`. Only the [`App`](crate::app::App) does, during
/// replay. By convention each [`Datum`] holds one transaction, which is what
/// [`ConsensusParams::max_block_txs`](super::consensus_params::ConsensusParams) limits.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default, BorshDeserialize, BorshSerialize)]
pub struct Data(Vec<Datum>);

impl Data {
    /// Create a new `Data` wrapping `datum_vec`.
    pub fn new(datum_vec: Vec<Datum>) -> Self {
        Self(datum_vec)
    }

    /// Get a reference to the inner `Vec<Datum>` of this `Data`.
    pub const fn vec(&self) -> &Vec<Datum> {
        &self.0
    }

    /// Get how many `Datum`s are in this `Data`.
    pub fn len(&self) -> DataLen {
        DataLen::new(self.0.len() as u32)
    }

    /// Check whether this `Data` contains no `Datum`s.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of payload bytes across all `Datum`s.
    pub fn byte_len(&self) -> u64 {
        self.0.iter().map(|datum| datum.bytes().len() as u64).sum()
    }

    /// Iterate through the `Datum`s that are in this `Data` in the order they were provided in to
    /// [`new`](Self::new).
    pub fn iter(&self) -> std::slice::Iter<'_, Datum> {
        self.0.iter()
    }
}

/// Number of [`Datum`] stored in a block's [`Data`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, BorshDeserialize, BorshSerialize)]
pub struct DataLen(u32);

impl DataLen {
    /// Create a new `DataLen` wrapping `len`.
    pub fn new(len: u32) -> DataLen {
        Self(len)
    }

    /// Get the inner `u32` of this `DataLen`.
    pub const fn int(&self) -> u32 {
        self.0
    }
}

/// Unit of [`Data`]. Usually one transaction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct Datum(Vec<u8>);

impl Datum {
    /// Create a new `Datum` wrapping `bytes`.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Get a reference to the inner `Vec<u8>` of this `Datum`.
    pub const fn bytes(&self) -> &Vec<u8> {
        &self.0
    }
}

/// Weight of a specific validator's votes in consensus decisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct Power(u64);

impl Power {
    /// Create a new `Power` wrapping `int`.
    pub fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` value of this `Power`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

/// Sum of the [`Power`]s of all validators in a [`ValidatorSet`](super::validator_set::ValidatorSet).
///
/// The inner type is `u128` so that summing up large `Power`s does not overflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, BorshDeserialize, BorshSerialize)]
pub struct TotalPower(u128);

impl TotalPower {
    /// Create a new `TotalPower` wrapping `int`.
    pub(crate) fn new(int: u128) -> Self {
        Self(int)
    }

    /// Get the inner `u128` value of this `TotalPower`.
    pub const fn int(&self) -> u128 {
        self.0
    }
}

impl AddAssign<Power> for TotalPower {
    fn add_assign(&mut self, rhs: Power) {
        self.0.add_assign(rhs.0 as u128)
    }
}
