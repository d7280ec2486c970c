/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that store updates produced by executing a block: updates to the app state and updates to
//! the validator set.

use std::{
    collections::{hash_map, hash_set, HashMap, HashSet},
    hash::Hash,
};

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    crypto_primitives::{SignatureError, VerifyingKey},
    data_types::Power,
};

/// Generic set of key-value updates produced by executing one block.
///
/// # Uniqueness of keys between `inserts` and `deletes`
///
/// A key is never scheduled for both insertion and deletion: calling [`insert`](Self::insert) cancels
/// a pending deletion of the same key and vice versa.
#[derive(Clone, Debug, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct UpdateSet<K: Eq + Hash, V: Eq + Hash> {
    inserts: HashMap<K, V>,
    deletes: HashSet<K>,
}

impl<K: Eq + Hash, V: Eq + Hash> Default for UpdateSet<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash, V: Eq + Hash> UpdateSet<K, V> {
    /// Create a new `UpdateSet` with empty `inserts` and `deletes`.
    pub fn new() -> Self {
        Self {
            inserts: HashMap::new(),
            deletes: HashSet::new(),
        }
    }

    /// Schedule the insertion of a `key`-`value` pair.
    ///
    /// This cancels the deletion of `key`, if it has been scheduled using [`delete`](Self::delete).
    pub fn insert(&mut self, key: K, value: V) {
        self.deletes.remove(&key);
        self.inserts.insert(key, value);
    }

    /// Schedule the deletion of `key`.
    ///
    /// This cancels the insertion of `key`, if it has been scheduled using [`insert`](Self::insert).
    pub fn delete(&mut self, key: K) {
        self.inserts.remove(&key);
        self.deletes.insert(key);
    }

    /// Get the value this `UpdateSet` will insert at `key`, if any.
    pub fn get_insert(&self, key: &K) -> Option<&V> {
        self.inserts.get(key)
    }

    /// Check whether this `UpdateSet` will delete `key`.
    pub fn contains_delete(&self, key: &K) -> bool {
        self.deletes.contains(key)
    }

    /// Get an iterator over all of the key-value pairs that this `UpdateSet` will insert.
    pub fn inserts(&self) -> hash_map::Iter<K, V> {
        self.inserts.iter()
    }

    /// Get an iterator over all of the keys that this `UpdateSet` will delete.
    pub fn deletes(&self) -> hash_set::Iter<K> {
        self.deletes.iter()
    }

    /// Check whether this `UpdateSet` neither inserts nor deletes anything.
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.deletes.is_empty()
    }
}

impl<K: Eq + Hash + Ord, V: Eq + Hash> UpdateSet<K, V> {
    /// Get the inserts of this `UpdateSet` in ascending key order.
    ///
    /// `HashMap` iteration order differs between processes, so anything that must be deterministic
    /// (e.g., app hashes) iterates through this instead of [`inserts`](Self::inserts).
    pub fn sorted_inserts(&self) -> Vec<(&K, &V)> {
        let mut inserts: Vec<(&K, &V)> = self.inserts.iter().collect();
        inserts.sort_by(|(a, _), (b, _)| a.cmp(b));
        inserts
    }

    /// Get the deletes of this `UpdateSet` in ascending key order.
    pub fn sorted_deletes(&self) -> Vec<&K> {
        let mut deletes: Vec<&K> = self.deletes.iter().collect();
        deletes.sort();
        deletes
    }
}

/// Set of key-value updates to the app state produced by executing a block.
pub type AppStateUpdates = UpdateSet<Vec<u8>, Vec<u8>>;

/// Set of updates to the validator set produced by executing a block.
///
/// Updates produced by the block at height `h` take effect from height `h + 1`.
pub type ValidatorSetUpdates = UpdateSet<VerifyingKey, Power>;

/// Intermediate representation of [`ValidatorSetUpdates`] for safe serialization and deserialization.
///
/// See [`ValidatorSetBytes`](super::validator_set::ValidatorSetBytes) for why this exists.
pub type ValidatorSetUpdatesBytes = UpdateSet<VerifyingKeyBytes, Power>;

/// Internal type used for serializing and deserializing values of type [`VerifyingKey`].
pub type VerifyingKeyBytes = [u8; 32];

impl TryFrom<ValidatorSetUpdatesBytes> for ValidatorSetUpdates {
    type Error = SignatureError;

    fn try_from(vsu_bytes: ValidatorSetUpdatesBytes) -> Result<Self, Self::Error> {
        Ok(ValidatorSetUpdates {
            inserts: vsu_bytes
                .inserts()
                .map(|(vk_bytes, &power)| VerifyingKey::from_bytes(vk_bytes).map(|vk| (vk, power)))
                .collect::<Result<HashMap<VerifyingKey, Power>, Self::Error>>()?,

            deletes: vsu_bytes
                .deletes()
                .map(VerifyingKey::from_bytes)
                .collect::<Result<HashSet<VerifyingKey>, Self::Error>>()?,
        })
    }
}

impl From<&ValidatorSetUpdates> for ValidatorSetUpdatesBytes {
    fn from(vsu: &ValidatorSetUpdates) -> Self {
        ValidatorSetUpdatesBytes {
            inserts: vsu.inserts().map(|(k, v)| (k.to_bytes(), *v)).collect(),
            deletes: vsu.deletes().map(|k| k.to_bytes()).collect(),
        }
    }
}
