/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that store information about validator sets.

use borsh::{BorshDeserialize, BorshSerialize};
use std::{collections::HashMap, slice};

use super::{
    crypto_primitives::{SignatureError, VerifyingKey},
    data_types::{Power, TotalPower},
    update_sets::{ValidatorSetUpdates, VerifyingKeyBytes},
};

/// Stores the identities of validators and their voting powers.
///
/// ## Ordering of validators
///
/// `ValidatorSet` internally maintains the list of validators in ascending order of their
/// `VerifyingKey`s, so two validator sets with the same members and powers always compare (and
/// serialize) equal regardless of the order the members were put in.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ValidatorSet {
    // The verifying keys of validators are included here in ascending order.
    validators: Vec<VerifyingKey>,
    powers: HashMap<VerifyingKey, Power>,
}

impl ValidatorSet {
    /// Create an empty validator set.
    pub fn new() -> ValidatorSet {
        Self {
            validators: Vec::new(),
            powers: HashMap::new(),
        }
    }

    /// Put a `validator` with the specified `power` into the validator set.
    ///
    /// If `validator` already exists in the validator set, this function updates its power instead.
    pub fn put(&mut self, validator: &VerifyingKey, power: Power) {
        if let Err(insert_pos) = self.search(validator) {
            self.validators.insert(insert_pos, *validator);
        }

        self.powers.insert(*validator, power);
    }

    /// Remove `validator` from the validator set, returning its power before the removal if it was in
    /// the set.
    pub fn remove(&mut self, validator: &VerifyingKey) -> Option<(VerifyingKey, Power)> {
        let pos = self.search(validator).ok()?;
        self.validators.remove(pos);
        self.powers.remove_entry(validator)
    }

    /// Apply validator set `updates`: `put` every insert, then `remove` every delete.
    pub fn apply_updates(&mut self, updates: &ValidatorSetUpdates) {
        for (peer, new_power) in updates.inserts() {
            self.put(peer, *new_power);
        }

        for peer in updates.deletes() {
            self.remove(peer);
        }
    }

    /// Get the power of the specified `validator` inside the validator set.
    pub fn power(&self, validator: &VerifyingKey) -> Option<&Power> {
        self.powers.get(validator)
    }

    /// Get the sum of the powers of all of the validators inside the validator set.
    pub fn total_power(&self) -> TotalPower {
        let mut total_power = TotalPower::new(0);
        for power in self.powers.values() {
            total_power += *power
        }
        total_power
    }

    /// Check whether the validator set contains `validator`.
    pub fn contains(&self, validator: &VerifyingKey) -> bool {
        self.powers.contains_key(validator)
    }

    /// Get an iterator through validators' verifying keys in ascending order.
    pub fn validators(&self) -> slice::Iter<VerifyingKey> {
        self.validators.iter()
    }

    /// Get the number of validators currently in the validator set.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Check whether the validator set is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn search(&self, validator: &VerifyingKey) -> Result<usize, usize> {
        let validator_bytes = validator.to_bytes();
        self.validators
            .binary_search_by(|v| v.to_bytes().cmp(&validator_bytes))
    }
}

/// Intermediate representation of [`ValidatorSet`] for safe serialization and deserialization.
///
/// `ValidatorSet` contains [`ed25519_dalek::VerifyingKey`]s, which do not implement the Borsh traits.
/// This type replaces them with their raw bytes, which means that converting back into a
/// `ValidatorSet` is fallible: the bytes may not be a valid Ed25519 point.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub(crate) struct ValidatorSetBytes {
    // Ascending order, like `ValidatorSet::validators`.
    validators: Vec<(VerifyingKeyBytes, Power)>,
}

impl TryFrom<ValidatorSetBytes> for ValidatorSet {
    type Error = SignatureError;

    fn try_from(value: ValidatorSetBytes) -> Result<Self, Self::Error> {
        let mut validator_set = ValidatorSet::new();
        for (vk_bytes, power) in value.validators {
            validator_set.put(&VerifyingKey::from_bytes(&vk_bytes)?, power);
        }
        Ok(validator_set)
    }
}

impl From<&ValidatorSet> for ValidatorSetBytes {
    fn from(validator_set: &ValidatorSet) -> Self {
        ValidatorSetBytes {
            validators: validator_set
                .validators()
                .map(|vk| (vk.to_bytes(), validator_set.powers[vk]))
                .collect(),
        }
    }
}
