/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Cryptographic primitives.
//!
//! The re-exports in this module provide two categories of cryptographic primitives:
//! 1. **Cryptographic Hashes**: provided by the [`sha2`] crate. Used for block hashes, data hashes and
//!    app hashes.
//! 2. **Validator identities**: provided by the [`ed25519_dalek`] crate. Validators in a
//!    [`ValidatorSet`](super::validator_set::ValidatorSet) are identified by their `VerifyingKey`.

// re-exports below.
pub use sha2::Digest;
pub use sha2::Sha256 as CryptoHasher;

pub use ed25519_dalek::{SignatureError, SigningKey, VerifyingKey};

use super::data_types::CryptoHash;

/// Finish `hasher` into a [`CryptoHash`].
pub(crate) fn finalize(hasher: CryptoHasher) -> CryptoHash {
    CryptoHash::new(hasher.finalize().into())
}
