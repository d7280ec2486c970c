/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types shared by the stores, the execution boundary and the repair protocol.

pub mod block;

pub mod consensus_params;

pub mod crypto_primitives;

pub mod data_types;

pub mod snapshot;

pub mod update_sets;

pub mod validator_set;
