/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! State repair for nodes of a deterministic, block-replicated state machine.
//!
//! A node persists three stores: the block ledger, the consensus store, and the application's
//! versioned app store. After an unclean shutdown these can disagree about how far the chain has
//! progressed. This crate offers:
//! 1. A [repair protocol](repair) that reconstructs a consistent checkpoint and replays the missing
//!    ledger blocks until the app store is back in sync with the ledger,
//! 2. A small API [`app::App`] for plugging in the application's state transition function,
//! 3. Pluggable [persistence](stores::pluggables), with lock markers guarding each store directory,
//! 4. Scoped [consistency check overrides](consistency) that only the repair protocol needs.
//!
//! # Running a repair
//!
//! Call [`repair::repair_state`] (or [`repair::repair_state_on_start`]) before anything else in the
//! process opens the stores, with a [`config::Configuration`] pointing at the node's data directory.

pub mod app;

pub mod config;

pub mod consistency;

pub(crate) mod event_handlers;

pub mod events;

pub mod executor;

pub mod logging;

pub mod repair;

pub mod stores;

pub mod types;
