/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Configuration of a state repair run.

use std::path::PathBuf;

use typed_builder::TypedBuilder;

use crate::{event_handlers::HandlerPtr, events::*, types::data_types::BlockHeight};

/// Parameters of a [`repair_state`](crate::repair::repair_state) run, and the event handlers to call
/// during it.
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].

    Required:
    - `.data_dir(...)`

    Optional:
    - `.start_block_height(...)`
    - `.start_height(...)`
    - `.parallel_txs(...)`
    - `.pipeline_depth(...)`
    - `.log_events(...)`
    - `.on_start_repair(...)`
    - `.on_skip_repair(...)`
    - `.on_reconstruct_checkpoint(...)`
    - `.on_replay_block(...)`
    - `.on_end_repair(...)`
    - `.on_clear_locks(...)`
"))]
pub struct Configuration {
    #[builder(setter(
        into,
        doc = "Set the directory holding the `application`, `blockstore` and `state` stores. Required."
    ))]
    pub data_dir: PathBuf,

    #[builder(
        default = BlockHeight::new(0),
        setter(doc = "Set the height below which the ledger is considered too short to need repair. Defaults to 0.")
    )]
    pub start_block_height: BlockHeight,

    #[builder(
        default = 0,
        setter(doc = "Set the app version to restart replay from, overriding the one derived from the app store. 0 (the default) means unset.")
    )]
    pub start_height: u64,

    #[builder(
        default = false,
        setter(doc = "Set whether the app may execute the transactions of a replayed block in parallel. Defaults to false.")
    )]
    pub parallel_txs: bool,

    #[builder(
        default = 2,
        setter(doc = "Set how many versions the app's async commit pipeline may run ahead of its durable commit version. Defaults to 2.")
    )]
    pub pipeline_depth: u64,

    #[builder(
        default = true,
        setter(doc = "Set whether to log every event published during the run. Defaults to true.")
    )]
    pub log_events: bool,

    #[builder(default, setter(transform = |handler: impl Fn(&StartRepairEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartRepairEvent>),
    doc = "Register a handler closure to be invoked after the stores are inspected and the start version resolved. Optional."))]
    pub(crate) on_start_repair: Option<HandlerPtr<StartRepairEvent>>,

    #[builder(default, setter(transform = |handler: impl Fn(&SkipRepairEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<SkipRepairEvent>),
    doc = "Register a handler closure to be invoked after the run decides that no replay is needed. Optional."))]
    pub(crate) on_skip_repair: Option<HandlerPtr<SkipRepairEvent>>,

    #[builder(default, setter(transform = |handler: impl Fn(&ReconstructCheckpointEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReconstructCheckpointEvent>),
    doc = "Register a handler closure to be invoked after the checkpoint snapshot is reconstructed. Optional."))]
    pub(crate) on_reconstruct_checkpoint: Option<HandlerPtr<ReconstructCheckpointEvent>>,

    #[builder(default, setter(transform = |handler: impl Fn(&ReplayBlockEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReplayBlockEvent>),
    doc = "Register a handler closure to be invoked after each block is replayed. Optional."))]
    pub(crate) on_replay_block: Option<HandlerPtr<ReplayBlockEvent>>,

    #[builder(default, setter(transform = |handler: impl Fn(&EndRepairEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<EndRepairEvent>),
    doc = "Register a handler closure to be invoked after every missing block has been replayed. Optional."))]
    pub(crate) on_end_repair: Option<HandlerPtr<EndRepairEvent>>,

    #[builder(default, setter(transform = |handler: impl Fn(&ClearLocksEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ClearLocksEvent>),
    doc = "Register a handler closure to be invoked after the data directory's lock markers are cleared. Optional."))]
    pub(crate) on_clear_locks: Option<HandlerPtr<ClearLocksEvent>>,
}
