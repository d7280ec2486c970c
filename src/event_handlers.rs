/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Dispatch of published [events](crate::events) to the logging handlers and to the handlers the user
//! registered in the [`Configuration`](crate::config::Configuration).
//!
//! A repair run is strictly sequential, so handlers are called synchronously, in the order: logging
//! handler first (if enabled), then the user's handler.

use crate::{config::Configuration, events::*, logging::Logger};

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

#[derive(Default)]
pub(crate) struct EventHandlers {
    pub(crate) start_repair_handlers: Vec<HandlerPtr<StartRepairEvent>>,
    pub(crate) skip_repair_handlers: Vec<HandlerPtr<SkipRepairEvent>>,
    pub(crate) reconstruct_checkpoint_handlers: Vec<HandlerPtr<ReconstructCheckpointEvent>>,
    pub(crate) replay_block_handlers: Vec<HandlerPtr<ReplayBlockEvent>>,
    pub(crate) end_repair_handlers: Vec<HandlerPtr<EndRepairEvent>>,
    pub(crate) clear_locks_handlers: Vec<HandlerPtr<ClearLocksEvent>>,
}

impl EventHandlers {
    /// Take the user's handlers out of `config`, adding the logging handlers if `config.log_events`.
    pub(crate) fn from_config(config: &mut Configuration) -> EventHandlers {
        let mut handlers = EventHandlers::default();

        if config.log_events {
            handlers.add_logging_handlers();
        }

        if let Some(handler) = config.on_start_repair.take() {
            handlers.start_repair_handlers.push(handler)
        }
        if let Some(handler) = config.on_skip_repair.take() {
            handlers.skip_repair_handlers.push(handler)
        }
        if let Some(handler) = config.on_reconstruct_checkpoint.take() {
            handlers.reconstruct_checkpoint_handlers.push(handler)
        }
        if let Some(handler) = config.on_replay_block.take() {
            handlers.replay_block_handlers.push(handler)
        }
        if let Some(handler) = config.on_end_repair.take() {
            handlers.end_repair_handlers.push(handler)
        }
        if let Some(handler) = config.on_clear_locks.take() {
            handlers.clear_locks_handlers.push(handler)
        }

        handlers
    }

    fn add_logging_handlers(&mut self) {
        self.start_repair_handlers
            .push(StartRepairEvent::get_logger());
        self.skip_repair_handlers.push(SkipRepairEvent::get_logger());
        self.reconstruct_checkpoint_handlers
            .push(ReconstructCheckpointEvent::get_logger());
        self.replay_block_handlers.push(ReplayBlockEvent::get_logger());
        self.end_repair_handlers.push(EndRepairEvent::get_logger());
        self.clear_locks_handlers.push(ClearLocksEvent::get_logger());
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::StartRepair(start_repair_event) => self
                .start_repair_handlers
                .iter()
                .for_each(|handler| handler(&start_repair_event)),

            Event::SkipRepair(skip_repair_event) => self
                .skip_repair_handlers
                .iter()
                .for_each(|handler| handler(&skip_repair_event)),

            Event::ReconstructCheckpoint(reconstruct_checkpoint_event) => self
                .reconstruct_checkpoint_handlers
                .iter()
                .for_each(|handler| handler(&reconstruct_checkpoint_event)),

            Event::ReplayBlock(replay_block_event) => self
                .replay_block_handlers
                .iter()
                .for_each(|handler| handler(&replay_block_event)),

            Event::EndRepair(end_repair_event) => self
                .end_repair_handlers
                .iter()
                .for_each(|handler| handler(&end_repair_event)),

            Event::ClearLocks(clear_locks_event) => self
                .clear_locks_handlers
                .iter()
                .for_each(|handler| handler(&clear_locks_event)),
        }
    }
}
