/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Consistency checks that normal operation enforces and state repair needs to relax.
//!
//! In normal operation a node refuses to:
//! 1. Load an app version below the latest one (that would silently discard committed state), and
//! 2. Work from a consensus snapshot, or apply a block, that is not contiguous with the ledger.
//!
//! Repair deliberately does both: it truncates the app store back to an earlier version, then
//! replays blocks on top of a checkpoint whose height lags the ledger. Rather than flipping global
//! flags, the checks are plain data ([`ConsistencyChecks`]) passed into every store and executor
//! operation that enforces them, and a [`RepairContext`] hands out a scoped [`SafetyOverride`] that
//! relaxes them until it is dropped.

/// Which consistency checks are enforced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConsistencyChecks {
    /// Refuse to [load](crate::stores::app_store::VersionedAppStore::load_version) an app version
    /// below the latest one.
    pub version_check: bool,

    /// Refuse a consensus snapshot whose height is neither the ledger height nor the one below it, and
    /// refuse to [apply](crate::executor::BlockExecutor::apply_block) a block that does not directly
    /// extend the snapshot.
    pub height_continuity_check: bool,
}

impl ConsistencyChecks {
    pub const STRICT: ConsistencyChecks = ConsistencyChecks {
        version_check: true,
        height_continuity_check: true,
    };

    pub const RELAXED: ConsistencyChecks = ConsistencyChecks {
        version_check: false,
        height_continuity_check: false,
    };
}

impl Default for ConsistencyChecks {
    fn default() -> Self {
        ConsistencyChecks::STRICT
    }
}

/// The checks in force for one process. Strict unless overridden.
#[derive(Debug, Default)]
pub struct RepairContext {
    checks: ConsistencyChecks,
}

impl RepairContext {
    pub fn new() -> RepairContext {
        RepairContext::default()
    }

    pub fn with_checks(checks: ConsistencyChecks) -> RepairContext {
        RepairContext { checks }
    }

    /// The checks currently in force.
    pub fn checks(&self) -> ConsistencyChecks {
        self.checks
    }

    /// Relax every check until the returned guard is dropped (or [restored](SafetyOverride::restore)),
    /// after which the checks in force before this call apply again.
    pub fn override_checks(&mut self) -> SafetyOverride<'_> {
        let previous = self.checks;
        self.checks = ConsistencyChecks::RELAXED;
        log::debug!("Consistency checks relaxed");
        SafetyOverride {
            context: self,
            previous,
        }
    }
}

/// Scoped relaxation of a [`RepairContext`]'s checks.
#[must_use = "the override is lifted as soon as the guard is dropped"]
pub struct SafetyOverride<'a> {
    context: &'a mut RepairContext,
    previous: ConsistencyChecks,
}

impl<'a> SafetyOverride<'a> {
    /// The checks in force while this guard is alive.
    pub fn checks(&self) -> ConsistencyChecks {
        self.context.checks
    }

    /// Lift the override now.
    pub fn restore(self) {}
}

impl<'a> Drop for SafetyOverride<'a> {
    fn drop(&mut self) {
        self.context.checks = self.previous;
        log::debug!("Consistency checks restored to {:?}", self.previous);
    }
}
