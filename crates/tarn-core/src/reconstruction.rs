// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-object reconstruction state.
//!
//! The tracker deduplicates concurrent `reconstruct` requests for the same
//! object: once a fetch or a re-execution is in flight, further requests are
//! no-ops until the object arrives (fetch) or the producing task completes
//! (re-execution). Entries are created lazily; an absent entry means idle.
//!
//! The protocol itself (object-table lookup, the DONE -> WAITING
//! compare-and-swap, lineage recursion) lives in the engine, which is the
//! only caller of this tracker.

use std::collections::HashMap;

use tarn_protocol::task::ObjectId;

/// Why an object is currently being recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// The object exists elsewhere; a fetch was issued.
    FetchRequested,
    /// The object is lost; its producing task was re-queued.
    ReconstructionRequested,
}

/// Map of objects with recovery in flight.
#[derive(Debug, Default)]
pub struct ReconstructionTracker {
    states: HashMap<ObjectId, Recovery>,
}

impl ReconstructionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a recovery is already in flight for this object.
    pub fn is_active(&self, object_id: ObjectId) -> bool {
        self.states.contains_key(&object_id)
    }

    pub fn state(&self, object_id: ObjectId) -> Option<Recovery> {
        self.states.get(&object_id).copied()
    }

    pub fn set_fetch_requested(&mut self, object_id: ObjectId) {
        self.states.insert(object_id, Recovery::FetchRequested);
    }

    pub fn set_reconstruction_requested(&mut self, object_id: ObjectId) {
        self.states
            .insert(object_id, Recovery::ReconstructionRequested);
    }

    /// The object became locally resident: a pending fetch is settled. A
    /// pending re-execution stays active until its task completes.
    pub fn on_object_local(&mut self, object_id: ObjectId) {
        if self.states.get(&object_id) == Some(&Recovery::FetchRequested) {
            self.states.remove(&object_id);
        }
    }

    /// A task completed: its return objects are no longer awaiting
    /// re-execution.
    pub fn on_task_completed<I: IntoIterator<Item = ObjectId>>(&mut self, returns: I) {
        for object_id in returns {
            if self.states.get(&object_id) == Some(&Recovery::ReconstructionRequested) {
                self.states.remove(&object_id);
            }
        }
    }

    pub fn num_active(&self) -> usize {
        self.states.len()
    }
}
