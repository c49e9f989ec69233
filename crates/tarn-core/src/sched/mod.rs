// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scheduling state: task queues and the resource ledger.
//!
//! This module is deliberately free of I/O. The engine owns a
//! [`policy::SchedulingPolicy`] and a [`resources::ResourceLedger`] and
//! drives all socket and metadata-store traffic itself, so every queue
//! transition here is synchronous and exhaustively unit-testable.

pub mod policy;
pub mod resources;

pub use policy::{PendingTask, Placement, SchedulingPolicy};
pub use resources::ResourceLedger;
