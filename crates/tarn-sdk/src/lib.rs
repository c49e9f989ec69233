// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tarn SDK - worker-side client for the per-node scheduler.
//!
//! A worker process uses [`SchedulerConnection`] to talk to the scheduler
//! over its Unix socket:
//!
//! ```ignore
//! use tarn_sdk::SchedulerConnection;
//!
//! let mut conn = SchedulerConnection::connect("/tmp/tarn_scheduler").await?;
//! conn.register(std::process::id(), None).await?;
//!
//! loop {
//!     // Blocks until the scheduler assigns a task. Also reports the
//!     // previous task (if any) as done.
//!     let spec = match conn.get_task().await {
//!         Ok(spec) => spec,
//!         Err(tarn_sdk::SdkError::Terminated) => break,
//!         Err(e) => return Err(e.into()),
//!     };
//!     execute(spec);
//! }
//! ```
//!
//! Drivers use the same connection type to submit work with
//! [`SchedulerConnection::submit_task`] and to request reconstruction of
//! lost objects with [`SchedulerConnection::reconstruct_object`].

pub mod connection;
pub mod error;

pub use connection::SchedulerConnection;
pub use error::SdkError;
