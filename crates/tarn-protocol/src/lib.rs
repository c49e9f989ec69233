// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tarn Protocol - wire protocol and task primitives
//!
//! This crate provides the communication layer between:
//! - Workers and the per-node scheduler (worker protocol)
//! - The scheduler and the local object store (store protocol)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      tarn-protocol                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Messages: worker registration, task submission/assignment, │
//! │            reconstruction, store notifications              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Serialization: Protobuf (prost)                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Transport: length-prefixed frames on Unix stream sockets   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Worker Protocol
//!
//! Used by workers to communicate with the scheduler:
//! - Registration (PID, optional actor id)
//! - Task submission and blocking task retrieval
//! - Completion reporting and object reconstruction requests
//!
//! # Store Protocol
//!
//! Used between the scheduler and the local object store:
//! - `ObjectSealed` / `ObjectEvicted` notifications in
//! - `FetchObject` requests out
//!
//! # Task Primitives
//!
//! [`task`] defines the immutable [`task::TaskSpec`] descriptor and the
//! deterministic id scheme: a task's id is a content hash of the spec, and
//! the id of its k-th return value is derived from the task id and k, so
//! remote consumers can name return values before the task runs.

pub mod frame;
pub mod messages;
pub mod task;

pub use frame::{Frame, FrameError, FramedStream, MessageType};
pub use task::{ActorId, ObjectId, ResourceVector, SpecBuilder, TaskId, TaskSpec};
