// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tarn Core - per-node scheduling engine
//!
//! This crate is the local scheduler of the tarn distributed task runtime.
//! Each cluster node runs one engine, which owns that node's worker
//! processes, matches submitted tasks to workers as their inputs and
//! resources become ready, and participates in cluster-wide reconstruction
//! of objects lost to eviction or failure.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Workers (tarn-sdk)                          │
//! │     register / submit / get_task / task_done / reconstruct       │
//! └──────────────────────────────────────────────────────────────────┘
//!                 │ Unix socket, framed protocol
//!                 ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                    tarn-core (this crate)                        │
//! │   waiting/dispatch queues · resource ledger · worker pool        │
//! │              reconstruction coordinator                          │
//! └──────────────────────────────────────────────────────────────────┘
//!        │                                     │
//!        │ sealed/evicted, fetch               │ task & object tables,
//!        ▼                                     ▼ CAS, pub/sub
//! ┌───────────────────┐              ┌───────────────────────┐
//! │ Local object store│              │  Metadata store       │
//! │  (shared memory)  │              │  (replicated Redis)   │
//! └───────────────────┘              └───────────────────────┘
//! ```
//!
//! # Scheduling model
//!
//! A submitted task waits until every argument object is resident on this
//! node, then queues for dispatch, then is assigned to an idle worker once
//! its CPU/GPU demand fits the ledger. Assignment is strictly FIFO from the
//! head of the dispatch queue so wide tasks cannot starve.
//!
//! All mutable state lives in one actor task ([`engine::Engine`]); socket
//! I/O is offloaded to per-connection tasks that exchange events with it.
//!
//! # Reconstruction
//!
//! When a worker cannot obtain an input object, it asks the engine to
//! reconstruct it. If the object table lists a location, the engine fetches
//! a copy. If not, the engine walks the object's lineage: the producing
//! task's `DONE -> WAITING` transition is a compare-and-swap in the shared
//! task table, so across the whole cluster exactly one node re-executes a
//! given task no matter how many ask.
//!
//! # Modules
//!
//! - [`config`]: engine configuration from environment variables
//! - [`engine`]: the event-loop actor owning all scheduler state
//! - [`error`]: engine error types
//! - [`gcs`]: metadata-store client (task table, object table, pub/sub)
//! - [`plasma`]: object-store clients (notifications in, fetches out)
//! - [`reconstruction`]: per-object recovery state
//! - [`sched`]: waiting/dispatch queues and the resource ledger
//! - [`server`]: worker socket accept loop and per-connection I/O
//! - [`worker`]: worker pool, spawning, and registration bookkeeping

pub mod config;
pub mod engine;
pub mod error;
pub mod gcs;
pub mod plasma;
pub mod reconstruction;
pub mod sched;
pub mod server;
pub mod worker;

pub use config::Config;
pub use engine::{Engine, EngineHandle, EngineSnapshot, Event};
pub use error::EngineError;
