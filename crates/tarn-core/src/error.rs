// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the scheduling engine.

use thiserror::Error;

use tarn_protocol::frame::{FrameError, MessageType};
use tarn_protocol::task::IdError;

use crate::gcs::GcsError;
use crate::worker::WorkerId;

/// Result type using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors from engine operations.
///
/// None of these are fatal to the engine: per-event handlers log and recover.
/// Fatal initialization errors surface as `anyhow::Error` in the binary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// Metadata store operation failed.
    #[error("metadata store error: {0}")]
    Gcs(#[from] GcsError),

    /// Frame-level transport error.
    #[error("transport error: {0}")]
    Frame(#[from] FrameError),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A task spec carried a malformed id.
    #[error("malformed task spec: {0}")]
    Spec(#[from] IdError),

    /// A worker sent a message the engine does not accept in its state.
    #[error("protocol violation from worker {worker}: unexpected {message_type:?}")]
    ProtocolViolation {
        worker: WorkerId,
        message_type: MessageType,
    },

    /// The object store sent a message the engine does not accept.
    #[error("unexpected message from object store: {0:?}")]
    UnexpectedStoreMessage(MessageType),

    /// A message referenced a worker the engine does not know.
    #[error("unknown worker: {0}")]
    UnknownWorker(WorkerId),

    /// Spawning a worker subprocess failed.
    #[error("worker spawn failed: {0}")]
    Spawn(String),
}
