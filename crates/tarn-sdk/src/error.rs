// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the worker SDK.

use tarn_protocol::frame::FrameError;
use tarn_protocol::task::IdError;
use tarn_protocol::MessageType;
use thiserror::Error;

/// Result type using SdkError
pub type Result<T> = std::result::Result<T, SdkError>;

/// Errors from scheduler communication.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SdkError {
    /// Frame-level transport error.
    #[error("transport error: {0}")]
    Frame(#[from] FrameError),

    /// Failed to connect to the scheduler socket.
    #[error("failed to connect to scheduler at {path}: {source}")]
    Connect {
        path: String,
        source: std::io::Error,
    },

    /// The scheduler sent a message the client did not expect here.
    #[error("unexpected message from scheduler: {0:?}")]
    UnexpectedMessage(MessageType),

    /// An assignment frame arrived without a task spec.
    #[error("assignment carried no task spec")]
    MissingSpec,

    /// A received id had the wrong width.
    #[error("malformed id: {0}")]
    InvalidId(#[from] IdError),

    /// The scheduler asked this worker to exit.
    #[error("scheduler requested termination")]
    Terminated,
}
