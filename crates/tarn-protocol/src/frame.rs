// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wire format for stream framing.
//!
//! Each connection carries a sequence of messages with the following frame
//! format:
//! - 1 byte: message type
//! - 8 bytes: payload length (big-endian)
//! - N bytes: protobuf payload

use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::Message;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum frame size (16 MB). Task specs are small; anything larger is a
/// corrupted stream.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Frame header size (1 byte type + 8 bytes length)
pub const HEADER_SIZE: usize = 9;

/// Message types for the wire protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Worker announces its PID and optional actor id
    RegisterWorker = 1,
    /// Worker submits a task for scheduling
    SubmitTask = 2,
    /// Worker asks for a task assignment (blocks until one arrives).
    /// Also completes the worker's previous task, if it had one.
    GetTask = 3,
    /// Worker reports completion of its current task
    TaskDone = 4,
    /// Worker requests reconstruction of a lost object
    ReconstructObject = 5,
    /// Worker signals that it is no longer blocked on a missing object
    NotifyUnblocked = 6,
    /// Worker announces a clean disconnect
    Disconnect = 7,
    /// Scheduler assigns a task to a worker
    ExecuteTask = 8,
    /// Scheduler asks a worker to exit (graceful kill)
    Terminate = 9,
    /// Object store reports a new local object
    ObjectSealed = 10,
    /// Object store reports a local eviction
    ObjectEvicted = 11,
    /// Scheduler asks the store manager to pull a remote copy
    FetchObject = 12,
}

impl TryFrom<u8> for MessageType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, FrameError> {
        match value {
            1 => Ok(MessageType::RegisterWorker),
            2 => Ok(MessageType::SubmitTask),
            3 => Ok(MessageType::GetTask),
            4 => Ok(MessageType::TaskDone),
            5 => Ok(MessageType::ReconstructObject),
            6 => Ok(MessageType::NotifyUnblocked),
            7 => Ok(MessageType::Disconnect),
            8 => Ok(MessageType::ExecuteTask),
            9 => Ok(MessageType::Terminate),
            10 => Ok(MessageType::ObjectSealed),
            11 => Ok(MessageType::ObjectEvicted),
            12 => Ok(MessageType::FetchObject),
            _ => Err(FrameError::InvalidMessageType(value)),
        }
    }
}

/// Errors that can occur during frame encoding/decoding
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame too large: {0} bytes (max: {MAX_FRAME_SIZE})")]
    FrameTooLarge(usize),

    #[error("invalid message type: {0}")]
    InvalidMessageType(u8),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("connection closed")]
    ConnectionClosed,
}

/// A framed message with type and payload
#[derive(Debug, Clone)]
pub struct Frame {
    pub message_type: MessageType,
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame with the given type and message
    pub fn new<M: Message>(message_type: MessageType, msg: &M) -> Result<Self, FrameError> {
        let payload = msg.encode_to_vec();
        if payload.len() > MAX_FRAME_SIZE {
            return Err(FrameError::FrameTooLarge(payload.len()));
        }
        Ok(Self {
            message_type,
            payload: Bytes::from(payload),
        })
    }

    /// Create a payload-less frame (GetTask, TaskDone, Terminate, ...)
    pub fn empty(message_type: MessageType) -> Self {
        Self {
            message_type,
            payload: Bytes::new(),
        }
    }

    /// Decode the payload as a protobuf message
    pub fn decode<M: Message + Default>(&self) -> Result<M, FrameError> {
        Ok(M::decode(self.payload.clone())?)
    }

    /// Encode the frame to bytes for wire transmission
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        buf.put_u8(self.message_type as u8);
        buf.put_u64(self.payload.len() as u64);
        buf.put(self.payload.clone());
        buf.freeze()
    }

    /// Decode a frame from bytes
    pub fn decode_from_bytes(mut bytes: Bytes) -> Result<Self, FrameError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FrameError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "incomplete frame header",
            )));
        }

        let message_type = MessageType::try_from(bytes.get_u8())?;
        let length = bytes.get_u64() as usize;

        if length > MAX_FRAME_SIZE {
            return Err(FrameError::FrameTooLarge(length));
        }

        if bytes.len() < length {
            return Err(FrameError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "incomplete frame payload",
            )));
        }

        let payload = bytes.split_to(length);
        Ok(Self {
            message_type,
            payload,
        })
    }
}

/// Write a frame to an async writer
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &Frame,
) -> Result<(), FrameError> {
    let encoded = frame.encode();
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a frame from an async reader
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Frame, FrameError> {
    // Read header
    let mut header = [0u8; HEADER_SIZE];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(FrameError::ConnectionClosed);
        }
        Err(e) => return Err(e.into()),
    }

    let message_type = MessageType::try_from(header[0])?;
    let length = u64::from_be_bytes([
        header[1], header[2], header[3], header[4], header[5], header[6], header[7], header[8],
    ]) as usize;

    if length > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge(length));
    }

    // Read payload
    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;

    Ok(Frame {
        message_type,
        payload: Bytes::from(payload),
    })
}

/// Framed codec for encoding/decoding frames on a stream
#[derive(Debug)]
pub struct FramedStream<S> {
    stream: S,
}

impl<S> FramedStream<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: AsyncRead + Unpin> FramedStream<S> {
    /// Read the next frame from the stream
    pub async fn read_frame(&mut self) -> Result<Frame, FrameError> {
        read_frame(&mut self.stream).await
    }
}

impl<S: AsyncWrite + Unpin> FramedStream<S> {
    /// Write a frame to the stream
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), FrameError> {
        write_frame(&mut self.stream, frame).await
    }
}
