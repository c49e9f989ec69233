// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Object-store clients.
//!
//! The engine keeps two connections to the local object store:
//!
//! - the **store** socket delivers `ObjectSealed` / `ObjectEvicted`
//!   notifications, which a reader task forwards into the engine loop
//! - the **manager** socket accepts `FetchObject` requests asking the store
//!   to pull a remote copy; a successful pull surfaces later as a sealed
//!   notification on the store socket
//!
//! Fetches carry no timeout here: the store retries internally.

use std::path::Path;

use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use tarn_protocol::frame::{read_frame, Frame, FrameError, FramedStream, MessageType};
use tarn_protocol::messages::{FetchObject, ObjectEvicted, ObjectSealed};
use tarn_protocol::task::ObjectId;

use crate::engine::Event;
use crate::error::{EngineError, Result};

/// Connect to the object store's notification socket and spawn the reader
/// task that feeds sealed/evicted events into the engine.
pub async fn connect_store<P: AsRef<Path>>(path: P, events: mpsc::Sender<Event>) -> Result<()> {
    let path = path.as_ref();
    let stream = UnixStream::connect(path).await?;
    info!(path = %path.display(), "Connected to object store");

    tokio::spawn(async move {
        let mut reader = stream;
        loop {
            let frame = match read_frame(&mut reader).await {
                Ok(frame) => frame,
                Err(FrameError::ConnectionClosed) => {
                    warn!("Object store closed its notification socket");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Object store notification stream failed");
                    break;
                }
            };
            let event = match notification_event(&frame) {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "Ignoring malformed object store notification");
                    continue;
                }
            };
            if events.send(event).await.is_err() {
                break;
            }
        }
    });

    Ok(())
}

fn notification_event(frame: &Frame) -> Result<Event> {
    match frame.message_type {
        MessageType::ObjectSealed => {
            let msg: ObjectSealed = frame.decode()?;
            Ok(Event::ObjectSealed(ObjectId::from_slice(&msg.object_id)?))
        }
        MessageType::ObjectEvicted => {
            let msg: ObjectEvicted = frame.decode()?;
            Ok(Event::ObjectEvicted(ObjectId::from_slice(&msg.object_id)?))
        }
        other => Err(EngineError::UnexpectedStoreMessage(other)),
    }
}

/// Connection to the object store manager, used to request remote fetches.
pub struct ObjectManagerClient {
    stream: FramedStream<UnixStream>,
}

impl ObjectManagerClient {
    pub async fn connect<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).await?;
        info!(path = %path.display(), "Connected to object store manager");
        Ok(Self {
            stream: FramedStream::new(stream),
        })
    }

    /// Ask the store to pull a remote copy of the object. Fire-and-forget;
    /// delivery surfaces as a later sealed notification.
    pub async fn fetch(&mut self, object_id: ObjectId) -> Result<()> {
        debug!(object = %object_id, "Requesting remote fetch");
        let msg = FetchObject {
            object_id: object_id.as_bytes().to_vec(),
        };
        self.stream
            .write_frame(&Frame::new(MessageType::FetchObject, &msg)?)
            .await?;
        Ok(())
    }
}
