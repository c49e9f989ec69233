// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker socket server.
//!
//! Accepts connections on the scheduler's Unix socket and runs one reader
//! and one writer task per connection. The tasks only move frames; all
//! protocol handling happens in the engine actor.

use std::path::Path;

use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use tarn_protocol::frame::{read_frame, write_frame, Frame, FrameError};

use crate::engine::Event;
use crate::error::Result;
use crate::worker::WorkerId;

/// Bind the scheduler socket, replacing a stale socket file if one exists.
pub fn bind_scheduler_socket<P: AsRef<Path>>(path: P) -> Result<UnixListener> {
    let path = path.as_ref();
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let listener = UnixListener::bind(path)?;
    info!(path = %path.display(), "Listening for workers");
    Ok(listener)
}

/// Accept worker connections forever, handing each stream to the engine.
pub async fn run_listener(listener: UnixListener, events: mpsc::Sender<Event>) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                if events.send(Event::WorkerConnected(stream)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                error!(error = %e, "Accept failed on scheduler socket");
                break;
            }
        }
    }
    debug!("Worker listener stopped");
}

/// Spawn the reader and writer tasks for one worker connection.
///
/// The reader forwards every frame into the engine loop and reports EOF or
/// any stream error as a close (a malformed frame is indistinguishable from
/// a dead peer at this layer). The writer drains frames queued by the
/// engine; dropping the engine's sender closes the socket.
pub fn spawn_connection_io(
    id: WorkerId,
    mut read_half: OwnedReadHalf,
    mut write_half: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    events: mpsc::Sender<Event>,
) {
    tokio::spawn(async move {
        loop {
            match read_frame(&mut read_half).await {
                Ok(frame) => {
                    if events
                        .send(Event::WorkerFrame { worker: id, frame })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(FrameError::ConnectionClosed) => {
                    let _ = events.send(Event::WorkerClosed { worker: id }).await;
                    break;
                }
                Err(e) => {
                    warn!(worker = id, error = %e, "Worker stream error");
                    let _ = events.send(Event::WorkerClosed { worker: id }).await;
                    break;
                }
            }
        }
    });

    tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if let Err(e) = write_frame(&mut write_half, &frame).await {
                warn!(worker = id, error = %e, "Worker write failed");
                break;
            }
        }
        // Sender dropped or write failed: the socket closes with the half.
    });
}
