// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Connection to the per-node scheduler.

use std::path::Path;

use tokio::net::UnixStream;
use tracing::{debug, instrument};

use tarn_protocol::frame::{Frame, FramedStream, MessageType};
use tarn_protocol::messages::{ExecuteTask, RegisterWorker, ReconstructObject, SubmitTask};
use tarn_protocol::task::{ActorId, ObjectId, TaskSpec};

use crate::error::{Result, SdkError};

/// A worker's (or driver's) connection to the scheduler socket.
///
/// All methods take `&mut self`: the protocol is strictly sequential on a
/// single connection, mirroring the scheduler's per-source FIFO guarantee.
#[derive(Debug)]
pub struct SchedulerConnection {
    stream: FramedStream<UnixStream>,
}

impl SchedulerConnection {
    /// Connect to the scheduler's Unix socket.
    pub async fn connect<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path)
            .await
            .map_err(|source| SdkError::Connect {
                path: path.display().to_string(),
                source,
            })?;
        debug!(path = %path.display(), "Connected to scheduler");
        Ok(Self {
            stream: FramedStream::new(stream),
        })
    }

    /// Register this process with the scheduler.
    ///
    /// Workers must register before asking for tasks; the PID lets the
    /// scheduler match the connection against its spawned children. Actor
    /// workers pass the actor they host.
    #[instrument(skip(self))]
    pub async fn register(&mut self, pid: u32, actor: Option<ActorId>) -> Result<()> {
        let msg = RegisterWorker {
            pid,
            actor_id: actor.map(|a| a.as_bytes().to_vec()),
        };
        self.stream
            .write_frame(&Frame::new(MessageType::RegisterWorker, &msg)?)
            .await?;
        Ok(())
    }

    /// Submit a task for scheduling.
    pub async fn submit_task(&mut self, spec: &TaskSpec) -> Result<()> {
        let msg = SubmitTask {
            spec: Some(spec.clone()),
        };
        self.stream
            .write_frame(&Frame::new(MessageType::SubmitTask, &msg)?)
            .await?;
        Ok(())
    }

    /// Ask for a task assignment and block until one arrives.
    ///
    /// If this connection already holds an assigned task, the scheduler
    /// treats the request as completing that task first. Returns
    /// [`SdkError::Terminated`] when the scheduler asks the worker to exit
    /// instead of assigning work.
    pub async fn get_task(&mut self) -> Result<TaskSpec> {
        self.stream
            .write_frame(&Frame::empty(MessageType::GetTask))
            .await?;

        let frame = self.stream.read_frame().await?;
        match frame.message_type {
            MessageType::ExecuteTask => {
                let msg: ExecuteTask = frame.decode()?;
                msg.spec.ok_or(SdkError::MissingSpec)
            }
            MessageType::Terminate => Err(SdkError::Terminated),
            other => Err(SdkError::UnexpectedMessage(other)),
        }
    }

    /// Report the current task as done without asking for another one.
    pub async fn task_done(&mut self) -> Result<()> {
        self.stream
            .write_frame(&Frame::empty(MessageType::TaskDone))
            .await?;
        Ok(())
    }

    /// Ask the scheduler to make a lost object available again.
    #[instrument(skip(self), fields(object_id = %object_id))]
    pub async fn reconstruct_object(&mut self, object_id: ObjectId) -> Result<()> {
        let msg = ReconstructObject {
            object_id: object_id.as_bytes().to_vec(),
        };
        self.stream
            .write_frame(&Frame::new(MessageType::ReconstructObject, &msg)?)
            .await?;
        Ok(())
    }

    /// Tell the scheduler this worker is no longer blocked on an object.
    pub async fn notify_unblocked(&mut self) -> Result<()> {
        self.stream
            .write_frame(&Frame::empty(MessageType::NotifyUnblocked))
            .await?;
        Ok(())
    }

    /// Announce a clean disconnect and close the connection.
    pub async fn disconnect(mut self) -> Result<()> {
        self.stream
            .write_frame(&Frame::empty(MessageType::Disconnect))
            .await?;
        Ok(())
    }
}
