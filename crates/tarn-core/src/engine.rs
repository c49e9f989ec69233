// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The scheduling engine.
//!
//! One actor task owns every piece of mutable scheduler state: the queues,
//! the resource ledger, the worker pool, and the reconstruction tracker.
//! Socket I/O runs on per-connection reader/writer tasks that only exchange
//! [`Event`]s and frames with the actor, so no state is shared across
//! threads and per-source message order is preserved by the channels.
//!
//! Metadata-store calls are awaited inline by the actor. That makes every
//! multi-step protocol (assignment, completion, reconstruction) read
//! consistently within one event and gives per-key operations a total order:
//! the actor's own program order.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use tarn_protocol::frame::{Frame, MessageType};
use tarn_protocol::messages::{ExecuteTask, ReconstructObject, RegisterWorker, SubmitTask};
use tarn_protocol::task::{ObjectId, ResourceVector, TaskId, TaskSpec};

use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::gcs::{MetadataStore, TaskStatus};
use crate::plasma::ObjectManagerClient;
use crate::reconstruction::ReconstructionTracker;
use crate::sched::{PendingTask, ResourceLedger, SchedulingPolicy};
use crate::server::spawn_connection_io;
use crate::worker::{spawn_worker_process, Assignment, WorkerId, WorkerPool};

/// Everything that can wake the engine.
#[derive(Debug)]
pub enum Event {
    /// A worker connected to the scheduler socket.
    WorkerConnected(UnixStream),
    /// A frame arrived on a worker connection.
    WorkerFrame { worker: WorkerId, frame: Frame },
    /// A worker connection closed (EOF or stream error).
    WorkerClosed { worker: WorkerId },
    /// A child process exited and was reaped.
    WorkerExited { pid: u32 },
    /// A graceful kill's grace period ran out.
    GracefulKillExpired { pid: u32 },
    /// The object store sealed an object locally.
    ObjectSealed(ObjectId),
    /// The object store evicted an object locally.
    ObjectEvicted(ObjectId),
    /// The task table published a change for a task this node owns.
    TaskTableNotify(TaskId),
    /// An operator command from the engine handle.
    Command(EngineCommand),
}

/// Operator commands accepted by the engine.
#[derive(Debug)]
pub enum EngineCommand {
    /// Report current counters.
    Snapshot(oneshot::Sender<EngineSnapshot>),
    /// Grow the pool by one worker.
    StartWorker(oneshot::Sender<Result<()>>),
    /// Kill a worker. Graceful kills send a terminate message and escalate
    /// to SIGKILL after the configured grace period.
    KillWorker {
        id: WorkerId,
        graceful: bool,
        reply: oneshot::Sender<bool>,
    },
    /// Stop the engine and kill remaining children.
    Shutdown,
}

/// Point-in-time engine counters, for health reporting and tests.
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    pub waiting: usize,
    pub dispatch: usize,
    pub spawned_children: usize,
    pub connected_workers: usize,
    pub local_objects: usize,
    pub available_resources: ResourceVector,
    pub workers: Vec<WorkerSummary>,
}

/// Per-worker line in a snapshot.
#[derive(Debug, Clone)]
pub struct WorkerSummary {
    pub id: WorkerId,
    pub pid: Option<u32>,
    pub busy: bool,
}

/// Cloneable handle for feeding events and commands to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Event>,
}

impl EngineHandle {
    pub fn new(tx: mpsc::Sender<Event>) -> Self {
        Self { tx }
    }

    /// The raw event sender, for wiring up I/O sources.
    pub fn sender(&self) -> mpsc::Sender<Event> {
        self.tx.clone()
    }

    pub async fn snapshot(&self) -> Option<EngineSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Event::Command(EngineCommand::Snapshot(reply)))
            .await
            .ok()?;
        rx.await.ok()
    }

    /// Ask the engine to spawn one more pool worker.
    pub async fn start_worker(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(Event::Command(EngineCommand::StartWorker(reply)))
            .await
            .is_err()
        {
            return false;
        }
        matches!(rx.await, Ok(Ok(())))
    }

    /// Kill a worker by id. Returns whether the worker existed.
    pub async fn kill_worker(&self, id: WorkerId, graceful: bool) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(Event::Command(EngineCommand::KillWorker {
                id,
                graceful,
                reply,
            }))
            .await
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(Event::Command(EngineCommand::Shutdown)).await;
    }
}

/// The engine actor.
pub struct Engine {
    config: Config,
    node_id: String,
    store: Arc<dyn MetadataStore>,
    manager: ObjectManagerClient,
    policy: SchedulingPolicy,
    ledger: ResourceLedger,
    pool: WorkerPool,
    reconstructions: ReconstructionTracker,
    rx: mpsc::Receiver<Event>,
    tx: mpsc::Sender<Event>,
    shutting_down: bool,
}

impl Engine {
    pub fn new(
        config: Config,
        store: Arc<dyn MetadataStore>,
        manager: ObjectManagerClient,
        rx: mpsc::Receiver<Event>,
        tx: mpsc::Sender<Event>,
    ) -> Self {
        let ledger = ResourceLedger::new(config.static_resources);
        let pool = WorkerPool::new(config.num_workers);
        Self {
            config,
            node_id: Uuid::new_v4().to_string(),
            store,
            manager,
            policy: SchedulingPolicy::new(),
            ledger,
            pool,
            reconstructions: ReconstructionTracker::new(),
            rx,
            tx,
            shutting_down: false,
        }
    }

    /// Identity of this node in the task and object tables.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Run the engine until shutdown. Consumes the actor; all interaction
    /// from here on goes through the [`EngineHandle`].
    pub async fn run(mut self) {
        info!(
            node = %self.node_id,
            workers = self.config.num_workers,
            resources = %self.ledger.capacity(),
            "Scheduler engine running"
        );
        for _ in 0..self.config.num_workers {
            match spawn_worker_process(&self.config, self.tx.clone()) {
                Ok(pid) => self.pool.note_spawn(pid),
                Err(e) => error!(error = %e, "Failed to spawn initial worker"),
            }
        }

        while let Some(event) = self.rx.recv().await {
            self.handle_event(event).await;
            if self.shutting_down {
                break;
            }
        }

        self.shutdown_children();
        info!("Scheduler engine stopped");
    }

    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::WorkerConnected(stream) => self.handle_worker_connected(stream),
            Event::WorkerFrame { worker, frame } => self.handle_worker_frame(worker, frame).await,
            Event::WorkerClosed { worker } => self.remove_worker(worker, "connection closed").await,
            Event::WorkerExited { pid } => self.handle_worker_exited(pid).await,
            Event::GracefulKillExpired { pid } => self.handle_kill_expired(pid),
            Event::ObjectSealed(object_id) => self.handle_object_sealed(object_id).await,
            Event::ObjectEvicted(object_id) => self.handle_object_evicted(object_id),
            Event::TaskTableNotify(task_id) => self.handle_task_table_notify(task_id).await,
            Event::Command(command) => self.handle_command(command).await,
        }
    }

    // ========================================================================
    // Worker connections and messages
    // ========================================================================

    fn handle_worker_connected(&mut self, stream: UnixStream) {
        let (read_half, write_half) = stream.into_split();
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let id = self.pool.add_connection(frame_tx);
        info!(worker = id, "Worker connected");
        spawn_connection_io(id, read_half, write_half, frame_rx, self.tx.clone());
    }

    async fn handle_worker_frame(&mut self, id: WorkerId, frame: Frame) {
        if self.pool.get(id).is_none() {
            debug!(worker = id, "Frame from removed worker, ignoring");
            return;
        }
        let result = match frame.message_type {
            MessageType::RegisterWorker => self.handle_register(id, frame),
            MessageType::SubmitTask => self.handle_submit(id, frame).await,
            MessageType::GetTask => self.handle_get_task(id).await,
            MessageType::TaskDone => {
                self.complete_assignment(id).await;
                Ok(())
            }
            MessageType::ReconstructObject => self.handle_reconstruct_request(id, frame).await,
            MessageType::NotifyUnblocked => {
                if let Some(worker) = self.pool.get_mut(id) {
                    worker.blocked = false;
                }
                Ok(())
            }
            MessageType::Disconnect => {
                self.remove_worker(id, "disconnected").await;
                Ok(())
            }
            other => Err(EngineError::ProtocolViolation {
                worker: id,
                message_type: other,
            }),
        };
        if let Err(e) = result {
            match e {
                // Store hiccups are not the worker's fault; the connection
                // manager retries underneath and the worker may try again.
                EngineError::Gcs(e) => {
                    warn!(worker = id, error = %e, "Metadata store operation failed")
                }
                e => {
                    warn!(worker = id, error = %e, "Worker message failed, closing connection");
                    self.remove_worker(id, "protocol error").await;
                }
            }
        }
    }

    fn handle_register(&mut self, id: WorkerId, frame: Frame) -> Result<()> {
        let msg: RegisterWorker = frame.decode()?;
        let actor = msg
            .actor_id
            .as_deref()
            .map(ObjectId::from_slice)
            .transpose()?;
        let pool_owned = self.pool.register(id, msg.pid, actor);
        info!(
            worker = id,
            pid = msg.pid,
            pool_owned,
            actor = ?actor,
            "Worker registered"
        );
        Ok(())
    }

    async fn handle_submit(&mut self, id: WorkerId, frame: Frame) -> Result<()> {
        let msg: SubmitTask = frame.decode()?;
        let spec = msg.spec.ok_or(EngineError::ProtocolViolation {
            worker: id,
            message_type: MessageType::SubmitTask,
        })?;
        self.submit_local(spec, true).await
    }

    /// Queue a task locally. `add_to_table` is false when the entry already
    /// exists (reconstruction re-queues, task-table notifications).
    async fn submit_local(&mut self, spec: TaskSpec, add_to_table: bool) -> Result<()> {
        let task = PendingTask::from_spec(spec)?;
        if self.policy.contains(task.task_id) {
            debug!(task = %task.task_id, "Task already queued, ignoring");
            return Ok(());
        }
        if add_to_table {
            self.store
                .task_table_add(task.task_id, TaskStatus::Waiting, &self.node_id, &task.spec)
                .await?;
        }
        let task_id = task.task_id;
        match self.policy.submit(task) {
            Ok(placement) => debug!(task = %task_id, ?placement, "Task queued"),
            Err(e) => debug!(task = %task_id, error = %e, "Task already queued"),
        }
        self.try_dispatch().await;
        Ok(())
    }

    async fn handle_get_task(&mut self, id: WorkerId) -> Result<()> {
        if self.pool.get(id).is_none() {
            return Err(EngineError::UnknownWorker(id));
        }
        // A worker asking for work has finished its previous task and is,
        // by definition, not blocked anymore.
        self.complete_assignment(id).await;
        if let Some(worker) = self.pool.get_mut(id) {
            worker.blocked = false;
        }
        self.pool.mark_idle(id);
        self.try_dispatch().await;
        Ok(())
    }

    /// Settle a worker's in-progress task: status RUNNING -> DONE, resources
    /// back to the ledger, reconstruction entries for its returns cleared.
    async fn complete_assignment(&mut self, id: WorkerId) {
        let Some(assignment) = self.pool.get_mut(id).and_then(|w| w.assignment.take()) else {
            return;
        };
        self.ledger.credit(assignment.demand);
        match self
            .store
            .task_table_update(assignment.task_id, TaskStatus::Running, TaskStatus::Done)
            .await
        {
            Ok(true) => info!(task = %assignment.task_id, worker = id, "Task done"),
            Ok(false) => debug!(
                task = %assignment.task_id,
                "Completion write lost to a concurrent status change"
            ),
            Err(e) => warn!(task = %assignment.task_id, error = %e, "Completion write failed"),
        }
        self.reconstructions.on_task_completed(assignment.returns);
    }

    async fn handle_reconstruct_request(&mut self, id: WorkerId, frame: Frame) -> Result<()> {
        let msg: ReconstructObject = frame.decode()?;
        let object_id = ObjectId::from_slice(&msg.object_id)?;
        if let Some(worker) = self.pool.get_mut(id) {
            // A busy worker asking for an object is stalled on it.
            if worker.assignment.is_some() {
                worker.blocked = true;
            }
        }
        info!(worker = id, object = %object_id, "Reconstruction requested");
        self.reconstruct(object_id).await;
        Ok(())
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Assign dispatchable tasks while the head of the queue fits the ledger
    /// and an eligible idle worker exists. Never skips past the head.
    async fn try_dispatch(&mut self) {
        loop {
            let Some((demand, actor)) = self
                .policy
                .peek_dispatch_head()
                .map(|task| (task.demand, task.actor))
            else {
                break;
            };
            if !self.ledger.fits(demand) {
                break;
            }
            let Some(worker_id) = self.pool.select_idle(actor) else {
                break;
            };
            let task = self.policy.pop_dispatch_head().expect("peeked head exists");
            self.assign(task, worker_id).await;
        }
    }

    async fn assign(&mut self, task: PendingTask, worker_id: WorkerId) {
        let returns = task.spec.return_ids().unwrap_or_else(|e| {
            warn!(task = %task.task_id, error = %e, "Spec with malformed task id in queue");
            Vec::new()
        });
        self.pool.take_idle(worker_id);
        if !self.ledger.debit(task.demand) {
            // try_dispatch checked the fit under the same borrow of state.
            warn!(task = %task.task_id, "Ledger refused a checked debit");
        }

        match self
            .store
            .task_table_update(task.task_id, TaskStatus::Waiting, TaskStatus::Scheduled)
            .await
        {
            Ok(true) => {}
            Ok(false) => debug!(task = %task.task_id, "Assignment status write lost a race"),
            Err(e) => warn!(task = %task.task_id, error = %e, "Assignment status write failed"),
        }

        let msg = ExecuteTask {
            spec: Some(task.spec.clone()),
        };
        let frame = match Frame::new(MessageType::ExecuteTask, &msg) {
            Ok(frame) => frame,
            Err(e) => {
                error!(task = %task.task_id, error = %e, "Failed to encode assignment");
                self.ledger.credit(task.demand);
                let _ = self.policy.submit(task);
                return;
            }
        };
        if !self.pool.send_frame(worker_id, frame) {
            warn!(
                worker = worker_id,
                task = %task.task_id,
                "Worker connection gone during assignment, requeueing"
            );
            self.ledger.credit(task.demand);
            let _ = self.policy.submit(task);
            self.remove_worker(worker_id, "assignment send failed").await;
            return;
        }

        if let Some(worker) = self.pool.get_mut(worker_id) {
            worker.assignment = Some(Assignment {
                task_id: task.task_id,
                demand: task.demand,
                returns,
            });
        }
        // The frame is queued to the worker: from this node's view the task
        // is now running.
        match self
            .store
            .task_table_update(task.task_id, TaskStatus::Scheduled, TaskStatus::Running)
            .await
        {
            Ok(_) => {}
            Err(e) => warn!(task = %task.task_id, error = %e, "Running status write failed"),
        }
        info!(task = %task.task_id, worker = worker_id, "Assigned task");
    }

    // ========================================================================
    // Worker lifecycle
    // ========================================================================

    /// Drop a worker record, releasing its task and resources. The task, if
    /// any, is demoted to LOST in the task table; reconstruction will
    /// re-queue it wherever its output is next needed.
    async fn remove_worker(&mut self, id: WorkerId, reason: &str) {
        let Some(worker) = self.pool.remove(id) else {
            return;
        };
        info!(worker = id, pid = ?worker.pid, reason, "Worker removed");
        if let Some(assignment) = worker.assignment {
            self.ledger.credit(assignment.demand);
            match self
                .store
                .task_table_update(assignment.task_id, TaskStatus::Running, TaskStatus::Lost)
                .await
            {
                Ok(true) => info!(task = %assignment.task_id, "In-flight task marked LOST"),
                Ok(false) => debug!(
                    task = %assignment.task_id,
                    "Task already terminal, not marked LOST"
                ),
                Err(e) => {
                    warn!(task = %assignment.task_id, error = %e, "LOST status write failed")
                }
            }
            // The local re-execution attempt is over; let a future
            // reconstruct request start a fresh one.
            self.reconstructions.on_task_completed(assignment.returns);
        }
    }

    async fn handle_worker_exited(&mut self, pid: u32) {
        let disposition = self.pool.note_exit(pid);
        debug!(pid, ?disposition, "Worker process exited");
        if let Some(id) = self.pool.find_by_pid(pid) {
            self.remove_worker(id, "process exited").await;
        }
        // Unexpected deaths of pool workers are replaced up to the target;
        // explicit kills shrank the target already.
        if disposition.was_child && !disposition.deliberate && !self.shutting_down {
            while self.pool.num_children() < self.pool.target() {
                match spawn_worker_process(&self.config, self.tx.clone()) {
                    Ok(pid) => self.pool.note_spawn(pid),
                    Err(e) => {
                        error!(error = %e, "Failed to spawn replacement worker");
                        break;
                    }
                }
            }
        }
    }

    fn handle_kill_expired(&mut self, pid: u32) {
        if self.pool.has_child(pid) {
            warn!(pid, "Worker ignored terminate request, escalating to SIGKILL");
            send_sigkill(pid);
        }
    }

    async fn kill_worker(&mut self, id: WorkerId, graceful: bool) -> bool {
        let (pid, pool_owned) = match self.pool.get(id) {
            Some(worker) => (worker.pid, worker.pool_owned),
            None => return false,
        };
        if pool_owned {
            // An explicit kill is an operator decision to shrink the pool;
            // only unexpected deaths are replaced.
            let target = self.pool.target();
            self.pool.set_target(target.saturating_sub(1));
        }
        if let Some(pid) = pid {
            self.pool.mark_terminating(pid);
        }
        if graceful {
            self.pool
                .send_frame(id, Frame::empty(MessageType::Terminate));
            if let Some(pid) = pid {
                let tx = self.tx.clone();
                let grace = self.config.kill_timeout;
                tokio::spawn(async move {
                    tokio::time::sleep(grace).await;
                    let _ = tx.send(Event::GracefulKillExpired { pid }).await;
                });
            }
        } else if let Some(pid) = pid {
            send_sigkill(pid);
        }
        self.remove_worker(id, if graceful { "graceful kill" } else { "killed" })
            .await;
        true
    }

    fn start_worker(&mut self) -> Result<()> {
        self.pool.set_target(self.pool.target() + 1);
        let pid = spawn_worker_process(&self.config, self.tx.clone())?;
        self.pool.note_spawn(pid);
        Ok(())
    }

    fn shutdown_children(&mut self) {
        let pids: Vec<u32> = self.pool.child_pids().collect();
        for pid in pids {
            self.pool.mark_terminating(pid);
            send_sigkill(pid);
        }
    }

    // ========================================================================
    // Object events
    // ========================================================================

    async fn handle_object_sealed(&mut self, object_id: ObjectId) {
        debug!(object = %object_id, "Object sealed locally");
        self.reconstructions.on_object_local(object_id);
        let promoted = self.policy.object_available(object_id);
        if !promoted.is_empty() {
            debug!(object = %object_id, count = promoted.len(), "Promoted waiting tasks");
        }
        self.try_dispatch().await;
    }

    fn handle_object_evicted(&mut self, object_id: ObjectId) {
        let demoted = self.policy.object_removed(object_id);
        if demoted.is_empty() {
            debug!(object = %object_id, "Object evicted locally");
        } else {
            info!(
                object = %object_id,
                count = demoted.len(),
                "Object evicted, demoted dependent tasks to waiting"
            );
        }
    }

    // ========================================================================
    // Task-table notifications
    // ========================================================================

    async fn handle_task_table_notify(&mut self, task_id: TaskId) {
        if self.policy.contains(task_id) || self.pool.is_running(task_id) {
            return;
        }
        let entry = match self.store.task_table_get(task_id).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return,
            Err(e) => {
                warn!(task = %task_id, error = %e, "Task table read failed");
                return;
            }
        };
        if entry.status == TaskStatus::Waiting && entry.owner == self.node_id {
            info!(task = %task_id, "Queueing task handed to this node");
            if let Err(e) = self.submit_local(entry.spec, false).await {
                warn!(task = %task_id, error = %e, "Failed to queue notified task");
            }
        }
    }

    // ========================================================================
    // Reconstruction
    // ========================================================================

    /// Recover a lost object, walking the lineage iteratively. Arguments of
    /// every re-queued task are pushed onto the worklist; present ones
    /// resolve to a benign fetch, lost ones recurse. The dependency graph is
    /// acyclic (ids are content-derived), so the walk terminates.
    async fn reconstruct(&mut self, root: ObjectId) {
        let mut work = VecDeque::from([root]);
        let mut visited = std::collections::HashSet::new();
        while let Some(object_id) = work.pop_front() {
            if !visited.insert(object_id) {
                continue;
            }
            if self.reconstructions.is_active(object_id) {
                debug!(object = %object_id, "Recovery already in flight, coalescing");
                continue;
            }
            match self.reconstruct_step(object_id).await {
                Ok(Some(args)) => work.extend(args),
                Ok(None) => {}
                Err(e) => warn!(object = %object_id, error = %e, "Reconstruction step failed"),
            }
        }
    }

    /// One step of the reconstruction protocol. Returns the argument ids of
    /// a task this step re-queued, for the caller to walk into.
    async fn reconstruct_step(&mut self, object_id: ObjectId) -> Result<Option<Vec<ObjectId>>> {
        // A listed location means the object exists; pull it instead of
        // re-running anything.
        let locations = self.store.object_table_lookup(object_id).await?;
        if !locations.is_empty() {
            debug!(
                object = %object_id,
                locations = locations.len(),
                "Object has remote copies, fetching"
            );
            self.reconstructions.set_fetch_requested(object_id);
            self.manager.fetch(object_id).await?;
            return Ok(None);
        }

        let Some(task_id) = self.store.task_table_lookup_producer(object_id).await? else {
            debug!(object = %object_id, "No producing task recorded, nothing to re-run");
            return Ok(None);
        };
        let Some(entry) = self.store.task_table_get(task_id).await? else {
            debug!(task = %task_id, "Producing task has no table entry");
            return Ok(None);
        };

        match entry.status {
            TaskStatus::Done => {
                // The task finished but its output is nowhere: evicted. Race
                // the other nodes for the re-execution; exactly one CAS wins.
                if self
                    .store
                    .task_table_update(task_id, TaskStatus::Done, TaskStatus::Waiting)
                    .await?
                {
                    info!(task = %task_id, object = %object_id, "Re-executing evicted lineage");
                    self.reconstructions.set_reconstruction_requested(object_id);
                    // Claim ownership, then queue locally.
                    self.store
                        .task_table_add(task_id, TaskStatus::Waiting, &self.node_id, &entry.spec)
                        .await?;
                    let args = entry.spec.arg_ids()?;
                    self.submit_local(entry.spec, false).await?;
                    Ok(Some(args))
                } else {
                    debug!(task = %task_id, "Re-execution suppressed: status moved on");
                    Ok(None)
                }
            }
            TaskStatus::Scheduled | TaskStatus::Running => {
                // An in-flight execution will (re)produce the object.
                debug!(task = %task_id, status = %entry.status, "Producing task is in flight");
                Ok(None)
            }
            TaskStatus::Waiting | TaskStatus::Lost => {
                if entry.owner == self.node_id
                    && !self.policy.contains(task_id)
                    && !self.pool.is_running(task_id)
                {
                    info!(task = %task_id, status = %entry.status, "Re-queueing owned task");
                    let args = entry.spec.arg_ids()?;
                    self.submit_local(entry.spec, false).await?;
                    Ok(Some(args))
                } else {
                    debug!(
                        task = %task_id,
                        owner = %entry.owner,
                        "Task is another node's to re-run"
                    );
                    Ok(None)
                }
            }
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    async fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            EngineCommand::StartWorker(reply) => {
                let _ = reply.send(self.start_worker());
            }
            EngineCommand::KillWorker { id, graceful, reply } => {
                let killed = self.kill_worker(id, graceful).await;
                let _ = reply.send(killed);
            }
            EngineCommand::Shutdown => {
                info!("Shutdown requested");
                self.shutting_down = true;
            }
        }
    }

    fn snapshot(&self) -> EngineSnapshot {
        let workers = self
            .pool
            .worker_ids()
            .into_iter()
            .filter_map(|id| self.pool.get(id))
            .map(|worker| WorkerSummary {
                id: worker.id,
                pid: worker.pid,
                busy: worker.assignment.is_some(),
            })
            .collect();
        EngineSnapshot {
            waiting: self.policy.num_waiting(),
            dispatch: self.policy.num_dispatch(),
            spawned_children: self.pool.num_spawned(),
            connected_workers: self.pool.num_connected(),
            local_objects: self.policy.num_local_objects(),
            available_resources: self.ledger.available(),
            workers,
        }
    }
}

fn send_sigkill(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    match kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) => debug!(pid, "Sent SIGKILL"),
        Err(nix::errno::Errno::ESRCH) => debug!(pid, "Process already dead"),
        Err(e) => warn!(pid, error = %e, "Failed to SIGKILL worker process"),
    }
}
