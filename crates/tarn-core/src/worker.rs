// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker subprocess pool and per-connection worker records.
//!
//! A worker moves through `SPAWNED -> CONNECTED -> REGISTERED -> (IDLE <->
//! BUSY) -> DEAD`. The pool tracks spawned-but-unregistered child PIDs
//! separately from connected workers; registration is the hand-off point
//! where a child PID is matched to its connection. Connections whose PID was
//! never spawned by us (drivers, externally managed workers) are tracked all
//! the same but are not replaced on death.

use std::collections::{HashMap, HashSet, VecDeque};
use std::process::Stdio;

use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use tarn_protocol::frame::Frame;
use tarn_protocol::task::{ActorId, ObjectId, ResourceVector, TaskId};

use crate::config::Config;
use crate::engine::Event;
use crate::error::EngineError;

/// Engine-local identifier for a worker connection.
pub type WorkerId = u64;

/// A task currently owned by a worker.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub task_id: TaskId,
    pub demand: ResourceVector,
    /// Return object ids, used to settle reconstruction state on completion.
    pub returns: Vec<ObjectId>,
}

/// A connected worker.
#[derive(Debug)]
pub struct WorkerClient {
    pub id: WorkerId,
    /// Frames queued here are drained to the socket by the writer task;
    /// dropping the sender closes the connection.
    pub sender: mpsc::UnboundedSender<Frame>,
    /// OS process id, known once the worker registers.
    pub pid: Option<u32>,
    /// Whether the registered pid came from our own spawn list.
    pub pool_owned: bool,
    /// Actor hosted by this worker, if any.
    pub actor: Option<ActorId>,
    /// Task in progress, if any.
    pub assignment: Option<Assignment>,
    /// Set while the worker is waiting on a missing object it asked the
    /// engine to reconstruct. Cleared by NotifyUnblocked or the next GetTask.
    pub blocked: bool,
}

/// What the pool learned from a child process exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitDisposition {
    /// The pid belonged to a process we spawned.
    pub was_child: bool,
    /// The exit was requested by an explicit kill (no replacement needed).
    pub deliberate: bool,
}

/// Registry of worker connections and child processes.
#[derive(Debug)]
pub struct WorkerPool {
    /// How many pool-owned workers this node should keep alive.
    target: usize,
    next_id: WorkerId,
    workers: HashMap<WorkerId, WorkerClient>,
    /// Child pids that have not yet registered.
    spawned: Vec<u32>,
    /// All live child pids we spawned, registered or not.
    children: HashSet<u32>,
    /// Pids with a kill in flight; their exit must not trigger a respawn.
    terminating: HashSet<u32>,
    /// Idle workers, front = longest idle.
    idle: VecDeque<WorkerId>,
}

impl WorkerPool {
    pub fn new(target: usize) -> Self {
        Self {
            target,
            next_id: 0,
            workers: HashMap::new(),
            spawned: Vec::new(),
            children: HashSet::new(),
            terminating: HashSet::new(),
            idle: VecDeque::new(),
        }
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn set_target(&mut self, target: usize) {
        self.target = target;
    }

    pub fn num_spawned(&self) -> usize {
        self.spawned.len()
    }

    pub fn num_connected(&self) -> usize {
        self.workers.len()
    }

    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    pub fn child_pids(&self) -> impl Iterator<Item = u32> + '_ {
        self.children.iter().copied()
    }

    pub fn has_child(&self, pid: u32) -> bool {
        self.children.contains(&pid)
    }

    pub fn worker_ids(&self) -> Vec<WorkerId> {
        self.workers.keys().copied().collect()
    }

    pub fn get(&self, id: WorkerId) -> Option<&WorkerClient> {
        self.workers.get(&id)
    }

    pub fn get_mut(&mut self, id: WorkerId) -> Option<&mut WorkerClient> {
        self.workers.get_mut(&id)
    }

    pub fn find_by_pid(&self, pid: u32) -> Option<WorkerId> {
        self.workers
            .values()
            .find(|w| w.pid == Some(pid))
            .map(|w| w.id)
    }

    /// Whether any connected worker currently owns `task_id`.
    pub fn is_running(&self, task_id: TaskId) -> bool {
        self.workers
            .values()
            .any(|w| w.assignment.as_ref().is_some_and(|a| a.task_id == task_id))
    }

    /// Record a freshly accepted connection.
    pub fn add_connection(&mut self, sender: mpsc::UnboundedSender<Frame>) -> WorkerId {
        let id = self.next_id;
        self.next_id += 1;
        self.workers.insert(
            id,
            WorkerClient {
                id,
                sender,
                pid: None,
                pool_owned: false,
                actor: None,
                assignment: None,
                blocked: false,
            },
        );
        id
    }

    /// Process a registration message: bind the pid (and actor) to the
    /// connection, consuming the matching entry of the spawn list if there
    /// is one. Returns whether the worker is pool-owned.
    pub fn register(&mut self, id: WorkerId, pid: u32, actor: Option<ActorId>) -> bool {
        let matched = if let Some(pos) = self.spawned.iter().position(|p| *p == pid) {
            self.spawned.remove(pos);
            true
        } else {
            false
        };
        if let Some(worker) = self.workers.get_mut(&id) {
            worker.pid = Some(pid);
            worker.pool_owned = matched;
            worker.actor = actor;
        }
        matched
    }

    /// Record that we spawned a child with this pid.
    pub fn note_spawn(&mut self, pid: u32) {
        self.spawned.push(pid);
        self.children.insert(pid);
    }

    /// Record a child process exit.
    pub fn note_exit(&mut self, pid: u32) -> ExitDisposition {
        let was_child = self.children.remove(&pid);
        self.spawned.retain(|p| *p != pid);
        let deliberate = self.terminating.remove(&pid);
        ExitDisposition {
            was_child,
            deliberate,
        }
    }

    /// Mark a pid as deliberately killed so its exit is not replaced.
    pub fn mark_terminating(&mut self, pid: u32) {
        self.terminating.insert(pid);
    }

    /// Park a worker as idle. Re-parking moves it to the most-recently-used
    /// end, so `select_idle` keeps preferring the longest-idle worker.
    pub fn mark_idle(&mut self, id: WorkerId) {
        self.idle.retain(|w| *w != id);
        self.idle.push_back(id);
    }

    /// Pick the longest-idle worker eligible for a task with the given actor
    /// constraint: actor tasks need the worker hosting that actor, plain
    /// tasks take any idle plain worker.
    pub fn select_idle(&self, actor: Option<ActorId>) -> Option<WorkerId> {
        self.idle
            .iter()
            .copied()
            .find(|id| match self.workers.get(id) {
                Some(worker) => !worker.blocked && worker.actor == actor,
                None => false,
            })
    }

    /// Remove a worker from the idle set (on assignment).
    pub fn take_idle(&mut self, id: WorkerId) {
        self.idle.retain(|w| *w != id);
    }

    /// Queue a frame for delivery. Returns false if the connection's writer
    /// is gone.
    pub fn send_frame(&self, id: WorkerId, frame: Frame) -> bool {
        match self.workers.get(&id) {
            Some(worker) => worker.sender.send(frame).is_ok(),
            None => false,
        }
    }

    /// Remove a worker record entirely (death, kill, disconnect).
    pub fn remove(&mut self, id: WorkerId) -> Option<WorkerClient> {
        self.idle.retain(|w| *w != id);
        self.workers.remove(&id)
    }
}

/// Substitute the configuration paths into a worker command template.
///
/// Recognized tokens: `{node-ip-address}`, `{object-store-name}`,
/// `{object-store-manager-name}`, `{local-scheduler-name}`,
/// `{redis-address}`.
pub fn render_worker_command(template: &str, config: &Config) -> String {
    template
        .replace("{node-ip-address}", &config.node_ip_address)
        .replace(
            "{object-store-name}",
            &config.object_store_socket.display().to_string(),
        )
        .replace(
            "{object-store-manager-name}",
            &config.object_store_manager_socket.display().to_string(),
        )
        .replace(
            "{local-scheduler-name}",
            &config.scheduler_socket.display().to_string(),
        )
        .replace("{redis-address}", &config.redis_address)
}

/// Spawn one worker subprocess and a reaper task that reports its exit into
/// the engine loop. Returns the child pid.
pub fn spawn_worker_process(
    config: &Config,
    events: mpsc::Sender<Event>,
) -> Result<u32, EngineError> {
    let template = config
        .worker_command
        .as_deref()
        .ok_or_else(|| EngineError::Spawn("no worker command configured".to_string()))?;
    let rendered = render_worker_command(template, config);
    let mut parts = rendered.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| EngineError::Spawn("empty worker command".to_string()))?;

    let mut child = Command::new(program)
        .args(parts)
        .stdin(Stdio::null())
        .spawn()
        .map_err(|e| EngineError::Spawn(format!("{rendered}: {e}")))?;

    let pid = child
        .id()
        .ok_or_else(|| EngineError::Spawn("worker exited before spawn returned".to_string()))?;
    info!(pid, command = %rendered, "Spawned worker");

    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => debug!(pid, %status, "Worker process exited"),
            Err(e) => warn!(pid, error = %e, "Failed to reap worker process"),
        }
        let _ = events.send(Event::WorkerExited { pid }).await;
    });

    Ok(pid)
}
