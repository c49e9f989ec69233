// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Metadata-store client: the task table and the object table.
//!
//! Both tables live in a replicated Redis keyspace shared by every node:
//!
//! - `task_table:<task_id>` — hash `{status, owner, spec}`
//! - `result_table:<object_id>` — producing task id, written on task-table
//!   add so any node can walk from a lost object to its lineage
//! - `object_table:<object_id>` — set of node ids holding the object
//! - `object_meta:<object_id>` — hash `{size, digest}`
//!
//! Status writes that can race with other nodes go through a Lua
//! compare-and-swap so at most one node wins a given transition. Task-table
//! adds publish the task id on `task_table_notify:<owner>`, which owners
//! subscribe to; this is how a task re-queued by a remote reconstruction
//! winner reaches the node that should run it.

use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use tarn_protocol::task::{IdError, ObjectId, TaskId, TaskSpec};

use crate::engine::Event;

/// Task lifecycle status as stored in the task table.
///
/// Precedence is monotone `WAITING < SCHEDULED < RUNNING < DONE`; `LOST`
/// supersedes any non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Waiting,
    Scheduled,
    Running,
    Done,
    Lost,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::Scheduled => "SCHEDULED",
            Self::Running => "RUNNING",
            Self::Done => "DONE",
            Self::Lost => "LOST",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "WAITING" => Some(Self::Waiting),
            "SCHEDULED" => Some(Self::Scheduled),
            "RUNNING" => Some(Self::Running),
            "DONE" => Some(Self::Done),
            "LOST" => Some(Self::Lost),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task-table entry.
#[derive(Debug, Clone)]
pub struct TaskEntry {
    pub status: TaskStatus,
    pub owner: String,
    pub spec: TaskSpec,
}

/// Metadata store errors
#[derive(Debug, Error)]
pub enum GcsError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("corrupt table entry for {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("spec decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("malformed id in table entry: {0}")]
    InvalidId(#[from] IdError),
}

/// Asynchronous task-table and object-table operations.
///
/// The engine holds this as a trait object so scheduling logic can be driven
/// against a mock store in tests.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Upsert a task entry and index its return objects to it.
    async fn task_table_add(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        owner: &str,
        spec: &TaskSpec,
    ) -> Result<(), GcsError>;

    /// Conditionally advance a task's status. The write happens iff the
    /// current status equals `expected`, or `new` is `Lost` and the current
    /// status is non-terminal. Returns whether the write won.
    async fn task_table_update(
        &self,
        task_id: TaskId,
        expected: TaskStatus,
        new: TaskStatus,
    ) -> Result<bool, GcsError>;

    async fn task_table_get(&self, task_id: TaskId) -> Result<Option<TaskEntry>, GcsError>;

    /// The task that produces `object_id`, if the object is known.
    async fn task_table_lookup_producer(
        &self,
        object_id: ObjectId,
    ) -> Result<Option<TaskId>, GcsError>;

    /// Record that `node` holds a copy of the object.
    async fn object_table_add(
        &self,
        object_id: ObjectId,
        size: u64,
        digest: &[u8],
        node: &str,
    ) -> Result<(), GcsError>;

    /// Remove `node` from the object's location set.
    async fn object_table_remove(&self, object_id: ObjectId, node: &str) -> Result<(), GcsError>;

    /// Nodes currently holding the object.
    async fn object_table_lookup(&self, object_id: ObjectId) -> Result<Vec<String>, GcsError>;
}

const STATUS_CAS_SCRIPT: &str = r#"
local cur = redis.call('HGET', KEYS[1], 'status')
if cur == ARGV[1] then
    redis.call('HSET', KEYS[1], 'status', ARGV[2])
    return 1
end
if ARGV[2] == 'LOST' and cur and cur ~= 'DONE' and cur ~= 'LOST' then
    redis.call('HSET', KEYS[1], 'status', ARGV[2])
    return 1
end
return 0
"#;

fn task_key(task_id: TaskId) -> String {
    format!("task_table:{task_id}")
}

fn result_key(object_id: ObjectId) -> String {
    format!("result_table:{object_id}")
}

fn object_key(object_id: ObjectId) -> String {
    format!("object_table:{object_id}")
}

fn object_meta_key(object_id: ObjectId) -> String {
    format!("object_meta:{object_id}")
}

fn notify_channel(owner: &str) -> String {
    format!("task_table_notify:{owner}")
}

fn object_channel(object_id: ObjectId) -> String {
    format!("object_table_notify:{object_id}")
}

/// Normalize a `host:port` address into a Redis URL.
pub fn redis_url(address: &str) -> String {
    if address.starts_with("redis://") {
        address.to_string()
    } else {
        format!("redis://{address}")
    }
}

/// Redis implementation of [`MetadataStore`].
#[derive(Clone)]
pub struct RedisStore {
    conn: redis::aio::ConnectionManager,
    cas: redis::Script,
}

impl RedisStore {
    /// Connect to the metadata store at `host:port`.
    pub async fn connect(address: &str) -> Result<Self, GcsError> {
        let client = redis::Client::open(redis_url(address))?;
        let conn = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            cas: redis::Script::new(STATUS_CAS_SCRIPT),
        })
    }

    /// Round-trip health check.
    pub async fn ping(&self) -> Result<(), GcsError> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        debug!(%pong, "Metadata store health check passed");
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for RedisStore {
    async fn task_table_add(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        owner: &str,
        spec: &TaskSpec,
    ) -> Result<(), GcsError> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.cmd("HSET")
            .arg(task_key(task_id))
            .arg("status")
            .arg(status.as_str())
            .arg("owner")
            .arg(owner)
            .arg("spec")
            .arg(spec.to_bytes());
        for return_id in spec.return_ids()? {
            pipe.cmd("SET")
                .arg(result_key(return_id))
                .arg(&task_id.as_bytes()[..]);
        }
        pipe.cmd("PUBLISH")
            .arg(notify_channel(owner))
            .arg(&task_id.as_bytes()[..]);
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn task_table_update(
        &self,
        task_id: TaskId,
        expected: TaskStatus,
        new: TaskStatus,
    ) -> Result<bool, GcsError> {
        let mut conn = self.conn.clone();
        let won: i32 = self
            .cas
            .key(task_key(task_id))
            .arg(expected.as_str())
            .arg(new.as_str())
            .invoke_async(&mut conn)
            .await?;
        Ok(won == 1)
    }

    async fn task_table_get(&self, task_id: TaskId) -> Result<Option<TaskEntry>, GcsError> {
        let mut conn = self.conn.clone();
        let key = task_key(task_id);
        let (status, owner, spec): (Option<String>, Option<String>, Option<Vec<u8>>) =
            redis::cmd("HMGET")
                .arg(&key)
                .arg("status")
                .arg("owner")
                .arg("spec")
                .query_async(&mut conn)
                .await?;

        let (Some(status), Some(owner), Some(spec)) = (status, owner, spec) else {
            return Ok(None);
        };
        let status = TaskStatus::parse(&status).ok_or_else(|| GcsError::Corrupt {
            key: key.clone(),
            reason: format!("unknown status {status:?}"),
        })?;
        let spec = TaskSpec::from_bytes(&spec)?;
        Ok(Some(TaskEntry {
            status,
            owner,
            spec,
        }))
    }

    async fn task_table_lookup_producer(
        &self,
        object_id: ObjectId,
    ) -> Result<Option<TaskId>, GcsError> {
        let mut conn = self.conn.clone();
        let bytes: Option<Vec<u8>> = conn.get(result_key(object_id)).await?;
        match bytes {
            Some(bytes) => Ok(Some(TaskId::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn object_table_add(
        &self,
        object_id: ObjectId,
        size: u64,
        digest: &[u8],
        node: &str,
    ) -> Result<(), GcsError> {
        let mut conn = self.conn.clone();
        // The per-key publish is the object-location notification bus;
        // remote store managers subscribe to keys they are waiting on.
        redis::pipe()
            .cmd("SADD")
            .arg(object_key(object_id))
            .arg(node)
            .cmd("HSET")
            .arg(object_meta_key(object_id))
            .arg("size")
            .arg(size)
            .arg("digest")
            .arg(digest)
            .cmd("PUBLISH")
            .arg(object_channel(object_id))
            .arg(node)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn object_table_remove(&self, object_id: ObjectId, node: &str) -> Result<(), GcsError> {
        let mut conn = self.conn.clone();
        redis::pipe()
            .cmd("SREM")
            .arg(object_key(object_id))
            .arg(node)
            .cmd("PUBLISH")
            .arg(object_channel(object_id))
            .arg(node)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn object_table_lookup(&self, object_id: ObjectId) -> Result<Vec<String>, GcsError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.smembers(object_key(object_id)).await?;
        Ok(members)
    }
}

/// Subscribe to `task_table_notify:<owner>` and forward task ids into the
/// engine loop. Runs until the connection or the engine goes away.
pub async fn subscribe_task_table(address: String, owner: String, events: mpsc::Sender<Event>) {
    let channel = notify_channel(&owner);
    let client = match redis::Client::open(redis_url(&address)) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Invalid metadata store address for subscription");
            return;
        }
    };
    let mut pubsub = match client.get_async_pubsub().await {
        Ok(pubsub) => pubsub,
        Err(e) => {
            error!(error = %e, "Failed to open task-table subscription");
            return;
        }
    };
    if let Err(e) = pubsub.subscribe(&channel).await {
        error!(error = %e, channel, "Failed to subscribe to task-table channel");
        return;
    }
    info!(channel, "Subscribed to task-table notifications");

    let mut stream = pubsub.on_message();
    while let Some(msg) = stream.next().await {
        let payload: Vec<u8> = match msg.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable task-table notification");
                continue;
            }
        };
        match TaskId::from_slice(&payload) {
            Ok(task_id) => {
                if events.send(Event::TaskTableNotify(task_id)).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!(error = %e, "Ignoring malformed task-table notification"),
        }
    }
    debug!(channel, "Task-table subscription ended");
}
