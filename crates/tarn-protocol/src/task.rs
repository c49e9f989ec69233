// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Task descriptors and the deterministic id scheme.
//!
//! A [`TaskSpec`] is an immutable, content-identified record: its [`TaskId`]
//! is a hash of the spec's contents, and the id of its k-th return value is
//! derived from the task id and k. Any node can therefore name a task's
//! return objects without running the task, which is what the reconstruction
//! protocol relies on.

use std::fmt;

use thiserror::Error;

/// Width of every id in bytes.
pub const ID_SIZE: usize = 20;

/// Domain separator for task id hashing.
const TASK_ID_CONTEXT: &[u8] = b"tarn.task_id.v1";

/// Domain separator for return object id derivation.
const RETURN_ID_CONTEXT: &[u8] = b"tarn.return_id.v1";

/// Error for byte strings that are not a valid id.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid id length: expected {ID_SIZE} bytes, got {0}")]
pub struct IdError(pub usize);

/// Identifier of an object produced (or consumed) by a task.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; ID_SIZE]);

impl ObjectId {
    /// The all-zero id, used as a "no object" sentinel.
    pub const NIL: ObjectId = ObjectId([0u8; ID_SIZE]);

    pub fn from_bytes(bytes: [u8; ID_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self, IdError> {
        let bytes: [u8; ID_SIZE] = slice.try_into().map_err(|_| IdError(slice.len()))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; ID_SIZE] {
        &self.0
    }

    pub fn is_nil(&self) -> bool {
        *self == Self::NIL
    }

    /// Id of the k-th return value of the task `task_id`.
    ///
    /// The derivation is normative: every node must compute the same id for
    /// the same (task, index) pair.
    pub fn for_return(task_id: TaskId, k: u32) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(RETURN_ID_CONTEXT);
        hasher.update(task_id.as_bytes());
        hasher.update(&k.to_le_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; ID_SIZE];
        bytes.copy_from_slice(&digest.as_bytes()[..ID_SIZE]);
        Self(bytes)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self)
    }
}

/// Identifier of a task, derived from the spec contents.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId([u8; ID_SIZE]);

impl TaskId {
    pub fn from_bytes(bytes: [u8; ID_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self, IdError> {
        let bytes: [u8; ID_SIZE] = slice.try_into().map_err(|_| IdError(slice.len()))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; ID_SIZE] {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({})", self)
    }
}

/// Actor identity. Actor-tagged tasks may only run on the worker hosting the
/// actor, so the id doubles as a placement constraint.
pub type ActorId = ObjectId;

/// Scalar resource demand or capacity (CPU slots, GPU slots).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceVector {
    pub cpus: u32,
    pub gpus: u32,
}

impl ResourceVector {
    pub fn new(cpus: u32, gpus: u32) -> Self {
        Self { cpus, gpus }
    }
}

impl fmt::Display for ResourceVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{cpus: {}, gpus: {}}}", self.cpus, self.gpus)
    }
}

/// Immutable task descriptor.
///
/// Equality is field-wise, which for a prost message coincides with byte-wise
/// equality of the deterministic encoding — the property the task table and
/// the assignment protocol rely on.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TaskSpec {
    /// Content hash of the spec, filled in by [`SpecBuilder::finish`].
    #[prost(bytes = "vec", tag = "1")]
    pub task_id: Vec<u8>,
    /// Opaque identifier of the function to execute.
    #[prost(bytes = "vec", tag = "2")]
    pub function_id: Vec<u8>,
    /// Ordered argument object ids.
    #[prost(bytes = "vec", repeated, tag = "3")]
    pub args: Vec<Vec<u8>>,
    /// Number of return values the task produces.
    #[prost(uint32, tag = "4")]
    pub num_returns: u32,
    /// CPU slots required while running.
    #[prost(uint32, tag = "5")]
    pub required_cpus: u32,
    /// GPU slots required while running.
    #[prost(uint32, tag = "6")]
    pub required_gpus: u32,
    /// Actor the task is bound to, absent for plain tasks.
    #[prost(bytes = "vec", optional, tag = "7")]
    pub actor_id: Option<Vec<u8>>,
}

impl TaskSpec {
    pub fn task_id(&self) -> Result<TaskId, IdError> {
        TaskId::from_slice(&self.task_id)
    }

    pub fn arg_ids(&self) -> Result<Vec<ObjectId>, IdError> {
        self.args
            .iter()
            .map(|a| ObjectId::from_slice(a))
            .collect()
    }

    pub fn actor(&self) -> Result<Option<ActorId>, IdError> {
        self.actor_id
            .as_deref()
            .map(ObjectId::from_slice)
            .transpose()
    }

    /// Id of the k-th return value.
    pub fn return_id(&self, k: u32) -> Result<ObjectId, IdError> {
        Ok(ObjectId::for_return(self.task_id()?, k))
    }

    /// Ids of all return values.
    pub fn return_ids(&self) -> Result<Vec<ObjectId>, IdError> {
        let task_id = self.task_id()?;
        Ok((0..self.num_returns)
            .map(|k| ObjectId::for_return(task_id, k))
            .collect())
    }

    pub fn demand(&self) -> ResourceVector {
        ResourceVector::new(self.required_cpus, self.required_gpus)
    }

    /// Serialized form, as stored in the task table and sent on the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        use prost::Message;
        self.encode_to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, prost::DecodeError> {
        use prost::Message;
        Self::decode(bytes)
    }
}

/// Builder for [`TaskSpec`]s.
///
/// Replaces the process-wide task-builder singleton of older runtimes: each
/// submitting context owns one, seeded with its driver (or actor) identity so
/// identical calls from different drivers yield distinct task ids.
#[derive(Debug, Clone)]
pub struct SpecBuilder {
    driver_id: Vec<u8>,
    function_id: Vec<u8>,
    args: Vec<ObjectId>,
    num_returns: u32,
    cpus: u32,
    gpus: u32,
    actor: Option<ActorId>,
}

impl SpecBuilder {
    pub fn new(driver_id: &[u8]) -> Self {
        Self {
            driver_id: driver_id.to_vec(),
            function_id: Vec::new(),
            args: Vec::new(),
            num_returns: 1,
            cpus: 1,
            gpus: 0,
            actor: None,
        }
    }

    pub fn function(mut self, function_id: &[u8]) -> Self {
        self.function_id = function_id.to_vec();
        self
    }

    pub fn arg(mut self, arg: ObjectId) -> Self {
        self.args.push(arg);
        self
    }

    pub fn args(mut self, args: &[ObjectId]) -> Self {
        self.args.extend_from_slice(args);
        self
    }

    pub fn num_returns(mut self, num_returns: u32) -> Self {
        self.num_returns = num_returns;
        self
    }

    pub fn resources(mut self, cpus: u32, gpus: u32) -> Self {
        self.cpus = cpus;
        self.gpus = gpus;
        self
    }

    pub fn actor(mut self, actor: ActorId) -> Self {
        self.actor = Some(actor);
        self
    }

    /// Compute the task id and produce the immutable spec.
    pub fn finish(self) -> TaskSpec {
        let mut hasher = blake3::Hasher::new();
        hasher.update(TASK_ID_CONTEXT);
        hasher.update(&(self.driver_id.len() as u64).to_le_bytes());
        hasher.update(&self.driver_id);
        hasher.update(&(self.function_id.len() as u64).to_le_bytes());
        hasher.update(&self.function_id);
        hasher.update(&(self.args.len() as u64).to_le_bytes());
        for arg in &self.args {
            hasher.update(arg.as_bytes());
        }
        hasher.update(&self.num_returns.to_le_bytes());
        hasher.update(&self.cpus.to_le_bytes());
        hasher.update(&self.gpus.to_le_bytes());
        match &self.actor {
            Some(actor) => {
                hasher.update(&[1u8]);
                hasher.update(actor.as_bytes());
            }
            None => {
                hasher.update(&[0u8]);
            }
        }
        let digest = hasher.finalize();
        let mut task_id = [0u8; ID_SIZE];
        task_id.copy_from_slice(&digest.as_bytes()[..ID_SIZE]);

        TaskSpec {
            task_id: task_id.to_vec(),
            function_id: self.function_id,
            args: self.args.iter().map(|a| a.as_bytes().to_vec()).collect(),
            num_returns: self.num_returns,
            required_cpus: self.cpus,
            required_gpus: self.gpus,
            actor_id: self.actor.map(|a| a.as_bytes().to_vec()),
        }
    }
}
