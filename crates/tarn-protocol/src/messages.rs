// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Protobuf message payloads for the worker and store protocols.
//!
//! The messages are written as hand-derived [`prost::Message`] structs so the
//! crate builds without a protoc toolchain. `GetTask`, `TaskDone`,
//! `NotifyUnblocked`, `Disconnect` and `Terminate` carry no payload and are
//! sent as empty frames (see [`crate::frame::Frame::empty`]).

use crate::task::TaskSpec;

/// Worker -> scheduler: announce the worker's OS process id and, for actor
/// workers, the actor this process hosts.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegisterWorker {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    /// Actor id bytes, absent for plain (stateless) workers.
    #[prost(bytes = "vec", optional, tag = "2")]
    pub actor_id: Option<Vec<u8>>,
}

/// Worker -> scheduler: submit a task for scheduling.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubmitTask {
    #[prost(message, optional, tag = "1")]
    pub spec: Option<TaskSpec>,
}

/// Scheduler -> worker: task assignment.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExecuteTask {
    #[prost(message, optional, tag = "1")]
    pub spec: Option<TaskSpec>,
}

/// Worker -> scheduler: ask for the lost object to be made available again.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReconstructObject {
    #[prost(bytes = "vec", tag = "1")]
    pub object_id: Vec<u8>,
}

/// Object store -> scheduler: an object became resident on this node.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ObjectSealed {
    #[prost(bytes = "vec", tag = "1")]
    pub object_id: Vec<u8>,
}

/// Object store -> scheduler: an object was evicted from this node.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ObjectEvicted {
    #[prost(bytes = "vec", tag = "1")]
    pub object_id: Vec<u8>,
}

/// Scheduler -> store manager: pull a remote copy of an object.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FetchObject {
    #[prost(bytes = "vec", tag = "1")]
    pub object_id: Vec<u8>,
}
