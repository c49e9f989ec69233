// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Stock worker binary.
//!
//! The default process spawned by the scheduler's worker pool. It registers
//! with its PID and then loops on `get_task`; each request implicitly
//! reports the previous task as done. A user runtime embedding `tarn-sdk`
//! would execute the spec between assignments; this stock loop exists so a
//! pool is functional out of the box and so lifecycle tests have a real
//! subprocess to manage.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, info};

use tarn_sdk::{SchedulerConnection, SdkError};

/// Stock worker for the tarn per-node scheduler.
#[derive(Debug, Parser)]
#[command(name = "tarn-worker")]
struct Args {
    /// Path of the scheduler's worker socket.
    #[arg(long)]
    local_scheduler_name: PathBuf,

    /// IP address of this node (accepted for template compatibility).
    #[arg(long)]
    node_ip_address: Option<String>,

    /// Path of the object store socket (accepted for template compatibility).
    #[arg(long)]
    object_store_name: Option<PathBuf>,

    /// Path of the object store manager socket (accepted for template
    /// compatibility).
    #[arg(long)]
    object_store_manager_name: Option<PathBuf>,

    /// host:port of the metadata store (accepted for template compatibility).
    #[arg(long)]
    redis_address: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tarn_worker=info".parse().unwrap()),
        )
        .try_init()
        .ok();

    let pid = std::process::id();
    info!(pid, socket = %args.local_scheduler_name.display(), "Worker starting");

    let mut conn = SchedulerConnection::connect(&args.local_scheduler_name).await?;
    conn.register(pid, None).await?;

    loop {
        match conn.get_task().await {
            Ok(spec) => {
                // A user runtime would execute the function here; the stock
                // worker completes immediately on its next request.
                debug!(task = ?spec.task_id(), "Received assignment");
            }
            Err(SdkError::Terminated) => {
                info!(pid, "Terminate requested, exiting");
                break;
            }
            Err(SdkError::Frame(_)) => {
                info!(pid, "Scheduler connection closed, exiting");
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}
