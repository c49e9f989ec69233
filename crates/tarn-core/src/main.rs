// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tarn Core - per-node scheduler daemon
//!
//! The daemon binds the worker socket, connects to the metadata store and
//! the local object store, spawns the configured worker pool, and runs the
//! scheduling engine until interrupted.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{error, info};

use tarn_core::config::Config;
use tarn_core::engine::{Engine, EngineHandle};
use tarn_core::gcs::{self, RedisStore};
use tarn_core::plasma::{self, ObjectManagerClient};
use tarn_core::server;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tarn_core=info".parse().unwrap()),
        )
        .init();

    info!("Starting tarn scheduler");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        node = %config.node_ip_address,
        socket = %config.scheduler_socket.display(),
        redis = %config.redis_address,
        workers = config.num_workers,
        resources = %config.static_resources,
        "Configuration loaded"
    );

    // Connect to the metadata store and verify it answers
    let store = RedisStore::connect(&config.redis_address).await?;
    store.ping().await?;
    info!("Metadata store connection established");

    // Bind the worker socket before anything can try to connect
    let listener = server::bind_scheduler_socket(&config.scheduler_socket)?;

    let (tx, rx) = mpsc::channel(1024);

    // Object store: notifications in, fetches out
    plasma::connect_store(&config.object_store_socket, tx.clone()).await?;
    let manager = ObjectManagerClient::connect(&config.object_store_manager_socket).await?;

    let engine = Engine::new(config.clone(), Arc::new(store), manager, rx, tx.clone());
    let node_id = engine.node_id().to_string();

    // Task-table notifications for tasks handed to this node
    tokio::spawn(gcs::subscribe_task_table(
        config.redis_address.clone(),
        node_id,
        tx.clone(),
    ));

    // Worker connections
    tokio::spawn(server::run_listener(listener, tx.clone()));

    let handle = EngineHandle::new(tx);
    let engine_task = tokio::spawn(engine.run());

    info!("Scheduler initialized successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    handle.shutdown().await;
    engine_task.await?;

    info!("Shutdown complete");
    Ok(())
}
