// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use tarn_protocol::task::ResourceVector;

/// Scheduler engine configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// IP address advertised to the cluster
    pub node_ip_address: String,
    /// Unix socket of the local object store (notifications)
    pub object_store_socket: PathBuf,
    /// Unix socket of the object store manager (remote fetches)
    pub object_store_manager_socket: PathBuf,
    /// Unix socket the engine binds for worker connections
    pub scheduler_socket: PathBuf,
    /// host:port of the metadata store
    pub redis_address: String,
    /// Initial worker pool size
    pub num_workers: usize,
    /// Static resource capacity of this node
    pub static_resources: ResourceVector,
    /// Template command line used to spawn a worker
    pub worker_command: Option<String>,
    /// How long a graceful kill waits before escalating to SIGKILL
    pub kill_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `TARN_NODE_IP_ADDRESS`: IP advertised to the cluster
    /// - `TARN_OBJECT_STORE_SOCKET`: object store notification socket path
    /// - `TARN_OBJECT_STORE_MANAGER_SOCKET`: object store manager socket path
    /// - `TARN_SCHEDULER_SOCKET`: path at which the engine binds its worker socket
    /// - `TARN_WORKER_COMMAND`: worker command template (iff `TARN_NUM_WORKERS` > 0)
    ///
    /// Optional (with defaults):
    /// - `TARN_REDIS_ADDRESS`: metadata store host:port (default: 127.0.0.1:6379)
    /// - `TARN_NUM_WORKERS`: initial pool size (default: 0)
    /// - `TARN_NUM_CPUS`: CPU capacity (default: available parallelism)
    /// - `TARN_NUM_GPUS`: GPU capacity (default: 0)
    /// - `TARN_KILL_TIMEOUT_MS`: graceful kill timeout (default: 2000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let node_ip_address = required("TARN_NODE_IP_ADDRESS")?;
        let object_store_socket = PathBuf::from(required("TARN_OBJECT_STORE_SOCKET")?);
        let object_store_manager_socket =
            PathBuf::from(required("TARN_OBJECT_STORE_MANAGER_SOCKET")?);
        let scheduler_socket = PathBuf::from(required("TARN_SCHEDULER_SOCKET")?);

        let redis_address =
            std::env::var("TARN_REDIS_ADDRESS").unwrap_or_else(|_| "127.0.0.1:6379".to_string());

        let num_workers: usize = std::env::var("TARN_NUM_WORKERS")
            .unwrap_or_else(|_| "0".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("TARN_NUM_WORKERS", "must be an integer"))?;

        let default_cpus = std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1);
        let num_cpus: u32 = std::env::var("TARN_NUM_CPUS")
            .map(|v| {
                v.parse()
                    .map_err(|_| ConfigError::Invalid("TARN_NUM_CPUS", "must be an integer"))
            })
            .unwrap_or(Ok(default_cpus))?;
        let num_gpus: u32 = std::env::var("TARN_NUM_GPUS")
            .map(|v| {
                v.parse()
                    .map_err(|_| ConfigError::Invalid("TARN_NUM_GPUS", "must be an integer"))
            })
            .unwrap_or(Ok(0))?;

        let worker_command = std::env::var("TARN_WORKER_COMMAND").ok();
        if num_workers > 0 && worker_command.is_none() {
            return Err(ConfigError::Invalid(
                "TARN_WORKER_COMMAND",
                "required when TARN_NUM_WORKERS > 0",
            ));
        }

        let kill_timeout_ms: u64 = std::env::var("TARN_KILL_TIMEOUT_MS")
            .unwrap_or_else(|_| "2000".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("TARN_KILL_TIMEOUT_MS", "must be an integer"))?;

        Ok(Self {
            node_ip_address,
            object_store_socket,
            object_store_manager_socket,
            scheduler_socket,
            redis_address,
            num_workers,
            static_resources: ResourceVector::new(num_cpus, num_gpus),
            worker_command,
            kill_timeout: Duration::from_millis(kill_timeout_ms),
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::Missing(name))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
