// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for tarn-core E2E tests.
//!
//! Provides TestContext: a real engine on temp sockets, a mock object store
//! and store manager on the other side of the engine's connections, a real
//! Redis metadata store, and mock workers speaking the real protocol.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use uuid::Uuid;

use tarn_core::config::Config;
use tarn_core::engine::{Engine, EngineHandle, EngineSnapshot};
use tarn_core::gcs::{self, RedisStore};
use tarn_core::plasma::{self, ObjectManagerClient};
use tarn_core::server;
use tarn_protocol::frame::{read_frame, Frame, FramedStream, MessageType};
use tarn_protocol::messages::{FetchObject, ObjectEvicted, ObjectSealed};
use tarn_protocol::task::{ObjectId, ResourceVector, SpecBuilder};
use tarn_sdk::SchedulerConnection;

/// Helper macro to skip tests if TEST_REDIS_URL is not set.
///
/// Set it to the metadata store's `host:port`, e.g.
/// `TEST_REDIS_URL=127.0.0.1:6379`.
#[macro_export]
macro_rules! skip_if_no_redis {
    () => {
        if std::env::var("TEST_REDIS_URL").is_err() {
            eprintln!("Skipping test: TEST_REDIS_URL not set");
            return;
        }
    };
}

/// Test context that manages the engine, its collaborators, and clients.
pub struct TestContext {
    pub handle: EngineHandle,
    pub store: RedisStore,
    pub node_id: String,
    pub scheduler_socket: PathBuf,
    /// Unique identity for specs built in this test, so task ids never
    /// collide across runs against a shared Redis.
    driver: Uuid,
    /// Mock object store: frames written here arrive as engine
    /// notifications.
    store_stream: FramedStream<UnixStream>,
    /// Object ids of FetchObject requests the mock manager received.
    fetches: mpsc::UnboundedReceiver<ObjectId>,
    _dir: tempfile::TempDir,
}

impl TestContext {
    /// Stand up a full engine.
    ///
    /// 1. Redis connection from TEST_REDIS_URL
    /// 2. Mock object store + manager listeners on temp sockets
    /// 3. Engine with `num_workers` stock workers (real subprocesses)
    /// 4. Worker listener + task-table subscription, as in the daemon
    pub async fn new(num_workers: usize) -> Option<Self> {
        let redis_address = std::env::var("TEST_REDIS_URL").ok()?;

        let dir = tempfile::tempdir().ok()?;
        let scheduler_socket = dir.path().join("scheduler.sock");
        let store_socket = dir.path().join("store.sock");
        let manager_socket = dir.path().join("manager.sock");

        let store_listener = UnixListener::bind(&store_socket).ok()?;
        let manager_listener = UnixListener::bind(&manager_socket).ok()?;

        let worker_command = format!(
            "{} --local-scheduler-name={{local-scheduler-name}} --redis-address={{redis-address}}",
            env!("CARGO_BIN_EXE_tarn-worker")
        );
        let config = Config {
            node_ip_address: "127.0.0.1".to_string(),
            object_store_socket: store_socket.clone(),
            object_store_manager_socket: manager_socket.clone(),
            scheduler_socket: scheduler_socket.clone(),
            redis_address: redis_address.clone(),
            num_workers,
            static_resources: ResourceVector::new(4, 1),
            worker_command: Some(worker_command),
            kill_timeout: Duration::from_millis(500),
        };

        let redis_store = RedisStore::connect(&redis_address).await.ok()?;
        redis_store.ping().await.ok()?;

        let (tx, rx) = mpsc::channel(1024);

        // The engine connects to our mock store and manager.
        plasma::connect_store(&store_socket, tx.clone()).await.ok()?;
        let (store_side, _) = store_listener.accept().await.ok()?;
        let manager = ObjectManagerClient::connect(&manager_socket).await.ok()?;
        let (manager_side, _) = manager_listener.accept().await.ok()?;

        let listener = server::bind_scheduler_socket(&scheduler_socket).ok()?;
        tokio::spawn(server::run_listener(listener, tx.clone()));

        let engine = Engine::new(config, Arc::new(redis_store.clone()), manager, rx, tx.clone());
        let node_id = engine.node_id().to_string();
        tokio::spawn(gcs::subscribe_task_table(
            redis_address,
            node_id.clone(),
            tx.clone(),
        ));
        tokio::spawn(engine.run());

        // Collect fetch requests arriving at the mock manager.
        let (fetch_tx, fetches) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut stream = manager_side;
            loop {
                match read_frame(&mut stream).await {
                    Ok(frame) if frame.message_type == MessageType::FetchObject => {
                        let Ok(msg) = frame.decode::<FetchObject>() else {
                            continue;
                        };
                        let Ok(object_id) = ObjectId::from_slice(&msg.object_id) else {
                            continue;
                        };
                        if fetch_tx.send(object_id).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        });

        Some(Self {
            handle: EngineHandle::new(tx),
            store: redis_store,
            node_id,
            scheduler_socket,
            driver: Uuid::new_v4(),
            store_stream: FramedStream::new(store_side),
            fetches,
            _dir: dir,
        })
    }

    /// Builder for a spec unique to this test run.
    pub fn spec_builder(&self, function: &str) -> SpecBuilder {
        SpecBuilder::new(self.driver.as_bytes()).function(function.as_bytes())
    }

    /// An object id that no task in this test produces.
    pub fn unique_object(&self, tag: &str) -> ObjectId {
        self.spec_builder(&format!("external-input-{tag}"))
            .finish()
            .return_id(0)
            .expect("fresh spec has a valid id")
    }

    /// Announce an object as locally resident (mock store notification).
    pub async fn seal_object(&mut self, object_id: ObjectId) {
        let msg = ObjectSealed {
            object_id: object_id.as_bytes().to_vec(),
        };
        self.store_stream
            .write_frame(&Frame::new(MessageType::ObjectSealed, &msg).unwrap())
            .await
            .expect("mock store write");
    }

    /// Announce a local eviction (mock store notification).
    pub async fn evict_object(&mut self, object_id: ObjectId) {
        let msg = ObjectEvicted {
            object_id: object_id.as_bytes().to_vec(),
        };
        self.store_stream
            .write_frame(&Frame::new(MessageType::ObjectEvicted, &msg).unwrap())
            .await
            .expect("mock store write");
    }

    /// The next fetch request the mock manager received.
    pub async fn expect_fetch(&mut self) -> ObjectId {
        tokio::time::timeout(Duration::from_secs(5), self.fetches.recv())
            .await
            .expect("timed out waiting for a fetch request")
            .expect("mock manager closed")
    }

    /// Connect a mock worker and register it.
    pub async fn connect_worker(&self) -> SchedulerConnection {
        let mut conn = SchedulerConnection::connect(&self.scheduler_socket)
            .await
            .expect("connect mock worker");
        conn.register(std::process::id(), None)
            .await
            .expect("register mock worker");
        conn
    }

    pub async fn snapshot(&self) -> EngineSnapshot {
        self.handle.snapshot().await.expect("engine alive")
    }

    /// Poll the engine until `pred` holds, panicking after five seconds.
    pub async fn wait_for<F>(&self, pred: F, what: &str) -> EngineSnapshot
    where
        F: Fn(&EngineSnapshot) -> bool,
    {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let snapshot = self.snapshot().await;
            if pred(&snapshot) {
                return snapshot;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("timed out waiting for {what}; last snapshot: {snapshot:?}");
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}
