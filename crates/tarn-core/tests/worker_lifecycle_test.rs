// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! E2E tests for the worker pool: spawn, register, kill, replace. These
//! spawn real `tarn-worker` subprocesses.

mod common;

use std::time::Duration;

use common::TestContext;

/// Start four workers, watch them register, kill one, spawn a replacement.
/// Mirrors the pool-count protocol: spawned (unregistered) and connected
/// counts trade off exactly at registration.
#[tokio::test]
async fn test_start_and_kill_workers() {
    skip_if_no_redis!();
    let ctx = TestContext::new(4).await.expect("test context");

    // All four children connect and register their PIDs.
    let snapshot = ctx
        .wait_for(
            |s| s.connected_workers == 4 && s.spawned_children == 0,
            "initial pool to register",
        )
        .await;
    assert!(snapshot.workers.iter().all(|w| w.pid.is_some()));

    // Killing a worker cleans up its state without spawning a replacement.
    let victim = snapshot.workers[0].id;
    assert!(ctx.handle.kill_worker(victim, false).await);
    ctx.wait_for(|s| s.connected_workers == 3, "killed worker to drop")
        .await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    let snapshot = ctx.snapshot().await;
    assert_eq!(snapshot.connected_workers, 3);
    assert_eq!(snapshot.spawned_children, 0);

    // An explicit start brings the pool back to four registered workers.
    assert!(ctx.handle.start_worker().await);
    ctx.wait_for(
        |s| s.connected_workers == 4 && s.spawned_children == 0,
        "replacement to register",
    )
    .await;
}

/// A graceful kill delivers a terminate message; the stock worker exits on
/// it without needing the SIGKILL escalation.
#[tokio::test]
async fn test_graceful_kill() {
    skip_if_no_redis!();
    let ctx = TestContext::new(1).await.expect("test context");

    let snapshot = ctx
        .wait_for(
            |s| s.connected_workers == 1 && s.spawned_children == 0,
            "worker to register",
        )
        .await;

    assert!(ctx.handle.kill_worker(snapshot.workers[0].id, true).await);
    ctx.wait_for(|s| s.connected_workers == 0, "worker to exit")
        .await;

    // No replacement: explicit kills shrink the pool target.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let snapshot = ctx.snapshot().await;
    assert_eq!(snapshot.connected_workers, 0);
    assert_eq!(snapshot.spawned_children, 0);
}

/// A worker that dies unexpectedly is replaced to keep the pool at target.
#[tokio::test]
async fn test_crashed_worker_is_replaced() {
    skip_if_no_redis!();
    let ctx = TestContext::new(1).await.expect("test context");

    let snapshot = ctx
        .wait_for(
            |s| s.connected_workers == 1 && s.spawned_children == 0,
            "worker to register",
        )
        .await;
    let pid = snapshot.workers[0].pid.expect("registered worker has a pid");

    // Kill the process behind the engine's back.
    let status = std::process::Command::new("kill")
        .args(["-9", &pid.to_string()])
        .status()
        .expect("kill command");
    assert!(status.success());

    // The engine notices the death and respawns up to the pool target.
    ctx.wait_for(
        |s| {
            s.connected_workers == 1
                && s.spawned_children == 0
                && s.workers.first().is_some_and(|w| w.pid != Some(pid))
        },
        "replacement worker to register",
    )
    .await;
}
