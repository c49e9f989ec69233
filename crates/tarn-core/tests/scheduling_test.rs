// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! E2E tests for dependency staging through the full engine: worker socket
//! in, object-store notifications in, queue counters observed via the
//! engine handle.

mod common;

use common::TestContext;
use tarn_protocol::task::ResourceVector;

/// Submit with a missing input, publish the input, provide a worker.
#[tokio::test]
async fn test_single_dependency_staging() {
    skip_if_no_redis!();
    let mut ctx = TestContext::new(0).await.expect("test context");

    let input = ctx.unique_object("staging");
    let spec = ctx.spec_builder("staged").arg(input).finish();

    let mut worker = ctx.connect_worker().await;
    worker.submit_task(&spec).await.unwrap();
    ctx.wait_for(
        |s| s.waiting == 1 && s.dispatch == 0,
        "task to wait on its input",
    )
    .await;

    ctx.seal_object(input).await;
    ctx.wait_for(
        |s| s.waiting == 0 && s.dispatch == 1,
        "task to become dispatchable",
    )
    .await;

    let assigned = worker.get_task().await.unwrap();
    assert_eq!(assigned, spec);
    let snapshot = ctx
        .wait_for(|s| s.waiting == 0 && s.dispatch == 0, "queues to drain")
        .await;
    assert_eq!(snapshot.waiting + snapshot.dispatch, 0);
}

/// A dispatchable task is demoted when its input is evicted and promoted
/// again when the input returns; queue membership round-trips exactly.
#[tokio::test]
async fn test_eviction_demotes_dispatchable_task() {
    skip_if_no_redis!();
    let mut ctx = TestContext::new(0).await.expect("test context");

    let input = ctx.unique_object("evict");
    let spec = ctx.spec_builder("demoted").arg(input).finish();

    ctx.seal_object(input).await;
    ctx.wait_for(|s| s.local_objects == 1, "seal to land").await;

    let mut worker = ctx.connect_worker().await;
    worker.submit_task(&spec).await.unwrap();
    ctx.wait_for(|s| s.dispatch == 1, "task to be dispatchable")
        .await;

    ctx.evict_object(input).await;
    ctx.wait_for(
        |s| s.waiting == 1 && s.dispatch == 0,
        "eviction to demote the task",
    )
    .await;

    ctx.seal_object(input).await;
    ctx.wait_for(
        |s| s.waiting == 0 && s.dispatch == 1,
        "re-seal to promote the task",
    )
    .await;

    let assigned = worker.get_task().await.unwrap();
    assert_eq!(assigned, spec);
    ctx.wait_for(|s| s.waiting == 0 && s.dispatch == 0, "queues to drain")
        .await;
}

/// A task whose inputs never went missing dispatches immediately and a
/// looping worker drains several tasks in FIFO order.
#[tokio::test]
async fn test_fifo_drain_with_one_worker() {
    skip_if_no_redis!();
    let ctx = TestContext::new(0).await.expect("test context");

    let specs: Vec<_> = (0..3)
        .map(|i| ctx.spec_builder(&format!("fifo-{i}")).finish())
        .collect();

    let mut worker = ctx.connect_worker().await;
    for spec in &specs {
        worker.submit_task(spec).await.unwrap();
    }
    for spec in &specs {
        assert_eq!(worker.get_task().await.unwrap(), *spec);
    }

    let snapshot = ctx
        .wait_for(|s| s.waiting == 0 && s.dispatch == 0, "queues to drain")
        .await;
    assert_eq!(snapshot.waiting + snapshot.dispatch, 0);

    // Completing the last task restores the ledger to full capacity.
    worker.task_done().await.unwrap();
    ctx.wait_for(
        |s| s.available_resources == ResourceVector::new(4, 1),
        "ledger to return to capacity",
    )
    .await;
}
