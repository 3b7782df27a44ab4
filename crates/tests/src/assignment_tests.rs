//! Allocation and binding behaviour observed through the runtime and the live provider
//! endpoint.

use crate::mock_infrastructure::{Harness, StubBehavior, RecordingHost};
use routeslot_core::{
    assignment::{AssignmentError, StaleLockSweeper},
    errors::ErrorKind,
    proxy::{ProxyStatus, ProxyStore, UsageOutcome},
};
use std::{collections::HashSet, sync::Arc, time::Duration};

#[tokio::test]
async fn test_concurrent_acquire_binds_each_proxy_once() {
    let harness = Harness::build(10, StubBehavior::default(), RecordingHost::default(), |config| {
        config.slots.others = 20;
        config.slots.dedicated = 0;
        config.assignment.claim_retries = 20;
    })
    .await;
    let registry = Arc::clone(harness.runtime.registry());

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.acquire(&format!("worker-{i}")).await })
        })
        .collect();

    let mut bound = Vec::new();
    let mut exhausted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(assignment) => bound.push(assignment),
            Err(e) => {
                assert_eq!(e.kind(), ErrorKind::Exhaustion, "unexpected error: {e}");
                exhausted += 1;
            }
        }
    }

    assert_eq!(bound.len(), 10);
    assert_eq!(exhausted, 10);

    let slots: HashSet<u32> = bound.iter().map(|a| a.slot).collect();
    let proxies: HashSet<i64> = bound.iter().map(|a| a.proxy_id).collect();
    assert_eq!(slots.len(), 10);
    assert_eq!(proxies.len(), 10);

    let summary = registry.pool_summary().await.unwrap();
    assert_eq!(summary.in_use, 10);

    // Failed acquisitions hand their slots back.
    assert_eq!(registry.allocator().stats().allocated, 10);
}

#[tokio::test]
async fn test_provider_document_follows_binding() {
    let harness = Harness::start(2).await;
    let registry = harness.runtime.registry();

    let assignment = registry.acquire("worker-a").await.unwrap();
    let slot = assignment.slot;
    assert_eq!(harness.provider_members(slot).await, vec![assignment.proxy_name.clone()]);

    registry.relinquish(slot, "worker-a", None).await.unwrap();
    assert_eq!(harness.provider_members(slot).await, vec![format!("placeholder-slot-{slot}")]);
}

#[tokio::test]
async fn test_released_slot_is_recycled_before_fresh_ones() {
    let harness = Harness::start(3).await;
    let registry = harness.runtime.registry();

    let first = registry.acquire("worker-a").await.unwrap();
    let second = registry.acquire("worker-b").await.unwrap();
    assert_ne!(first.slot, second.slot);

    registry.relinquish(first.slot, "worker-a", None).await.unwrap();
    let third = registry.acquire("worker-c").await.unwrap();
    assert_eq!(third.slot, first.slot);
    assert_ne!(third.proxy_id, first.proxy_id, "released proxy is cooling down");
}

#[tokio::test]
async fn test_release_is_idempotent() {
    let harness = Harness::start(1).await;
    let registry = harness.runtime.registry();

    let assignment = registry.acquire("worker-a").await.unwrap();
    let released = registry.relinquish(assignment.slot, "worker-a", Some(UsageOutcome::success(90))).await.unwrap();
    assert!(released.is_some());

    let again = registry.relinquish(assignment.slot, "worker-a", Some(UsageOutcome::success(90))).await.unwrap();
    assert!(again.is_none());

    let proxy = harness.store.get(assignment.proxy_id).await.unwrap().unwrap();
    assert_eq!(proxy.success_count, 1);
    assert_eq!(proxy.latency_ms, Some(90));
    assert!(proxy.health_quality.is_some());
}

#[tokio::test]
async fn test_cooldown_blocks_reuse() {
    let harness = Harness::start(1).await;
    let registry = harness.runtime.registry();

    let assignment = registry.acquire("worker-a").await.unwrap();
    registry.relinquish(assignment.slot, "worker-a", Some(UsageOutcome::success(40))).await.unwrap();

    let err = registry.acquire("worker-b").await.unwrap_err();
    assert!(matches!(err, AssignmentError::NoProxyAvailable { .. }));
    assert_eq!(registry.pool_summary().await.unwrap().cooling_down, 1);
}

#[tokio::test]
async fn test_quarantine_at_failure_threshold() {
    let harness = Harness::build(1, StubBehavior::default(), RecordingHost::default(), |config| {
        config.assignment.cooldown_seconds = 0;
        config.assignment.max_fail_before_quarantine = 3;
    })
    .await;
    let registry = harness.runtime.registry();

    for round in 1..=3u64 {
        let assignment = registry.acquire("worker-a").await.unwrap();
        let proxy = registry
            .relinquish(assignment.slot, "worker-a", Some(UsageOutcome::failure()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(proxy.fail_count, round);
        let expected = if round < 3 { ProxyStatus::Testing } else { ProxyStatus::Quarantine };
        assert_eq!(proxy.status, expected, "after {round} failures");
    }

    assert!(registry.acquire("worker-a").await.is_err());

    harness.store.reset_quarantine(1).await.unwrap();
    let assignment = registry.acquire("worker-a").await.unwrap();
    assert_eq!(assignment.proxy_id, 1);
}

#[tokio::test]
async fn test_stale_sweep_frees_abandoned_claim() {
    let harness = Harness::start(1).await;
    let registry = Arc::clone(harness.runtime.registry());

    let assignment = registry.acquire("crashed-worker").await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let report = StaleLockSweeper::new(Arc::clone(&registry))
        .with_stale_after(Duration::ZERO)
        .sweep_once()
        .await
        .unwrap();

    assert_eq!(report.reclaimed_proxies, vec![assignment.proxy_id]);
    assert_eq!(report.dropped_slots, vec![assignment.slot]);
    assert!(registry.lookup(assignment.slot).is_none());
    assert!(!harness.store.get(assignment.proxy_id).await.unwrap().unwrap().in_use);
    assert_eq!(
        harness.provider_members(assignment.slot).await,
        vec![format!("placeholder-slot-{}", assignment.slot)]
    );
}
