//! End-to-end supervisor tests against the stub engine.
//!
//! Each test builds a full runtime whose provider server is live on a loopback port. The
//! stub engine fetches provider documents from it, so a passing smoke test means a real
//! proxy travelled store → registry → provider document → engine group → selection.

use crate::mock_infrastructure::{Harness, RecordingHost, StubBehavior};
use routeslot_core::{
    engine::{EngineError, EngineState, EngineSupervisor},
    errors::ErrorKind,
    proxy::ProxyStore,
};
use std::time::Duration;
use tokio::time::{sleep, timeout};

fn proxy_id_of(name: &str) -> i64 {
    name.rsplit_once("-p").and_then(|(_, id)| id.parse().ok()).expect("proxy name carries an id")
}

fn proxy_swaps(supervisor: &EngineSupervisor) -> u64 {
    supervisor.status().process.map_or(0, |process| process.proxy_swaps)
}

async fn wait_for_swaps(supervisor: &EngineSupervisor, swaps: u64) {
    timeout(Duration::from_secs(2), async {
        while proxy_swaps(supervisor) < swaps {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("binding pushed to the engine");
    assert_eq!(proxy_swaps(supervisor), swaps);
}

fn startup_failure(err: EngineError) -> routeslot_core::engine::StartupFailure {
    match err {
        EngineError::Startup(failure) => failure,
        other => panic!("expected a startup failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_smoke_test_selects_real_proxy() {
    let harness = Harness::start(3).await;
    let supervisor = harness.runtime.supervisor();

    let report = supervisor.start().await.expect("engine starts");

    assert_eq!(supervisor.state(), EngineState::Running);
    assert_eq!(report.slot, 1);
    assert_eq!(report.group, "slot_1");
    assert_eq!(report.group_type, "Selector");
    assert_eq!(report.target_proxy, report.current_proxy);
    assert!(report.target_proxy.starts_with("slot1-p"));
    assert_eq!(report.real_members, 1);

    // Once the smoke-test slot is handed back the engine refetches it and falls back to
    // the placeholder.
    let group = harness.engine.group("slot_1").expect("group exists");
    assert_eq!(group.all, vec!["placeholder-slot-1".to_string()]);
    assert_eq!(group.now.as_deref(), Some("placeholder-slot-1"));
    assert!(harness.engine.refresh_count() >= 2);

    let status = supervisor.status();
    let process = status.process.expect("process recorded");
    assert_eq!(process.tun_name.as_deref(), Some("routeslot0"));
    assert_eq!(process.version.as_deref(), Some("stub-1.0.0"));
    assert!(process.route_injected);
    assert_eq!(process.proxy_swaps, 1);
    assert_eq!(status.last_smoke_test, Some(report.clone()));
    assert_eq!(harness.host.routes().len(), 1);

    let spec = harness.launcher.last_spec().expect("engine launched");
    assert_eq!(spec.total_providers, 4);
    assert!(spec.config_dir.join(&spec.config_file).exists());
}

#[tokio::test]
async fn test_smoke_test_slot_is_released_with_cooldown() {
    let harness = Harness::start(2).await;
    let report = harness.runtime.supervisor().start().await.expect("engine starts");

    assert!(harness.runtime.registry().lookup(1).is_none());
    assert_eq!(harness.provider_members(1).await, vec!["placeholder-slot-1".to_string()]);

    let proxy = harness
        .store
        .get(proxy_id_of(&report.target_proxy))
        .await
        .unwrap()
        .expect("smoke-test proxy exists");
    assert!(!proxy.in_use);
    assert!(proxy.cooldown_until.is_some());
    assert_eq!(proxy.success_count + proxy.fail_count, 0);
}

#[tokio::test]
async fn test_empty_pool_fails_startup_and_tears_down() {
    let harness = Harness::start(0).await;
    let supervisor = harness.runtime.supervisor();

    let err = supervisor.start().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailure);

    let failure = startup_failure(err);
    assert_eq!(failure.step, EngineState::SmokeTesting);
    assert!(failure.remediation.contains("proxies import"));

    let status = supervisor.status();
    assert_eq!(status.state, EngineState::Stopped);
    assert!(status.process.is_none());
    assert!(status.last_failure.is_some());
    assert_eq!(harness.launcher.launches(), 1);
    assert_eq!(harness.launcher.kills(), 1);
    assert!(harness.host.routes().is_empty());
}

#[tokio::test]
async fn test_group_with_only_placeholder_fails_validation() {
    let behavior = StubBehavior { ignore_refresh: true, ..StubBehavior::default() };
    let harness = Harness::with_behavior(2, behavior).await;
    let supervisor = harness.runtime.supervisor();

    let failure = startup_failure(supervisor.start().await.unwrap_err());
    assert_eq!(failure.kind, ErrorKind::ValidationFailure);
    assert_eq!(failure.step, EngineState::SmokeTesting);
    assert!(failure.cause.contains("placeholder-slot-1"));

    // The engine only ever saw the placeholder served at launch.
    let group = harness.engine.group("slot_1").expect("group exists");
    assert_eq!(group.all, vec!["placeholder-slot-1".to_string()]);

    assert_eq!(supervisor.state(), EngineState::Stopped);
    assert!(harness.runtime.registry().lookup(1).is_none());
    assert_eq!(harness.runtime.registry().pool_summary().await.unwrap().in_use, 0);
}

#[tokio::test]
async fn test_unconfirmed_switch_fails_after_retries() {
    let behavior = StubBehavior { freeze_selection: true, ..StubBehavior::default() };
    let harness = Harness::with_behavior(1, behavior).await;

    let failure = startup_failure(harness.runtime.supervisor().start().await.unwrap_err());
    assert_eq!(failure.kind, ErrorKind::ValidationFailure);
    assert!(failure.cause.contains("still reports"));
    assert_eq!(harness.engine.selection_count(), 3);
    assert_eq!(harness.runtime.supervisor().state(), EngineState::Stopped);
}

#[tokio::test]
async fn test_route_injection_failure_is_tolerated() {
    let harness =
        Harness::build(1, StubBehavior::default(), RecordingHost::without_route_permission(), |_| {}).await;
    let supervisor = harness.runtime.supervisor();

    supervisor.start().await.expect("engine starts without the route");

    let process = supervisor.status().process.expect("process recorded");
    assert!(!process.route_injected);
    assert!(harness.host.routes().is_empty());
}

#[tokio::test]
async fn test_start_while_running_is_rejected() {
    let harness = Harness::start(2).await;
    let supervisor = harness.runtime.supervisor();
    supervisor.start().await.expect("engine starts");

    let err = supervisor.start().await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(EngineState::Running)));
    assert_eq!(harness.launcher.launches(), 1);
}

#[tokio::test]
async fn test_crash_returns_to_stopped_and_restart_works() {
    let harness = Harness::start(3).await;
    let supervisor = harness.runtime.supervisor();
    supervisor.start().await.expect("engine starts");

    harness.launcher.crash_latest();

    timeout(Duration::from_secs(2), async {
        while supervisor.state() != EngineState::Stopped {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("crash detected");

    let status = supervisor.status();
    assert!(status.process.is_none());
    assert!(status.last_failure.unwrap().contains("signal: 11"));

    supervisor.start().await.expect("engine restarts");
    assert_eq!(supervisor.state(), EngineState::Running);
    assert_eq!(harness.launcher.launches(), 2);
}

#[tokio::test]
async fn test_switch_slot_proxy_to_bound_proxy() {
    let harness = Harness::start(3).await;
    let supervisor = harness.runtime.supervisor();
    supervisor.start().await.expect("engine starts");

    let assignment = harness.runtime.registry().assign(2, "worker-a").await.expect("slot 2 bound");
    wait_for_swaps(supervisor, 2).await;

    supervisor.switch_slot_proxy(2, &assignment.proxy_name).await.expect("switch confirmed");

    let group = harness.engine.group("slot_2").expect("group exists");
    assert_eq!(group.all, vec![assignment.proxy_name.clone()]);
    assert_eq!(group.now.as_deref(), Some(assignment.proxy_name.as_str()));
    assert_eq!(proxy_swaps(supervisor), 3);
}

#[tokio::test]
async fn test_engine_group_follows_allocation() {
    let harness = Harness::start(3).await;
    let supervisor = harness.runtime.supervisor();
    let registry = harness.runtime.registry();
    supervisor.start().await.expect("engine starts");

    let assignment = registry.acquire("worker-a").await.expect("slot allocated");
    assert_eq!(assignment.slot, 1, "smoke-test reservation is freed once running");

    let expected = Some(assignment.proxy_name.clone());
    timeout(Duration::from_secs(2), async {
        while harness.engine.group("slot_1").and_then(|group| group.now) != expected {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("engine group follows the binding");
    wait_for_swaps(supervisor, 2).await;

    registry.relinquish(1, "worker-a", None).await.expect("slot released");
    timeout(Duration::from_secs(2), async {
        while harness.engine.group("slot_1").map(|group| group.all)
            != Some(vec!["placeholder-slot-1".to_string()])
        {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("engine group falls back to the placeholder");
    assert_eq!(proxy_swaps(supervisor), 2);
}

#[tokio::test]
async fn test_smoke_test_slot_held_by_worker_fails_startup() {
    let harness = Harness::start(3).await;
    let registry = harness.runtime.registry();
    let held = registry.acquire("worker-a").await.expect("slot allocated");
    assert_eq!(held.slot, 1);

    let failure = startup_failure(harness.runtime.supervisor().start().await.unwrap_err());
    assert_eq!(failure.step, EngineState::SmokeTesting);
    assert!(failure.remediation.contains("engine.smoke_test_slot"), "{}", failure.remediation);

    assert_eq!(registry.lookup(1).expect("binding kept").worker_id, "worker-a");
    assert_eq!(registry.allocator().holder(1).as_deref(), Some("worker-a"));
}

#[tokio::test]
async fn test_switch_to_unknown_member_fails() {
    let harness = Harness::start(2).await;
    let supervisor = harness.runtime.supervisor();
    supervisor.start().await.expect("engine starts");

    let err = supervisor.switch_slot_proxy(3, "slot3-p999").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ControlApiFailure);

    let err = supervisor.switch_slot_proxy(9, "slot9-p1").await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidSlot(9)));
}

#[tokio::test]
async fn test_runtime_shutdown_stops_engine() {
    let harness = Harness::start(2).await;
    harness.runtime.supervisor().start().await.expect("engine starts");
    assert_eq!(harness.host.routes().len(), 1);

    let Harness { runtime, launcher, host, .. } = harness;
    let supervisor = std::sync::Arc::clone(runtime.supervisor());

    timeout(Duration::from_secs(5), runtime.shutdown()).await.expect("shutdown completes");

    assert_eq!(supervisor.state(), EngineState::Stopped);
    assert_eq!(launcher.kills(), 1);
    assert!(host.routes().is_empty());
}
