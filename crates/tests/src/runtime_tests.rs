//! Full-stack runtime tests on the `SQLite` store.

use crate::mock_infrastructure::{test_config, test_proxies, RecordingHost, StubBehavior, StubEngine, StubLauncher};
use routeslot_core::{
    engine::{EngineLauncher, EngineState, HostNetwork},
    proxy::{ProxyStore, SqliteProxyStore},
    runtime::RouteSlotRuntime,
};
use std::{collections::HashSet, sync::Arc, time::Duration};
use tokio::{net::TcpListener, time::timeout};

async fn sqlite_store(proxies: usize) -> Arc<SqliteProxyStore> {
    let store = SqliteProxyStore::connect("sqlite::memory:", 1).await.unwrap();
    for proxy in test_proxies(proxies) {
        store.insert(&proxy).await.unwrap();
    }
    Arc::new(store)
}

#[tokio::test]
async fn test_sqlite_backed_startup_and_shutdown() {
    let workdir = tempfile::tempdir().unwrap();
    let engine = Arc::new(StubEngine::start(StubBehavior::default()).await);
    let launcher = Arc::new(StubLauncher::new(Arc::clone(&engine)));
    let host = Arc::new(RecordingHost::default());
    let store = sqlite_store(4).await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let provider_url = format!("http://{}", listener.local_addr().unwrap());

    let runtime = RouteSlotRuntime::builder()
        .with_config(test_config(&engine, workdir.path()))
        .with_store(Arc::clone(&store) as Arc<dyn ProxyStore>)
        .with_launcher(Arc::clone(&launcher) as Arc<dyn EngineLauncher>)
        .with_host_network(Arc::clone(&host) as Arc<dyn HostNetwork>)
        .with_provider_base_url(provider_url)
        .build()
        .await
        .unwrap();
    let provider_task = runtime.spawn_provider_server(listener);

    let report = runtime.supervisor().start().await.expect("engine starts");
    assert_eq!(report.target_proxy, report.current_proxy);

    let registry = Arc::clone(runtime.registry());
    let mut workers = Vec::new();
    for i in 0..3 {
        let registry = Arc::clone(&registry);
        workers.push(tokio::spawn(async move { registry.acquire(&format!("worker-{i}")).await }));
    }
    let mut proxies = HashSet::new();
    for worker in workers {
        let assignment = worker.await.unwrap().expect("proxy available");
        assert!(proxies.insert(assignment.proxy_id));
    }
    assert_eq!(store.summary(chrono::Utc::now()).await.unwrap().in_use, 3);

    let supervisor = Arc::clone(runtime.supervisor());
    timeout(Duration::from_secs(5), runtime.shutdown()).await.expect("shutdown completes");

    assert_eq!(supervisor.state(), EngineState::Stopped);
    assert_eq!(launcher.kills(), 1);
    timeout(Duration::from_secs(2), provider_task)
        .await
        .expect("provider server stops")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_quarantined_pool_fails_startup() {
    let workdir = tempfile::tempdir().unwrap();
    let engine = Arc::new(StubEngine::start(StubBehavior::default()).await);
    let launcher = Arc::new(StubLauncher::new(Arc::clone(&engine)));
    let store = SqliteProxyStore::connect("sqlite::memory:", 1).await.unwrap();
    for proxy in test_proxies(2) {
        store
            .insert(&proxy.with_status(routeslot_core::proxy::ProxyStatus::Quarantine))
            .await
            .unwrap();
    }

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let provider_url = format!("http://{}", listener.local_addr().unwrap());
    let runtime = RouteSlotRuntime::builder()
        .with_config(test_config(&engine, workdir.path()))
        .with_store(Arc::new(store))
        .with_launcher(Arc::clone(&launcher) as Arc<dyn EngineLauncher>)
        .with_host_network(Arc::new(RecordingHost::default()))
        .with_provider_base_url(provider_url)
        .disable_sweeper()
        .build()
        .await
        .unwrap();
    let _provider_task = runtime.spawn_provider_server(listener);

    let err = runtime.supervisor().start().await.unwrap_err();
    assert_eq!(err.kind(), routeslot_core::errors::ErrorKind::ValidationFailure);
    assert_eq!(runtime.supervisor().state(), EngineState::Stopped);
    assert_eq!(launcher.kills(), 1);

    runtime.shutdown().await;
}
