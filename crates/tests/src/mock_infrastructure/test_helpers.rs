//! Test harness wiring a full runtime to the stub engine.

use super::{
    fakes::{RecordingHost, StubLauncher},
    stub_engine::{StubBehavior, StubEngine},
};
use routeslot_core::{
    config::{AppConfig, EngineConfig, SlotsConfig},
    engine::{EngineLauncher, HostNetwork},
    proxy::{MemoryProxyStore, NewProxy, ProxyProtocol, ProxyStore},
    runtime::RouteSlotRuntime,
};
use std::{path::PathBuf, sync::Arc};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// `count` untested SOCKS5 proxies on a documentation network.
#[must_use]
pub fn test_proxies(count: usize) -> Vec<NewProxy> {
    (1..=count)
        .map(|i| NewProxy::new(format!("198.51.100.{i}"), 1080, ProxyProtocol::Socks5).with_credentials("user", "pw"))
        .collect()
}

/// Configuration with three `OTHERS` slots and one `DEDICATED` slot, tuned for fast tests.
#[must_use]
pub fn test_config(engine: &StubEngine, workdir: &std::path::Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.slots = SlotsConfig { others: 3, dedicated: 1 };
    config.engine = EngineConfig {
        binary: PathBuf::from("/opt/engine/bin/mihomo"),
        config_dir: workdir.join("engine"),
        log_path: workdir.join("logs/engine.log"),
        controller_host: engine.host(),
        controller_port: engine.port(),
        interface_timeout_seconds: 2,
        api_timeout_seconds: 2,
        poll_interval_ms: 10,
        switch_attempts: 3,
        backoff_base_ms: 5,
        backoff_max_ms: 20,
        ..EngineConfig::default()
    };
    config
}

/// A runtime with an in-memory store, the stub engine, and a live provider server.
pub struct Harness {
    pub runtime: RouteSlotRuntime,
    pub store: Arc<MemoryProxyStore>,
    pub engine: Arc<StubEngine>,
    pub launcher: Arc<StubLauncher>,
    pub host: Arc<RecordingHost>,
    pub provider_url: String,
    pub workdir: TempDir,
}

impl Harness {
    pub async fn start(proxies: usize) -> Self {
        Self::build(proxies, StubBehavior::default(), RecordingHost::default(), |_| {}).await
    }

    pub async fn with_behavior(proxies: usize, behavior: StubBehavior) -> Self {
        Self::build(proxies, behavior, RecordingHost::default(), |_| {}).await
    }

    /// # Panics
    /// Panics if the runtime cannot be built.
    pub async fn build(
        proxies: usize,
        behavior: StubBehavior,
        host: RecordingHost,
        tweak: impl FnOnce(&mut AppConfig),
    ) -> Self {
        let workdir = tempfile::tempdir().expect("tempdir");
        let engine = Arc::new(StubEngine::start(behavior).await);
        let launcher = Arc::new(StubLauncher::new(Arc::clone(&engine)));
        let host = Arc::new(host);
        let store = Arc::new(MemoryProxyStore::with_proxies(test_proxies(proxies)));

        let mut config = test_config(&engine, workdir.path());
        tweak(&mut config);

        let provider_listener = TcpListener::bind("127.0.0.1:0").await.expect("bind provider");
        let provider_url = format!("http://{}", provider_listener.local_addr().expect("provider address"));

        let runtime = RouteSlotRuntime::builder()
            .with_config(config)
            .with_store(Arc::clone(&store) as Arc<dyn ProxyStore>)
            .with_launcher(Arc::clone(&launcher) as Arc<dyn EngineLauncher>)
            .with_host_network(Arc::clone(&host) as Arc<dyn HostNetwork>)
            .with_provider_base_url(provider_url.clone())
            .disable_sweeper()
            .build()
            .await
            .expect("runtime builds");
        let _provider_task = runtime.spawn_provider_server(provider_listener);

        Self { runtime, store, engine, launcher, host, provider_url, workdir }
    }

    /// Fetches a provider document over HTTP and returns the names it lists.
    ///
    /// # Panics
    /// Panics on transport or decode errors.
    pub async fn provider_members(&self, slot: u32) -> Vec<String> {
        let document: serde_json::Value = reqwest::get(format!("{}/provider/slot/{slot}", self.provider_url))
            .await
            .expect("provider reachable")
            .json()
            .await
            .expect("provider document is JSON");
        document["proxies"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|entry| entry["name"].as_str().map(str::to_string))
            .collect()
    }
}
