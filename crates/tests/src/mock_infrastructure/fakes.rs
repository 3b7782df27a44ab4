//! Fake process launcher and host network for supervisor tests.

use super::stub_engine::StubEngine;
use async_trait::async_trait;
use parking_lot::Mutex;
use routeslot_core::engine::{
    EngineHandle, EngineLauncher, ExitInfo, HostNetwork, InterfaceInfo, LaunchSpec, ProcessControl,
};
use std::{
    io,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::sync::watch;

/// "Launches" the engine by pointing the stub at the freshly generated configuration.
pub struct StubLauncher {
    engine: Arc<StubEngine>,
    launches: AtomicUsize,
    kills: Arc<AtomicUsize>,
    exits: Mutex<Vec<Arc<watch::Sender<Option<ExitInfo>>>>>,
    specs: Mutex<Vec<LaunchSpec>>,
}

impl StubLauncher {
    #[must_use]
    pub fn new(engine: Arc<StubEngine>) -> Self {
        Self {
            engine,
            launches: AtomicUsize::new(0),
            kills: Arc::new(AtomicUsize::new(0)),
            exits: Mutex::new(Vec::new()),
            specs: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn last_spec(&self) -> Option<LaunchSpec> {
        self.specs.lock().last().cloned()
    }

    /// Makes the most recent process exit as if it segfaulted.
    pub fn crash_latest(&self) {
        if let Some(exit_tx) = self.exits.lock().last() {
            let _ = exit_tx.send(Some(ExitInfo { code: Some(139), description: "signal: 11".to_string() }));
        }
    }
}

#[async_trait]
impl EngineLauncher for StubLauncher {
    fn resolve_binary(&self, binary: &Path) -> Option<PathBuf> {
        Some(binary.to_path_buf())
    }

    async fn launch(&self, spec: &LaunchSpec) -> io::Result<EngineHandle> {
        let pid = u32::try_from(self.launches.fetch_add(1, Ordering::SeqCst)).unwrap_or(0) + 7000;
        self.engine.load_config(&spec.config_dir.join(&spec.config_file)).await?;
        self.specs.lock().push(spec.clone());

        let (handle, ProcessControl { kill_rx, exit_tx }) = EngineHandle::channel(Some(pid));
        let exit_tx = Arc::new(exit_tx);

        let kills = Arc::clone(&self.kills);
        let on_kill = Arc::clone(&exit_tx);
        tokio::spawn(async move {
            if kill_rx.await.is_ok() {
                kills.fetch_add(1, Ordering::SeqCst);
                on_kill.send_if_modified(|exit| {
                    if exit.is_none() {
                        *exit = Some(ExitInfo { code: None, description: "signal: 15".to_string() });
                        true
                    } else {
                        false
                    }
                });
            }
        });

        self.exits.lock().push(exit_tx);
        Ok(handle)
    }
}

/// Host with a TUN interface that is always up. Records injected routes.
#[derive(Default)]
pub struct RecordingHost {
    routes: Mutex<Vec<String>>,
    fail_routes: bool,
}

impl RecordingHost {
    /// A host whose `ip route` calls always fail.
    #[must_use]
    pub fn without_route_permission() -> Self {
        Self { routes: Mutex::new(Vec::new()), fail_routes: true }
    }

    #[must_use]
    pub fn routes(&self) -> Vec<String> {
        self.routes.lock().clone()
    }
}

#[async_trait]
impl HostNetwork for RecordingHost {
    async fn find_interface(&self, _patterns: &[String]) -> io::Result<Option<InterfaceInfo>> {
        Ok(Some(InterfaceInfo { name: "routeslot0".to_string(), index: 31 }))
    }

    async fn add_route(&self, cidr: &str, interface: &str) -> io::Result<()> {
        if self.fail_routes {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "RTNETLINK answers: Operation not permitted"));
        }
        self.routes.lock().push(format!("{cidr} dev {interface}"));
        Ok(())
    }

    async fn remove_route(&self, cidr: &str, interface: &str) -> io::Result<()> {
        let route = format!("{cidr} dev {interface}");
        self.routes.lock().retain(|r| *r != route);
        Ok(())
    }
}
