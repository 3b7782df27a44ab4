//! Lifecycle of the routing engine process.
//!
//! [`EngineSupervisor::start`] walks the startup sequence in order and only reports
//! `Running` once a live proxy has been switched into the smoke-test slot's group and the
//! engine confirmed the switch. Any failure before that tears the process and route down
//! again and surfaces one [`StartupFailure`].
//!
//! While running, a sync task follows the registry's binding changes and pushes each one
//! into the engine, so a slot's group tracks the proxy its worker holds.

use super::{
    config_gen::EngineConfigGenerator,
    control::{EngineControlClient, ProxyGroup},
    errors::{ControlApiError, EngineError, StartupFailure},
    host::{HostNetwork, InterfaceInfo},
    launcher::{EngineHandle, EngineLauncher, ExitInfo, LaunchSpec},
    state::{EngineProcess, EngineState, EngineStatus, SmokeReport},
};
use crate::{
    assignment::{AssignmentError, AssignmentRegistry, BindingChange},
    config::EngineConfig,
    errors::ErrorKind,
    provider::document::{is_placeholder_name, provider_name},
};
use parking_lot::RwLock;
use std::{future::Future, io, path::PathBuf, sync::Arc, time::Duration};
use tokio::{
    sync::{broadcast, broadcast::error::RecvError, watch, Mutex},
    task::JoinHandle,
    time::{sleep, Instant},
};
use tracing::{debug, error, info, trace, warn};

/// Worker id under which the smoke test holds its slot.
pub const SMOKE_TEST_WORKER: &str = "smoke-test";

const KILL_GRACE: Duration = Duration::from_secs(5);

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`, capped at `max`.
#[must_use]
pub fn backoff_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let factor = 1u32 << attempt.saturating_sub(1).min(16);
    base.saturating_mul(factor).min(max)
}

struct Shared {
    state: EngineState,
    process: Option<EngineProcess>,
    last_smoke_test: Option<SmokeReport>,
    last_failure: Option<String>,
    /// Bumped on every start so a stale exit watcher never touches a newer run.
    generation: u64,
}

pub struct EngineSupervisor {
    config: EngineConfig,
    provider_base_url: String,
    registry: Arc<AssignmentRegistry>,
    host: Arc<dyn HostNetwork>,
    launcher: Arc<dyn EngineLauncher>,
    control: EngineControlClient,
    http: reqwest::Client,
    shared: Arc<RwLock<Shared>>,
    handle: Mutex<Option<EngineHandle>>,
    binding_sync: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl EngineSupervisor {
    /// # Errors
    /// Returns [`EngineError::ControlApi`] if an HTTP client cannot be built.
    pub fn new(
        config: EngineConfig,
        provider_base_url: impl Into<String>,
        registry: Arc<AssignmentRegistry>,
        host: Arc<dyn HostNetwork>,
        launcher: Arc<dyn EngineLauncher>,
    ) -> Result<Self, EngineError> {
        let control = EngineControlClient::from_config(&config)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .no_proxy()
            .build()
            .map_err(|e| ControlApiError::Client(e.to_string()))?;

        Ok(Self {
            config,
            provider_base_url: provider_base_url.into().trim_end_matches('/').to_string(),
            registry,
            host,
            launcher,
            control,
            http,
            shared: Arc::new(RwLock::new(Shared {
                state: EngineState::Stopped,
                process: None,
                last_smoke_test: None,
                last_failure: None,
                generation: 0,
            })),
            handle: Mutex::new(None),
            binding_sync: parking_lot::Mutex::new(None),
        })
    }

    #[must_use]
    pub fn state(&self) -> EngineState {
        self.shared.read().state
    }

    #[must_use]
    pub fn status(&self) -> EngineStatus {
        let shared = self.shared.read();
        EngineStatus {
            state: shared.state,
            process: shared.process.clone(),
            last_smoke_test: shared.last_smoke_test.clone(),
            last_failure: shared.last_failure.clone(),
        }
    }

    #[must_use]
    pub fn control(&self) -> &EngineControlClient {
        &self.control
    }

    fn total_slots(&self) -> u32 {
        self.registry.allocator().total_slots()
    }

    fn set_state(&self, state: EngineState) {
        let mut shared = self.shared.write();
        debug!(from = %shared.state, to = %state, "engine state transition");
        shared.state = state;
    }

    fn update_process(&self, update: impl FnOnce(&mut EngineProcess)) {
        if let Some(process) = self.shared.write().process.as_mut() {
            update(process);
        }
    }

    /// Runs the full startup sequence.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidState`] unless the supervisor is `Stopped`
    /// - [`EngineError::Startup`] when any step fails; the supervisor is `Stopped` again
    pub async fn start(self: &Arc<Self>) -> Result<SmokeReport, EngineError> {
        let generation = {
            let mut shared = self.shared.write();
            if shared.state != EngineState::Stopped {
                return Err(EngineError::InvalidState(shared.state));
            }
            shared.state = EngineState::VerifyingPrereqs;
            shared.last_failure = None;
            shared.generation += 1;
            shared.generation
        };

        info!(
            binary = %self.config.binary.display(),
            slots = self.total_slots(),
            "starting routing engine"
        );

        match self.run_startup().await {
            Ok(report) => {
                let exit_rx = self.handle.lock().await.as_ref().map(EngineHandle::exit_watch);
                let changes = self.registry.subscribe();
                {
                    let mut shared = self.shared.write();
                    shared.state = EngineState::Running;
                    shared.last_smoke_test = Some(report.clone());
                    if let Some(process) = shared.process.as_mut() {
                        process.proxy_swaps += 1;
                    }
                }
                if let Some(exit_rx) = exit_rx {
                    self.watch_for_exit(generation, exit_rx);
                }
                self.spawn_binding_sync(generation, changes);

                info!(
                    group = %report.group,
                    proxy = %report.current_proxy,
                    duration_ms = report.duration_ms,
                    "routing engine running"
                );
                Ok(report)
            }
            Err(failure) => {
                error!(
                    step = %failure.step,
                    kind = %failure.kind,
                    cause = %failure.cause,
                    remediation = %failure.remediation,
                    "engine startup failed"
                );
                self.teardown().await;
                self.shared.write().last_failure = Some(failure.to_string());
                Err(failure.into())
            }
        }
    }

    /// Stops a running engine. Stopping a stopped supervisor is a no-op.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidState`] while startup or another stop is in progress.
    pub async fn stop(&self) -> Result<(), EngineError> {
        {
            let mut shared = self.shared.write();
            match shared.state {
                EngineState::Stopped => return Ok(()),
                EngineState::Running => shared.state = EngineState::Stopping,
                other => return Err(EngineError::InvalidState(other)),
            }
        }

        info!("stopping routing engine");
        self.teardown().await;
        info!("routing engine stopped");
        Ok(())
    }

    /// Switches the group of `slot` to the proxy named `proxy` and confirms the switch.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidSlot`] for slots outside the configured range
    /// - [`EngineError::NotRunning`] unless the engine is `Running`
    /// - [`EngineError::ControlApi`] or [`EngineError::SwitchUnconfirmed`] once retries run out
    pub async fn switch_slot_proxy(&self, slot: u32, proxy: &str) -> Result<(), EngineError> {
        if !self.registry.allocator().contains(slot) {
            return Err(EngineError::InvalidSlot(slot));
        }
        if self.state() != EngineState::Running {
            return Err(EngineError::NotRunning);
        }

        let group = provider_name(slot);
        self.with_backoff(|| self.control.refresh_provider(&group)).await?;
        self.switch_group(&group, proxy).await?;

        let swaps = {
            let mut shared = self.shared.write();
            shared.process.as_mut().map(|process| {
                process.proxy_swaps += 1;
                process.proxy_swaps
            })
        };
        info!(slot, proxy, swaps = ?swaps, "slot proxy switched");
        Ok(())
    }

    async fn run_startup(&self) -> Result<SmokeReport, StartupFailure> {
        let binary = self.verify_prereqs().await?;

        self.set_state(EngineState::GeneratingConfig);
        self.generate_config().await?;

        self.set_state(EngineState::Spawning);
        let exit_rx = self.spawn_engine(binary).await?;

        self.set_state(EngineState::WaitingForInterface);
        let interface = self.wait_for_interface(&exit_rx).await?;

        self.set_state(EngineState::InjectingRoute);
        self.inject_route(&interface).await;

        self.set_state(EngineState::WaitingForControlApi);
        self.wait_for_control_api(&exit_rx).await?;

        self.set_state(EngineState::SmokeTesting);
        self.smoke_test().await
    }

    async fn verify_prereqs(&self) -> Result<PathBuf, StartupFailure> {
        let step = EngineState::VerifyingPrereqs;

        let binary = self.launcher.resolve_binary(&self.config.binary).ok_or_else(|| {
            StartupFailure::new(
                step,
                ErrorKind::ExternalProcessFailure,
                format!("engine binary '{}' not found", self.config.binary.display()),
                "install the engine or set engine.binary to its absolute path",
            )
        })?;

        let status_url = format!("{}/status", self.provider_base_url);
        let provider_down = |cause: String| {
            StartupFailure::new(
                step,
                ErrorKind::ValidationFailure,
                cause,
                "start the provider server first and check server.provider_port",
            )
        };
        match self.http.get(&status_url).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                return Err(provider_down(format!(
                    "provider server answered HTTP {} at {status_url}",
                    response.status()
                )))
            }
            Err(e) => return Err(provider_down(format!("provider server unreachable at {status_url}: {e}"))),
        }

        self.registry.store().ping().await.map_err(|e| {
            StartupFailure::new(step, ErrorKind::StoreFailure, e.to_string(), "check store.database_url")
        })?;

        debug!(binary = %binary.display(), "engine prerequisites verified");
        Ok(binary)
    }

    async fn generate_config(&self) -> Result<(), StartupFailure> {
        let generator =
            EngineConfigGenerator::new(self.config.clone(), self.provider_base_url.clone(), self.total_slots());
        let failed = |e: io::Error| {
            StartupFailure::new(
                EngineState::GeneratingConfig,
                ErrorKind::ValidationFailure,
                format!("engine config at {}: {e}", self.config.config_path().display()),
                format!("make sure {} is writable", self.config.config_dir.display()),
            )
        };

        generator.discard_previous().await.map_err(&failed)?;
        generator.write().await.map_err(&failed)?;
        Ok(())
    }

    async fn spawn_engine(&self, binary: PathBuf) -> Result<watch::Receiver<Option<ExitInfo>>, StartupFailure> {
        let spec = LaunchSpec {
            binary,
            config_dir: self.config.config_dir.clone(),
            config_file: self.config.config_file.clone(),
            log_path: self.config.log_path.clone(),
            total_providers: u64::from(self.total_slots()),
            progress_every: self.config.progress_every,
            progress_interval: self.config.progress_interval(),
        };

        let handle = self.launcher.launch(&spec).await.map_err(|e| {
            StartupFailure::new(
                EngineState::Spawning,
                ErrorKind::ExternalProcessFailure,
                format!("failed to spawn {}: {e}", spec.binary.display()),
                "check that the engine binary is executable",
            )
        })?;

        let exit_rx = handle.exit_watch();
        self.shared.write().process = Some(EngineProcess::new(handle.pid()));
        *self.handle.lock().await = Some(handle);
        Ok(exit_rx)
    }

    fn ensure_alive(
        &self,
        step: EngineState,
        exit_rx: &watch::Receiver<Option<ExitInfo>>,
    ) -> Result<(), StartupFailure> {
        match exit_rx.borrow().as_ref() {
            Some(exit) => Err(StartupFailure::new(
                step,
                ErrorKind::ExternalProcessFailure,
                format!("engine exited during startup ({})", exit.description),
                format!("inspect the engine log at {}", self.config.log_path.display()),
            )),
            None => Ok(()),
        }
    }

    async fn wait_for_interface(
        &self,
        exit_rx: &watch::Receiver<Option<ExitInfo>>,
    ) -> Result<InterfaceInfo, StartupFailure> {
        let step = EngineState::WaitingForInterface;
        let deadline = Instant::now() + self.config.interface_timeout();

        loop {
            self.ensure_alive(step, exit_rx)?;

            match self.host.find_interface(&self.config.interface_patterns).await {
                Ok(Some(interface)) => {
                    info!(interface = %interface.name, index = interface.index, "TUN interface up");
                    self.update_process(|process| {
                        process.tun_name = Some(interface.name.clone());
                        process.tun_index = Some(interface.index);
                    });
                    return Ok(interface);
                }
                Ok(None) => {}
                Err(e) => trace!(error = %e, "interface listing failed"),
            }

            if Instant::now() >= deadline {
                return Err(StartupFailure::new(
                    step,
                    ErrorKind::ExternalProcessFailure,
                    format!(
                        "no interface matching {:?} appeared within {}s",
                        self.config.interface_patterns, self.config.interface_timeout_seconds
                    ),
                    "the engine needs CAP_NET_ADMIN to create its TUN device; check the engine log",
                ));
            }
            sleep(self.config.poll_interval()).await;
        }
    }

    async fn inject_route(&self, interface: &InterfaceInfo) {
        match self.host.add_route(&self.config.route_cidr, &interface.name).await {
            Ok(()) => {
                self.update_process(|process| process.route_injected = true);
                info!(cidr = %self.config.route_cidr, interface = %interface.name, "route injected");
            }
            Err(e) => warn!(
                cidr = %self.config.route_cidr,
                interface = %interface.name,
                error = %e,
                "route injection failed; continuing without it"
            ),
        }
    }

    async fn wait_for_control_api(
        &self,
        exit_rx: &watch::Receiver<Option<ExitInfo>>,
    ) -> Result<(), StartupFailure> {
        let step = EngineState::WaitingForControlApi;
        let deadline = Instant::now() + self.config.api_timeout();

        loop {
            self.ensure_alive(step, exit_rx)?;

            let error = match self.control.version().await {
                Ok(version) => {
                    info!(version = %version.version, "engine control API ready");
                    self.update_process(|process| process.version = Some(version.version));
                    return Ok(());
                }
                Err(e) => e,
            };
            trace!(error = %error, "control API not ready");

            if Instant::now() >= deadline {
                return Err(StartupFailure::new(
                    step,
                    ErrorKind::ControlApiFailure,
                    format!(
                        "control API at {} not ready within {}s: {error}",
                        self.control.base_url(),
                        self.config.api_timeout_seconds
                    ),
                    "check engine.controller_host, engine.controller_port and the engine log",
                ));
            }
            sleep(self.config.poll_interval()).await;
        }
    }

    /// Binds a proxy to the smoke-test slot, verifies the engine can switch to it and hands
    /// the slot back.
    ///
    /// The slot is reserved in the allocator for the whole test so no worker is handed it
    /// concurrently.
    async fn smoke_test(&self) -> Result<SmokeReport, StartupFailure> {
        let started = Instant::now();
        let slot = self.config.smoke_test_slot;

        self.registry.allocator().reserve(slot, SMOKE_TEST_WORKER).map_err(|e| {
            StartupFailure::new(
                EngineState::SmokeTesting,
                e.kind(),
                format!("smoke-test slot {slot} is unavailable: {e}"),
                format!("release slot {slot} or point engine.smoke_test_slot at a slot no worker holds"),
            )
        })?;

        let outcome = match self.registry.assign(slot, SMOKE_TEST_WORKER).await {
            Ok(assignment) => {
                let outcome = self.verify_slot(slot, &assignment.proxy_name, started).await;
                if let Err(e) = self.registry.relinquish(slot, SMOKE_TEST_WORKER, None).await {
                    warn!(slot, error = %e, "failed to release smoke-test slot");
                }
                outcome
            }
            Err(e) => {
                self.registry.allocator().release(slot);
                return Err(smoke_assign_failure(slot, &e));
            }
        };

        // The group still routes through the released proxy until the engine refetches it.
        if outcome.is_ok() {
            if let Err(e) = self.refresh_slot(slot).await {
                warn!(slot, error = %e, "failed to refresh smoke-test slot after release");
            }
        }
        outcome
    }

    async fn verify_slot(
        &self,
        slot: u32,
        expected: &str,
        started: Instant,
    ) -> Result<SmokeReport, StartupFailure> {
        let step = EngineState::SmokeTesting;
        let group_name = provider_name(slot);

        self.with_backoff(|| self.control.refresh_provider(&group_name))
            .await
            .map_err(|e| {
                StartupFailure::new(step, e.kind(), e.to_string(), "check the engine log for provider errors")
            })?;

        let group = self.with_backoff(|| self.control.group(&group_name)).await.map_err(|e| {
            StartupFailure::new(step, e.kind(), e.to_string(), "check the engine log for provider errors")
        })?;

        let real_members: Vec<&String> = group.all.iter().filter(|name| !is_placeholder_name(name)).collect();
        let Some(first_real) = real_members.first() else {
            return Err(StartupFailure::new(
                step,
                ErrorKind::ValidationFailure,
                format!(
                    "group '{group_name}' has no real proxy after a provider refresh (members: {:?})",
                    group.all
                ),
                format!("make sure the engine can reach the provider server at {}", self.provider_base_url),
            ));
        };

        let target = if group.all.iter().any(|name| name == expected) {
            expected.to_string()
        } else {
            first_real.to_string()
        };

        let confirmed = self.switch_group(&group_name, &target).await.map_err(|e| {
            StartupFailure::new(
                step,
                e.kind(),
                e.to_string(),
                "the engine accepted the provider but would not switch to it; check the engine log",
            )
        })?;

        Ok(SmokeReport {
            slot,
            group: group_name,
            group_type: confirmed.group_type,
            target_proxy: target,
            current_proxy: confirmed.now.unwrap_or_default(),
            real_members: real_members.len(),
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }

    /// Selects `target` in `group` and re-reads the group until it reports the target.
    async fn switch_group(&self, group: &str, target: &str) -> Result<ProxyGroup, EngineError> {
        let attempts = self.config.switch_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.control.select(group, target).await {
                Ok(()) => match self.control.group(group).await {
                    Ok(state) if state.now.as_deref() == Some(target) => {
                        debug!(group, target, attempt, "switch confirmed");
                        return Ok(state);
                    }
                    Ok(state) => {
                        last_error = Some(EngineError::SwitchUnconfirmed {
                            group: group.to_string(),
                            target: target.to_string(),
                            current: state.now.unwrap_or_else(|| "<none>".to_string()),
                        });
                    }
                    Err(e) => last_error = Some(e.into()),
                },
                Err(e) => last_error = Some(e.into()),
            }

            if attempt < attempts {
                let delay = backoff_delay(self.config.backoff_base(), self.config.backoff_max(), attempt);
                warn!(
                    group,
                    target,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "switch not confirmed; retrying"
                );
                sleep(delay).await;
            }
        }

        Err(last_error.unwrap_or_else(|| EngineError::SwitchUnconfirmed {
            group: group.to_string(),
            target: target.to_string(),
            current: "<none>".to_string(),
        }))
    }

    /// Makes the engine refetch the provider document of `slot`.
    async fn refresh_slot(&self, slot: u32) -> Result<(), ControlApiError> {
        let group = provider_name(slot);
        self.with_backoff(|| self.control.refresh_provider(&group)).await
    }

    /// Retries transient control API errors with capped exponential backoff.
    async fn with_backoff<T, F, Fut>(&self, mut op: F) -> Result<T, ControlApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ControlApiError>>,
    {
        let attempts = self.config.switch_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Err(e) if e.is_transient() && attempt < attempts => {
                    let delay = backoff_delay(self.config.backoff_base(), self.config.backoff_max(), attempt);
                    debug!(attempt, error = %e, "transient control API error; retrying");
                    sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn teardown(&self) {
        if let Some(sync) = self.binding_sync.lock().take() {
            sync.abort();
        }

        let handle = self.handle.lock().await.take();
        if let Some(mut handle) = handle {
            match handle.kill(KILL_GRACE).await {
                Some(exit) => debug!(exit = %exit.description, "engine process terminated"),
                None => warn!(pid = ?handle.pid(), "engine process did not exit within the grace period"),
            }
        }

        let routed_interface = {
            let shared = self.shared.read();
            shared.process.as_ref().filter(|p| p.route_injected).and_then(|p| p.tun_name.clone())
        };
        if let Some(interface) = routed_interface {
            if let Err(e) = self.host.remove_route(&self.config.route_cidr, &interface).await {
                debug!(interface = %interface, error = %e, "route removal failed");
            }
        }

        let mut shared = self.shared.write();
        shared.process = None;
        shared.state = EngineState::Stopped;
    }

    fn watch_for_exit(&self, generation: u64, mut exit_rx: watch::Receiver<Option<ExitInfo>>) {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let exit = exit_rx.wait_for(Option::is_some).await.ok().and_then(|exit| exit.clone());

            let mut shared = shared.write();
            if shared.generation != generation || shared.state != EngineState::Running {
                return;
            }
            let description = exit.map_or_else(|| "exit status unavailable".to_string(), |e| e.description);
            error!(exit = %description, "engine exited while running; supervisor stopped");
            shared.process = None;
            shared.state = EngineState::Stopped;
            shared.last_failure = Some(format!("engine exited while running: {description}"));
        });
    }

    fn spawn_binding_sync(self: &Arc<Self>, generation: u64, changes: broadcast::Receiver<BindingChange>) {
        let task = tokio::spawn(Arc::clone(self).sync_bindings(generation, changes));
        if let Some(previous) = self.binding_sync.lock().replace(task) {
            previous.abort();
        }
    }

    async fn sync_bindings(self: Arc<Self>, generation: u64, mut changes: broadcast::Receiver<BindingChange>) {
        loop {
            let change = match changes.recv().await {
                Ok(change) => change,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "binding changes lagged; re-pushing active bindings");
                    for assignment in self.registry.list_active() {
                        let name = assignment.proxy_name.as_str();
                        if !self.push_binding(generation, assignment.slot, Some(name)).await {
                            return;
                        }
                    }
                    continue;
                }
                Err(RecvError::Closed) => return,
            };
            if !self.push_binding(generation, change.slot, change.proxy_name.as_deref()).await {
                return;
            }
        }
    }

    /// Pushes one binding change into the engine. Returns `false` once the run that
    /// started the sync is over.
    async fn push_binding(&self, generation: u64, slot: u32, proxy: Option<&str>) -> bool {
        {
            let shared = self.shared.read();
            if shared.generation != generation || shared.state != EngineState::Running {
                return false;
            }
        }

        let result = match proxy {
            // Superseded by a later change that is still queued.
            Some(name) if self.registry.lookup(slot).is_none_or(|a| a.proxy_name != name) => return true,
            Some(name) => self.switch_slot_proxy(slot, name).await,
            None => self.refresh_slot(slot).await.map_err(EngineError::from),
        };
        match result {
            Ok(()) => debug!(slot, proxy = ?proxy, "binding pushed to engine"),
            Err(e) => warn!(slot, proxy = ?proxy, error = %e, "failed to push binding to engine"),
        }
        true
    }
}

fn smoke_assign_failure(slot: u32, error: &AssignmentError) -> StartupFailure {
    let (kind, remediation) = match error {
        AssignmentError::SlotBusy { .. } | AssignmentError::InvalidSlot(_) => (
            ErrorKind::ValidationFailure,
            format!("release slot {slot} or point engine.smoke_test_slot at a slot no worker holds"),
        ),
        AssignmentError::NoProxyAvailable { .. } => (
            ErrorKind::ValidationFailure,
            "import proxies with `routeslot-cli proxies import` or reset quarantined ones with `routeslot-cli proxies reset`"
                .to_string(),
        ),
        other => (other.kind(), "check store.database_url and the store logs".to_string()),
    };
    StartupFailure::new(
        EngineState::SmokeTesting,
        kind,
        format!("no proxy could be bound to smoke-test slot {slot}: {error}"),
        remediation,
    )
}
