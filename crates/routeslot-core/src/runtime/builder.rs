//! Builder for the RouteSlot runtime.

use crate::{
    assignment::AssignmentRegistry,
    config::AppConfig,
    engine::{CommandLauncher, EngineError, EngineLauncher, EngineSupervisor, HostNetwork, LinuxHost},
    provider::ProviderServer,
    proxy::{ProxySelector, ProxyStore, SqliteProxyStore, StoreError},
    slots::SlotAllocator,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::{lifecycle::RouteSlotRuntime, RouteSlotComponents};

/// Errors that can occur during runtime initialization.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    #[error("Proxy store initialization failed: {0}")]
    Store(#[from] StoreError),

    #[error("Engine supervisor initialization failed: {0}")]
    Engine(#[from] EngineError),
}

#[derive(Clone)]
struct RuntimeOptions {
    enable_sweeper: bool,
    shutdown_channel_capacity: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self { enable_sweeper: true, shutdown_channel_capacity: 16 }
    }
}

/// Builder for constructing a [`RouteSlotRuntime`].
///
/// The proxy store, host network, and engine launcher default to `SQLite` at
/// `store.database_url`, [`LinuxHost`], and [`CommandLauncher`]; each can be replaced.
pub struct RouteSlotRuntimeBuilder {
    config: Option<AppConfig>,
    options: RuntimeOptions,
    store: Option<Arc<dyn ProxyStore>>,
    host: Option<Arc<dyn HostNetwork>>,
    launcher: Option<Arc<dyn EngineLauncher>>,
    provider_base_url: Option<String>,
}

impl RouteSlotRuntimeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: None,
            options: RuntimeOptions::default(),
            store: None,
            host: None,
            launcher: None,
            provider_base_url: None,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Uses `store` instead of opening `store.database_url`.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn ProxyStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn with_host_network(mut self, host: Arc<dyn HostNetwork>) -> Self {
        self.host = Some(host);
        self
    }

    #[must_use]
    pub fn with_launcher(mut self, launcher: Arc<dyn EngineLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Overrides the provider URL written into the engine config.
    ///
    /// Needed when the provider listener is bound to an ephemeral port.
    #[must_use]
    pub fn with_provider_base_url(mut self, url: impl Into<String>) -> Self {
        self.provider_base_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn disable_sweeper(mut self) -> Self {
        self.options.enable_sweeper = false;
        self
    }

    /// Sets custom shutdown channel capacity (default: 16).
    #[must_use]
    pub fn with_shutdown_channel_capacity(mut self, capacity: usize) -> Self {
        self.options.shutdown_channel_capacity = capacity;
        self
    }

    /// Builds the runtime and starts the stale-lock sweeper.
    ///
    /// The engine is not started; call [`EngineSupervisor::start`] once the provider
    /// listener is serving.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] if the configuration is missing or invalid, the store cannot
    /// be opened, or the supervisor cannot be constructed.
    pub async fn build(self) -> Result<RouteSlotRuntime, RuntimeError> {
        let config = self
            .config
            .ok_or_else(|| RuntimeError::ConfigValidation("No configuration provided".to_string()))?;

        config.validate().map_err(RuntimeError::ConfigValidation)?;

        info!(
            slots = config.slots.total(),
            others = config.slots.others,
            dedicated = config.slots.dedicated,
            sweeper_enabled = self.options.enable_sweeper,
            "Initializing RouteSlot runtime"
        );

        let (shutdown_tx, _) = broadcast::channel::<()>(self.options.shutdown_channel_capacity);

        let store = match self.store {
            Some(store) => store,
            None => {
                let store = SqliteProxyStore::connect(
                    &config.store.database_url,
                    config.store.max_connections,
                )
                .await?;
                Arc::new(store) as Arc<dyn ProxyStore>
            }
        };
        debug!("Proxy store initialized");

        let allocator = Arc::new(SlotAllocator::new(&config.slots));
        let selector = Arc::new(ProxySelector::new(Arc::clone(&store), config.selection.clone()));
        let registry = Arc::new(AssignmentRegistry::new(
            Arc::clone(&allocator),
            Arc::clone(&selector),
            Arc::clone(&store),
            config.assignment.clone(),
        ));
        debug!("Assignment registry initialized");

        let provider_server = Arc::new(ProviderServer::new(Arc::clone(&registry)));
        debug!("Provider server initialized");

        let provider_base_url = self.provider_base_url.unwrap_or_else(|| config.provider_base_url());
        let supervisor = Arc::new(EngineSupervisor::new(
            config.engine.clone(),
            provider_base_url,
            Arc::clone(&registry),
            self.host.unwrap_or_else(|| Arc::new(LinuxHost::new())),
            self.launcher.unwrap_or_else(|| Arc::new(CommandLauncher)),
        )?);
        debug!("Engine supervisor initialized");

        let components = RouteSlotComponents::new(
            store,
            allocator,
            selector,
            registry,
            provider_server,
            supervisor,
        );
        let runtime =
            RouteSlotRuntime::new(components, shutdown_tx, config, self.options.enable_sweeper);

        info!("RouteSlot runtime initialization complete");
        Ok(runtime)
    }
}

impl Default for RouteSlotRuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
