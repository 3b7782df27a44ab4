//! Runtime lifecycle: background tasks and graceful shutdown.

use crate::{
    assignment::{AssignmentRegistry, StaleLockSweeper},
    config::AppConfig,
    engine::EngineSupervisor,
    provider::ProviderServer,
};
use std::{
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::{net::TcpListener, sync::broadcast, task::JoinHandle};
use tracing::{debug, error, info, warn};

use super::{builder::RouteSlotRuntimeBuilder, RouteSlotComponents};

/// Owns the components and their background tasks.
///
/// `shutdown()` stops the engine, broadcasts the shutdown signal, and waits for the
/// sweeper to finish.
pub struct RouteSlotRuntime {
    components: RouteSlotComponents,
    shutdown_tx: broadcast::Sender<()>,
    config: AppConfig,
    sweeper_task: Option<JoinHandle<()>>,
    shutdown_initiated: Arc<AtomicBool>,
}

impl RouteSlotRuntime {
    #[must_use]
    pub fn builder() -> RouteSlotRuntimeBuilder {
        RouteSlotRuntimeBuilder::new()
    }

    pub(super) fn new(
        components: RouteSlotComponents,
        shutdown_tx: broadcast::Sender<()>,
        config: AppConfig,
        enable_sweeper: bool,
    ) -> Self {
        let sweeper_task = if enable_sweeper {
            let sweeper = StaleLockSweeper::new(Arc::clone(components.registry()));
            let handle = sweeper.start_with_shutdown(shutdown_tx.subscribe());
            debug!("Stale lock sweeper started");
            Some(handle)
        } else {
            None
        };

        Self {
            components,
            shutdown_tx,
            config,
            sweeper_task,
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn components(&self) -> &RouteSlotComponents {
        &self.components
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<AssignmentRegistry> {
        self.components.registry()
    }

    #[must_use]
    pub fn supervisor(&self) -> &Arc<EngineSupervisor> {
        self.components.supervisor()
    }

    #[must_use]
    pub fn provider_server(&self) -> &Arc<ProviderServer> {
        self.components.provider_server()
    }

    #[must_use]
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Serves the provider endpoint on `listener` until shutdown.
    #[must_use]
    pub fn spawn_provider_server(&self, listener: TcpListener) -> JoinHandle<io::Result<()>> {
        let server = Arc::clone(self.components.provider_server());
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            server
                .serve(listener, async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
        })
    }

    /// Stops the engine and every background task. Idempotent.
    pub async fn shutdown(self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Shutdown already initiated, ignoring duplicate call");
            return;
        }

        info!("Initiating RouteSlot runtime shutdown");
        if let Err(e) = self.components.supervisor().stop().await {
            warn!(error = %e, "Engine did not stop cleanly");
        }

        if let Err(e) = self.shutdown_tx.send(()) {
            debug!(error = %e, "No shutdown receivers left");
        }

        if let Some(sweeper_task) = self.sweeper_task {
            match sweeper_task.await {
                Ok(()) => debug!("Stale lock sweeper completed"),
                Err(e) if e.is_cancelled() => debug!("Stale lock sweeper cancelled"),
                Err(e) => error!(error = %e, "Stale lock sweeper failed"),
            }
        }

        info!("RouteSlot runtime shutdown complete");
    }

    /// Waits for a shutdown broadcast, then performs cleanup.
    pub async fn wait_for_shutdown(self) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let _ = shutdown_rx.recv().await;
        info!("Shutdown signal received, runtime terminating");
        self.shutdown().await;
    }
}

const _: () = {
    const fn assert_send<T: Send>() {}
    const fn assert_sync<T: Sync>() {}
    let _ = assert_send::<RouteSlotRuntime>;
    let _ = assert_sync::<RouteSlotRuntime>;
};
