use super::{AssignmentError, AssignmentRegistry};
use chrono::Utc;
use std::{sync::Arc, time::Duration};
use tokio::{sync::broadcast, time::interval};
use tracing::{error, info, warn};

/// Periodically frees proxies whose claims outlived the stale-lock timeout.
///
/// A claim goes stale when a worker crashes without releasing its slot. The sweep clears
/// `in_use` in the store and drops the in-memory bindings backed by exactly those claims.
pub struct StaleLockSweeper {
    registry: Arc<AssignmentRegistry>,
    sweep_interval: Duration,
    stale_after: Duration,
}

/// Result of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub reclaimed_proxies: Vec<i64>,
    pub dropped_slots: Vec<u32>,
}

impl StaleLockSweeper {
    #[must_use]
    pub fn new(registry: Arc<AssignmentRegistry>) -> Self {
        let config = registry.config();
        let sweep_interval = config.sweep_interval();
        let stale_after = config.stale_lock_timeout();
        Self { registry, sweep_interval, stale_after }
    }

    #[must_use]
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Runs a single sweep.
    ///
    /// # Errors
    /// Propagates store failures.
    pub async fn sweep_once(&self) -> Result<SweepReport, AssignmentError> {
        let stale_after = chrono::Duration::from_std(self.stale_after)
            .unwrap_or_else(|_| chrono::Duration::seconds(1800));
        let cutoff = Utc::now() - stale_after;

        let reclaimed = self.registry.store().reclaim_stale(cutoff).await?;
        if reclaimed.is_empty() {
            return Ok(SweepReport::default());
        }

        let dropped_slots = self.registry.drop_bindings_for(&reclaimed);
        let reclaimed_proxies: Vec<i64> = reclaimed.iter().map(|claim| claim.id).collect();
        warn!(
            proxies = reclaimed_proxies.len(),
            slots = ?dropped_slots,
            "reclaimed stale proxy locks"
        );
        Ok(SweepReport { reclaimed_proxies, dropped_slots })
    }

    #[must_use]
    pub fn start_with_shutdown(
        self,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.sweep_interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep_once().await {
                            error!(error = %e, "stale lock sweep failed");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("stale lock sweeper shutting down");
                        break;
                    }
                }
            }
        })
    }
}
