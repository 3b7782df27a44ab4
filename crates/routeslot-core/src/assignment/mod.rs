//! Slot ↔ proxy bindings.
//!
//! The registry keeps one in-memory entry per slot and delegates proxy ownership to the
//! store's conditional claim. A slot entry passes through two states:
//!
//! ```text
//! (vacant) ──assign──► Claiming{worker} ──claim won──► Bound(Assignment)
//!                           │                               │
//!                           └──no proxy / error──► (vacant) ◄──release / stale sweep
//! ```
//!
//! The `Claiming` marker is inserted synchronously through the `DashMap` entry API, so
//! two callers racing for the same slot never both reach the store. Proxy-level races are
//! settled by [`ProxyStore::try_claim`]; the loser excludes that proxy and selects again.
//!
//! Every claim carries a unique epoch (its `in_use_since`). Releases and stale sweeps act
//! only on the claim they name, so a proxy reclaimed and re-bound in between is untouched.
//! Committed and ended bindings are announced on a broadcast channel; see
//! [`AssignmentRegistry::subscribe`].

pub mod sweeper;

use crate::{
    config::{AssignmentConfig, HealthThresholds},
    provider::document::{proxy_name, render_proxy_document},
    proxy::{
        health_from_latency, PoolSummary, Proxy, ProxySelector, ProxyStore, ReleaseUpdate,
        SelectOptions, StaleClaim, StoreError, UsageOutcome,
    },
    slots::{SlotAllocator, SlotError},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use serde::Serialize;
use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const CHANGES_CAPACITY: usize = 256;

pub use sweeper::StaleLockSweeper;

/// Errors returned by [`AssignmentRegistry`].
#[derive(Debug, Error)]
pub enum AssignmentError {
    #[error("slot {0} is outside the configured slot range")]
    InvalidSlot(u32),

    #[error("slot {slot} is held by worker '{holder}'")]
    SlotBusy { slot: u32, holder: String },

    #[error("no proxy available for slot {slot} after {attempts} attempt(s); add proxies or wait for cooldowns to expire")]
    NoProxyAvailable { slot: u32, attempts: u32 },

    #[error(transparent)]
    Slot(#[from] SlotError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A live slot ↔ proxy binding.
#[derive(Debug, Clone, Serialize)]
pub struct Assignment {
    pub slot: u32,
    pub proxy_id: i64,
    pub worker_id: String,
    pub assigned_at: DateTime<Utc>,
    /// Epoch of the store claim backing this binding.
    pub claimed_at: DateTime<Utc>,
    /// Name of the proxy inside the engine's selector group.
    pub proxy_name: String,
    pub proxy_endpoint: String,
    /// Provider document served for this slot while the binding lives.
    #[serde(skip)]
    pub document: Bytes,
}

/// A binding was committed (`proxy_name` set) or ended (`None`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingChange {
    pub slot: u32,
    pub proxy_name: Option<String>,
}

#[derive(Debug, Clone)]
enum SlotBinding {
    Claiming { worker_id: String },
    Bound(Arc<Assignment>),
}

impl SlotBinding {
    fn worker_id(&self) -> &str {
        match self {
            Self::Claiming { worker_id } => worker_id,
            Self::Bound(assignment) => &assignment.worker_id,
        }
    }
}

/// Removes a `Claiming` marker unless the claim was committed.
///
/// Covers early returns and cancellation of the `assign` future.
struct ClaimGuard<'a> {
    bindings: &'a DashMap<u32, SlotBinding>,
    slot: u32,
    committed: bool,
}

impl ClaimGuard<'_> {
    fn commit(mut self, assignment: Arc<Assignment>) {
        self.bindings.insert(self.slot, SlotBinding::Bound(assignment));
        self.committed = true;
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.bindings
                .remove_if(&self.slot, |_, binding| matches!(binding, SlotBinding::Claiming { .. }));
        }
    }
}

/// Binds proxies to slots and tracks the live bindings.
pub struct AssignmentRegistry {
    bindings: DashMap<u32, SlotBinding>,
    allocator: Arc<SlotAllocator>,
    selector: Arc<ProxySelector>,
    store: Arc<dyn ProxyStore>,
    config: AssignmentConfig,
    health: HealthThresholds,
    /// Last issued claim epoch, in Unix milliseconds.
    claim_clock: AtomicI64,
    changes: broadcast::Sender<BindingChange>,
}

impl AssignmentRegistry {
    #[must_use]
    pub fn new(
        allocator: Arc<SlotAllocator>,
        selector: Arc<ProxySelector>,
        store: Arc<dyn ProxyStore>,
        config: AssignmentConfig,
    ) -> Self {
        let health = selector.config().health;
        let (changes, _) = broadcast::channel(CHANGES_CAPACITY);
        Self {
            bindings: DashMap::new(),
            allocator,
            selector,
            store,
            config,
            health,
            claim_clock: AtomicI64::new(0),
            changes,
        }
    }

    /// Receives every committed and ended binding from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BindingChange> {
        self.changes.subscribe()
    }

    fn announce(&self, slot: u32, proxy_name: Option<String>) {
        // no receivers while the engine is down
        let _ = self.changes.send(BindingChange { slot, proxy_name });
    }

    /// Millisecond timestamp strictly greater than any previously issued one.
    fn next_claim_epoch(&self) -> DateTime<Utc> {
        let now = Utc::now();
        let mut last = self.claim_clock.load(Ordering::Acquire);
        loop {
            let next = now.timestamp_millis().max(last + 1);
            match self.claim_clock.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return DateTime::from_timestamp_millis(next).unwrap_or(now),
                Err(current) => last = current,
            }
        }
    }

    #[must_use]
    pub fn allocator(&self) -> &Arc<SlotAllocator> {
        &self.allocator
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn ProxyStore> {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> &AssignmentConfig {
        &self.config
    }

    /// Binds the best available proxy to `slot` for `worker_id`.
    ///
    /// Re-assigning a slot the same worker already holds returns the existing binding.
    ///
    /// # Errors
    ///
    /// - [`AssignmentError::InvalidSlot`] for ids outside the slot namespace
    /// - [`AssignmentError::SlotBusy`] when another worker holds or is claiming the slot
    /// - [`AssignmentError::NoProxyAvailable`] when the pool is exhausted or every claim
    ///   attempt lost its race
    /// - [`AssignmentError::Store`] on store failures
    pub async fn assign(&self, slot: u32, worker_id: &str) -> Result<Arc<Assignment>, AssignmentError> {
        if !self.allocator.contains(slot) {
            return Err(AssignmentError::InvalidSlot(slot));
        }

        match self.bindings.entry(slot) {
            Entry::Occupied(occupied) => {
                return match occupied.get() {
                    SlotBinding::Bound(existing) if existing.worker_id == worker_id => {
                        debug!(slot, worker_id, "slot already bound to worker");
                        Ok(Arc::clone(existing))
                    }
                    other => Err(AssignmentError::SlotBusy {
                        slot,
                        holder: other.worker_id().to_string(),
                    }),
                };
            }
            Entry::Vacant(vacant) => {
                vacant.insert(SlotBinding::Claiming { worker_id: worker_id.to_string() });
            }
        }

        let guard = ClaimGuard { bindings: &self.bindings, slot, committed: false };
        let (proxy, claimed_at) = self.claim_proxy(slot).await?;

        let assignment = Arc::new(Assignment {
            slot,
            proxy_id: proxy.id,
            worker_id: worker_id.to_string(),
            assigned_at: Utc::now(),
            claimed_at,
            proxy_name: proxy_name(slot, proxy.id),
            proxy_endpoint: proxy.endpoint(),
            document: render_proxy_document(slot, &proxy),
        });
        guard.commit(Arc::clone(&assignment));
        self.announce(slot, Some(assignment.proxy_name.clone()));

        info!(slot, worker_id, proxy_id = proxy.id, endpoint = %assignment.proxy_endpoint, "proxy assigned");
        Ok(assignment)
    }

    async fn claim_proxy(&self, slot: u32) -> Result<(Proxy, DateTime<Utc>), AssignmentError> {
        let mut options = SelectOptions {
            exclude_ids: Vec::new(),
            prefer_high_quality: self.config.prefer_high_quality,
        };

        for attempt in 1..=self.config.claim_retries {
            let Some(candidate) = self.selector.select_best(&options).await? else {
                return Err(AssignmentError::NoProxyAvailable { slot, attempts: attempt });
            };

            let epoch = self.next_claim_epoch();
            if self.store.try_claim(candidate.proxy.id, epoch).await? {
                return Ok((candidate.proxy, epoch));
            }

            debug!(slot, proxy_id = candidate.proxy.id, attempt, "lost claim race, reselecting");
            options.exclude_ids.push(candidate.proxy.id);
        }

        warn!(slot, attempts = self.config.claim_retries, "claim retries exhausted");
        Err(AssignmentError::NoProxyAvailable { slot, attempts: self.config.claim_retries })
    }

    /// Ends the binding of `slot` held by `worker_id`.
    ///
    /// The proxy enters cooldown. When `outcome` is supplied its counters are updated and
    /// health is recomputed from the reported latency; reaching the failure threshold
    /// quarantines the proxy. Releasing an unbound slot, or a slot bound to another worker,
    /// is logged and ignored, as is a release whose claim the stale-lock sweep already
    /// reclaimed.
    ///
    /// # Errors
    ///
    /// Returns [`AssignmentError::Store`] if the store update fails. The in-memory binding
    /// is already gone by then; the stale-lock sweep frees the proxy later.
    pub async fn release(
        &self,
        slot: u32,
        worker_id: &str,
        outcome: Option<UsageOutcome>,
    ) -> Result<Option<Proxy>, AssignmentError> {
        let removed = self.bindings.remove_if(&slot, |_, binding| {
            matches!(binding, SlotBinding::Bound(a) if a.worker_id == worker_id)
        });

        let Some((_, SlotBinding::Bound(assignment))) = removed else {
            match self.bindings.get(&slot) {
                Some(binding) => warn!(
                    slot,
                    worker_id,
                    holder = binding.worker_id(),
                    "release by a worker that does not hold the slot; ignoring"
                ),
                None => warn!(slot, worker_id, "release of an unbound slot; ignoring"),
            }
            return Ok(None);
        };
        self.announce(slot, None);

        let now = Utc::now();
        let cooldown = chrono::Duration::from_std(self.config.cooldown())
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        let update = ReleaseUpdate {
            claimed_at: assignment.claimed_at,
            now,
            cooldown_until: now + cooldown,
            success_delta: u64::from(outcome.is_some_and(|o| o.success)),
            fail_delta: u64::from(outcome.is_some_and(|o| !o.success)),
            latency_ms: outcome.and_then(|o| o.latency_ms),
            health_quality: outcome
                .and_then(|o| o.latency_ms)
                .map(|latency| health_from_latency(Some(latency), &self.health)),
            quarantine_threshold: self.config.max_fail_before_quarantine,
        };

        let proxy = match self.store.release(assignment.proxy_id, &update).await {
            Ok(proxy) => proxy,
            Err(StoreError::ClaimLost(proxy_id)) => {
                warn!(slot, worker_id, proxy_id, "claim was reclaimed before release; outcome dropped");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            slot,
            worker_id,
            proxy_id = proxy.id,
            status = %proxy.status,
            fail_count = proxy.fail_count,
            "proxy released"
        );
        Ok(Some(proxy))
    }

    /// Allocates a slot for `worker_id` and binds a proxy to it.
    ///
    /// The slot goes back to the allocator if binding fails.
    ///
    /// # Errors
    /// Returns slot exhaustion or any [`AssignmentRegistry::assign`] error.
    pub async fn acquire(&self, worker_id: &str) -> Result<Arc<Assignment>, AssignmentError> {
        let slot = self.allocator.allocate(worker_id)?;
        match self.assign(slot, worker_id).await {
            Ok(assignment) => Ok(assignment),
            Err(e) => {
                self.allocator.release(slot);
                Err(e)
            }
        }
    }

    /// Releases the binding and returns the slot to the allocator.
    ///
    /// # Errors
    /// Returns [`AssignmentError::Store`] if the store update fails.
    pub async fn relinquish(
        &self,
        slot: u32,
        worker_id: &str,
        outcome: Option<UsageOutcome>,
    ) -> Result<Option<Proxy>, AssignmentError> {
        let holder = self.allocator.holder(slot);
        let result = self.release(slot, worker_id, outcome).await;
        if holder.as_deref() == Some(worker_id) {
            self.allocator.release(slot);
        }
        result
    }

    /// Current binding of `slot`, if committed.
    #[must_use]
    pub fn lookup(&self, slot: u32) -> Option<Arc<Assignment>> {
        self.bindings.get(&slot).and_then(|binding| match binding.value() {
            SlotBinding::Bound(assignment) => Some(Arc::clone(assignment)),
            SlotBinding::Claiming { .. } => None,
        })
    }

    /// Every committed binding, ordered by slot.
    #[must_use]
    pub fn list_active(&self) -> Vec<Arc<Assignment>> {
        let mut active: Vec<Arc<Assignment>> = self
            .bindings
            .iter()
            .filter_map(|entry| match entry.value() {
                SlotBinding::Bound(assignment) => Some(Arc::clone(assignment)),
                SlotBinding::Claiming { .. } => None,
            })
            .collect();
        active.sort_by_key(|a| a.slot);
        active
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.bindings.iter().filter(|e| matches!(e.value(), SlotBinding::Bound(_))).count()
    }

    /// Drops the bindings backed by claims the stale-lock sweep reclaimed.
    ///
    /// A binding is only dropped when both proxy and claim epoch match, so a proxy that was
    /// claimed again between the reclaim and this call keeps its new binding.
    pub fn drop_bindings_for(&self, claims: &[StaleClaim]) -> Vec<u32> {
        let backed_by = |a: &Assignment| {
            claims.iter().any(|c| c.id == a.proxy_id && c.claimed_at == Some(a.claimed_at))
        };

        let candidates: Vec<u32> = self
            .bindings
            .iter()
            .filter_map(|entry| match entry.value() {
                SlotBinding::Bound(a) if backed_by(a.as_ref()) => Some(*entry.key()),
                _ => None,
            })
            .collect();

        let mut dropped = Vec::with_capacity(candidates.len());
        for slot in candidates {
            let removed = self
                .bindings
                .remove_if(&slot, |_, binding| matches!(binding, SlotBinding::Bound(a) if backed_by(a.as_ref())));
            if removed.is_some() {
                self.announce(slot, None);
                dropped.push(slot);
            }
        }
        dropped.sort_unstable();
        dropped
    }

    /// Pool counts for diagnostics.
    ///
    /// # Errors
    /// Propagates store failures.
    pub async fn pool_summary(&self) -> Result<PoolSummary, AssignmentError> {
        Ok(self.store.summary(Utc::now()).await?)
    }
}
