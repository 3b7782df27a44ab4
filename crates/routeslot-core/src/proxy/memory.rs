use super::{
    store::{ProxyStore, ReleaseUpdate, SelectFilter, StaleClaim, StoreError},
    types::{NewProxy, PoolSummary, Proxy, ProxyStatus},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// In-process proxy pool.
///
/// The compare-and-set in [`ProxyStore::try_claim`] happens under the write lock. Used by
/// tests and by deployments without a database.
#[derive(Default)]
pub struct MemoryProxyStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    proxies: BTreeMap<i64, Proxy>,
}

impl MemoryProxyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store pre-populated with `proxies`.
    #[must_use]
    pub fn with_proxies(proxies: impl IntoIterator<Item = NewProxy>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.write();
            for proxy in proxies {
                inner.push(&proxy);
            }
        }
        store
    }

    /// Overwrites a record. Test helper for seeding health and counters.
    pub fn put(&self, proxy: Proxy) {
        let mut inner = self.inner.write();
        inner.next_id = inner.next_id.max(proxy.id);
        inner.proxies.insert(proxy.id, proxy);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().proxies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().proxies.is_empty()
    }
}

impl Inner {
    fn push(&mut self, new: &NewProxy) -> i64 {
        self.next_id += 1;
        let id = self.next_id;
        self.proxies.insert(
            id,
            Proxy {
                id,
                host: new.host.clone(),
                port: new.port,
                username: new.username.clone(),
                password: new.password.clone(),
                protocol: new.protocol,
                country: new.country.clone(),
                timezone: new.timezone.clone(),
                latency_ms: None,
                health_quality: None,
                success_count: 0,
                fail_count: 0,
                usage_count: 0,
                status: new.status,
                in_use: false,
                in_use_since: None,
                cooldown_until: None,
                last_used_at: None,
            },
        );
        id
    }
}

#[async_trait]
impl ProxyStore for MemoryProxyStore {
    async fn find_selectable(&self, filter: &SelectFilter) -> Result<Vec<Proxy>, StoreError> {
        Ok(self.inner.read().proxies.values().filter(|p| filter.matches(p)).cloned().collect())
    }

    async fn try_claim(&self, id: i64, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut inner = self.inner.write();
        let Some(proxy) = inner.proxies.get_mut(&id) else {
            return Ok(false);
        };

        if proxy.in_use || !proxy.status.is_selectable() || !proxy.cooled_down(now) {
            return Ok(false);
        }

        proxy.in_use = true;
        proxy.in_use_since = Some(now);
        proxy.last_used_at = Some(now);
        proxy.usage_count += 1;
        Ok(true)
    }

    async fn release(&self, id: i64, update: &ReleaseUpdate) -> Result<Proxy, StoreError> {
        let mut inner = self.inner.write();
        let proxy = inner.proxies.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        let held = proxy.in_use
            && proxy
                .in_use_since
                .is_some_and(|since| since.timestamp_millis() == update.claimed_at.timestamp_millis());
        if !held {
            return Err(StoreError::ClaimLost(id));
        }

        proxy.in_use = false;
        proxy.in_use_since = None;
        proxy.cooldown_until = Some(update.cooldown_until);
        proxy.last_used_at = Some(update.now);
        proxy.success_count += update.success_delta;
        proxy.fail_count += update.fail_delta;
        if update.latency_ms.is_some() {
            proxy.latency_ms = update.latency_ms;
        }
        if update.health_quality.is_some() {
            proxy.health_quality = update.health_quality;
        }
        if update.fail_delta > 0
            && proxy.status.is_selectable()
            && proxy.fail_count >= update.quarantine_threshold
        {
            proxy.status = ProxyStatus::Quarantine;
        }

        Ok(proxy.clone())
    }

    async fn reclaim_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<StaleClaim>, StoreError> {
        let mut inner = self.inner.write();
        let mut reclaimed = Vec::new();
        for proxy in inner.proxies.values_mut() {
            if proxy.in_use && proxy.in_use_since.is_none_or(|since| since < cutoff) {
                reclaimed.push(StaleClaim { id: proxy.id, claimed_at: proxy.in_use_since.take() });
                proxy.in_use = false;
            }
        }
        Ok(reclaimed)
    }

    async fn get(&self, id: i64) -> Result<Option<Proxy>, StoreError> {
        Ok(self.inner.read().proxies.get(&id).cloned())
    }

    async fn insert(&self, proxy: &NewProxy) -> Result<i64, StoreError> {
        Ok(self.inner.write().push(proxy))
    }

    async fn list_all(&self) -> Result<Vec<Proxy>, StoreError> {
        Ok(self.inner.read().proxies.values().cloned().collect())
    }

    async fn reset_quarantine(&self, id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        match inner.proxies.get_mut(&id) {
            Some(proxy) if proxy.status == ProxyStatus::Quarantine => {
                proxy.status = ProxyStatus::Testing;
                proxy.fail_count = 0;
                Ok(())
            }
            _ => Err(StoreError::NotFound(id)),
        }
    }

    async fn summary(&self, now: DateTime<Utc>) -> Result<PoolSummary, StoreError> {
        let inner = self.inner.read();
        let mut summary = PoolSummary::default();
        for proxy in inner.proxies.values() {
            summary.total += 1;
            match proxy.status {
                ProxyStatus::Live => summary.live += 1,
                ProxyStatus::Testing => summary.testing += 1,
                ProxyStatus::Quarantine => summary.quarantine += 1,
                ProxyStatus::Blacklisted => summary.blacklisted += 1,
            }
            if proxy.in_use {
                summary.in_use += 1;
            }
            if !proxy.cooled_down(now) {
                summary.cooling_down += 1;
            }
        }
        Ok(summary)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
