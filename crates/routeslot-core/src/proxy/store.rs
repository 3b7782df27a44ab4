use super::types::{NewProxy, PoolSummary, Proxy};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised by proxy store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Proxy {0} not found")]
    NotFound(i64),

    #[error("Corrupt proxy row: {0}")]
    Corrupt(String),

    #[error("Proxy {0} is no longer held by this claim")]
    ClaimLost(i64),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// Eligibility predicate evaluated by the store.
#[derive(Debug, Clone)]
pub struct SelectFilter {
    pub now: DateTime<Utc>,
    /// Tested proxies below this health are skipped. Untested proxies always pass.
    pub min_health_quality: f64,
    pub exclude_ids: Vec<i64>,
}

impl SelectFilter {
    /// Applies the predicate to an in-memory record.
    #[must_use]
    pub fn matches(&self, proxy: &Proxy) -> bool {
        proxy.status.is_selectable()
            && !proxy.in_use
            && proxy.cooled_down(self.now)
            && proxy.health_quality.is_none_or(|h| h >= self.min_health_quality)
            && !self.exclude_ids.contains(&proxy.id)
    }
}

/// Mutation applied atomically when a claim ends.
#[derive(Debug, Clone)]
pub struct ReleaseUpdate {
    /// `in_use_since` of the claim being ended. The update only applies while the proxy is
    /// still held under this claim.
    pub claimed_at: DateTime<Utc>,
    pub now: DateTime<Utc>,
    pub cooldown_until: DateTime<Utc>,
    pub success_delta: u64,
    pub fail_delta: u64,
    /// New latency sample, if the worker measured one.
    pub latency_ms: Option<u64>,
    /// Health recomputed from `latency_ms`.
    pub health_quality: Option<f64>,
    /// `fail_count` at or above this value moves the proxy to quarantine.
    pub quarantine_threshold: u64,
}

/// A claim cleared by [`ProxyStore::reclaim_stale`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleClaim {
    pub id: i64,
    /// `in_use_since` of the cleared claim.
    pub claimed_at: Option<DateTime<Utc>>,
}

/// Persistent proxy pool.
///
/// `try_claim` is the only arbiter of proxy ownership: implementations must perform it as
/// a single conditional update so that exactly one concurrent caller observes `true`.
#[async_trait]
pub trait ProxyStore: Send + Sync {
    /// Returns every proxy matching `filter`, in storage order.
    async fn find_selectable(&self, filter: &SelectFilter) -> Result<Vec<Proxy>, StoreError>;

    /// Flips `in_use` from false to true. Returns `false` when another caller owns the proxy
    /// or it stopped being selectable.
    async fn try_claim(&self, id: i64, now: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Ends the claim identified by `update.claimed_at` and returns the updated record.
    ///
    /// Returns [`StoreError::ClaimLost`] when the proxy was reclaimed or claimed again since.
    async fn release(&self, id: i64, update: &ReleaseUpdate) -> Result<Proxy, StoreError>;

    /// Clears `in_use` on claims older than `cutoff` and returns the cleared claims.
    async fn reclaim_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<StaleClaim>, StoreError>;

    async fn get(&self, id: i64) -> Result<Option<Proxy>, StoreError>;

    async fn insert(&self, proxy: &NewProxy) -> Result<i64, StoreError>;

    async fn list_all(&self) -> Result<Vec<Proxy>, StoreError>;

    /// Manual quarantine reset: back to `testing` with a clean failure count.
    async fn reset_quarantine(&self, id: i64) -> Result<(), StoreError>;

    async fn summary(&self, now: DateTime<Utc>) -> Result<PoolSummary, StoreError>;

    /// Connectivity check.
    async fn ping(&self) -> Result<(), StoreError>;
}
