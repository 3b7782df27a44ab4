use serde::Serialize;
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

/// Request counters for the provider endpoint.
///
/// All fields are relaxed atomics; the hot path never takes a lock.
pub struct ProviderStats {
    started: Instant,
    total_requests: AtomicU64,
    real_served: AtomicU64,
    placeholder_served: AtomicU64,
    invalid_requests: AtomicU64,
    /// Milliseconds since `started` of the last emitted summary log line.
    last_log_ms: AtomicU64,
    log_window: Duration,
}

/// Point-in-time copy of [`ProviderStats`].
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ProviderStatsSnapshot {
    pub total_requests: u64,
    pub real_served: u64,
    pub placeholder_served: u64,
    pub invalid_requests: u64,
    pub uptime_secs: u64,
}

/// What a provider request resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedKind {
    Real,
    Placeholder,
    Invalid,
}

impl ProviderStats {
    #[must_use]
    pub fn new(log_window: Duration) -> Self {
        Self {
            started: Instant::now(),
            total_requests: AtomicU64::new(0),
            real_served: AtomicU64::new(0),
            placeholder_served: AtomicU64::new(0),
            invalid_requests: AtomicU64::new(0),
            last_log_ms: AtomicU64::new(0),
            log_window,
        }
    }

    pub fn record(&self, kind: ServedKind) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let counter = match kind {
            ServedKind::Real => &self.real_served,
            ServedKind::Placeholder => &self.placeholder_served,
            ServedKind::Invalid => &self.invalid_requests,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns `true` for at most one caller per log window.
    #[must_use]
    pub fn should_log(&self) -> bool {
        let now_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let window_ms = u64::try_from(self.log_window.as_millis()).unwrap_or(u64::MAX);
        let last = self.last_log_ms.load(Ordering::Relaxed);

        // first request always logs
        if last != 0 && now_ms.saturating_sub(last) < window_ms {
            return false;
        }

        self.last_log_ms
            .compare_exchange(last, now_ms.max(1), Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    #[must_use]
    pub fn snapshot(&self) -> ProviderStatsSnapshot {
        ProviderStatsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            real_served: self.real_served.load(Ordering::Relaxed),
            placeholder_served: self.placeholder_served.load(Ordering::Relaxed),
            invalid_requests: self.invalid_requests.load(Ordering::Relaxed),
            uptime_secs: self.started.elapsed().as_secs(),
        }
    }
}

impl Default for ProviderStats {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}
