//! Persistent proxy pool and quality-scored selection.
//!
//! - [`types`]: proxy records and release outcomes
//! - [`store`]: the [`ProxyStore`] trait, with `SQLite` and in-memory backends
//! - [`scoring`]: the latency→health curve and weighted score
//! - [`selector`]: picks the single best eligible proxy

pub mod memory;
pub mod scoring;
pub mod selector;
pub mod sqlite;
pub mod store;
pub mod types;

pub use memory::MemoryProxyStore;
pub use scoring::{health_from_latency, score_proxy, ProxyScore};
pub use selector::{ProxySelector, ScoredProxy, SelectOptions};
pub use sqlite::SqliteProxyStore;
pub use store::{ProxyStore, ReleaseUpdate, SelectFilter, StaleClaim, StoreError};
pub use types::{NewProxy, PoolSummary, Proxy, ProxyProtocol, ProxyStatus, UsageOutcome};
