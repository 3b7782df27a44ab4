use super::{
    scoring::{score_proxy, ProxyScore},
    store::{ProxyStore, SelectFilter, StoreError},
    types::Proxy,
};
use crate::config::SelectionConfig;
use arc_swap::ArcSwap;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, trace};

/// Caller-supplied selection options.
#[derive(Debug, Clone, Default)]
pub struct SelectOptions {
    /// Proxies the caller already lost a claim race on.
    pub exclude_ids: Vec<i64>,
    pub prefer_high_quality: bool,
}

/// A selected proxy with its score breakdown.
#[derive(Debug, Clone)]
pub struct ScoredProxy {
    pub proxy: Proxy,
    pub score: ProxyScore,
}

/// Picks the best eligible proxy from the store.
///
/// Selection config sits behind an `ArcSwap` so that operators can retune gates and
/// weights without restarting.
pub struct ProxySelector {
    store: Arc<dyn ProxyStore>,
    config: ArcSwap<SelectionConfig>,
}

impl ProxySelector {
    #[must_use]
    pub fn new(store: Arc<dyn ProxyStore>, config: SelectionConfig) -> Self {
        Self { store, config: ArcSwap::new(Arc::new(config)) }
    }

    #[must_use]
    pub fn config(&self) -> Arc<SelectionConfig> {
        self.config.load_full()
    }

    pub fn update_config(&self, config: SelectionConfig) {
        self.config.store(Arc::new(config));
    }

    /// Returns the highest-scoring eligible proxy, or `None` if the pool has nothing to offer.
    ///
    /// Ties keep the first candidate in store order.
    ///
    /// # Errors
    /// Propagates store failures.
    pub async fn select_best(&self, options: &SelectOptions) -> Result<Option<ScoredProxy>, StoreError> {
        let config = self.config.load();
        let filter = SelectFilter {
            now: Utc::now(),
            min_health_quality: config.min_health_quality,
            exclude_ids: options.exclude_ids.clone(),
        };

        let candidates = self.store.find_selectable(&filter).await?;
        let candidate_count = candidates.len();
        let weights = if options.prefer_high_quality {
            config.high_quality_weights
        } else {
            config.balanced_weights
        };

        let mut best: Option<ScoredProxy> = None;
        for proxy in candidates {
            if config.min_success_rate > 0.0
                && proxy.success_rate().is_some_and(|rate| rate < config.min_success_rate)
            {
                trace!(proxy_id = proxy.id, "skipping proxy below success-rate gate");
                continue;
            }

            let score = score_proxy(&proxy, &weights);
            if best.as_ref().is_none_or(|b| score.total > b.score.total) {
                best = Some(ScoredProxy { proxy, score });
            }
        }

        match &best {
            Some(chosen) => debug!(
                proxy_id = chosen.proxy.id,
                score = chosen.score.total,
                candidates = candidate_count,
                "selected proxy"
            ),
            None => debug!(
                excluded = options.exclude_ids.len(),
                "no eligible proxy in pool"
            ),
        }

        Ok(best)
    }
}
