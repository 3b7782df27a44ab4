//! Proxy quality scoring.
//!
//! A proxy's score is a weighted sum of three factors, each on a 0-100 scale:
//!
//! - **health**: stored `health_quality`, or 50 for untested proxies
//! - **success rate**: `100 * success / (success + fail)`, or 50 without history
//! - **fairness**: `100 / (usage + 1)`, favouring rarely used proxies
//!
//! `health_quality` itself is derived from latency by [`health_from_latency`].

use super::types::Proxy;
use crate::config::{HealthThresholds, ScoreWeights};
use serde::Serialize;

/// Factor value used when a proxy has no data for it.
pub const NEUTRAL_FACTOR: f64 = 50.0;

/// Score breakdown for one proxy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProxyScore {
    pub total: f64,
    pub health: f64,
    pub success_rate: f64,
    pub fairness: f64,
}

/// Maps a latency sample onto a 0-100 health score.
///
/// The curve is piecewise linear and non-increasing:
///
/// | latency                     | health      |
/// |-----------------------------|-------------|
/// | `< excellent`               | 100         |
/// | `[excellent, good)`         | 100 → 80    |
/// | `[good, acceptable)`        | 80 → 50     |
/// | `[acceptable, failed)`      | 50 → 0      |
/// | `>= failed`                 | 0           |
/// | unknown                     | 50          |
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn health_from_latency(latency_ms: Option<u64>, thresholds: &HealthThresholds) -> f64 {
    let Some(latency) = latency_ms else {
        return NEUTRAL_FACTOR;
    };

    let segment = |from_ms: u64, to_ms: u64, from_score: f64, to_score: f64| {
        let span = to_ms.saturating_sub(from_ms).max(1) as f64;
        let progress = (latency - from_ms) as f64 / span;
        from_score + (to_score - from_score) * progress
    };

    if latency < thresholds.excellent_ms {
        100.0
    } else if latency < thresholds.good_ms {
        segment(thresholds.excellent_ms, thresholds.good_ms, 100.0, 80.0)
    } else if latency < thresholds.acceptable_ms {
        segment(thresholds.good_ms, thresholds.acceptable_ms, 80.0, 50.0)
    } else if latency < thresholds.failed_ms {
        segment(thresholds.acceptable_ms, thresholds.failed_ms, 50.0, 0.0)
    } else {
        0.0
    }
}

#[allow(clippy::cast_precision_loss)]
fn fairness(usage_count: u64) -> f64 {
    100.0 / (usage_count as f64 + 1.0)
}

/// Computes the weighted score of `proxy`.
#[must_use]
pub fn score_proxy(proxy: &Proxy, weights: &ScoreWeights) -> ProxyScore {
    let health = proxy.health_quality.unwrap_or(NEUTRAL_FACTOR);
    let success_rate = proxy.success_rate().unwrap_or(NEUTRAL_FACTOR);
    let fairness = fairness(proxy.usage_count);

    ProxyScore {
        total: health * weights.health
            + success_rate * weights.success_rate
            + fairness * weights.fairness,
        health,
        success_rate,
        fairness,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::types::{ProxyProtocol, ProxyStatus};

    fn proxy(health: Option<f64>, success: u64, fail: u64, usage: u64) -> Proxy {
        Proxy {
            id: 1,
            host: "10.0.0.1".to_string(),
            port: 8080,
            username: None,
            password: None,
            protocol: ProxyProtocol::Http,
            country: None,
            timezone: None,
            latency_ms: None,
            health_quality: health,
            success_count: success,
            fail_count: fail,
            usage_count: usage,
            status: ProxyStatus::Live,
            in_use: false,
            in_use_since: None,
            cooldown_until: None,
            last_used_at: None,
        }
    }

    #[test]
    fn test_health_curve_breakpoints() {
        let t = HealthThresholds::default();
        assert_eq!(health_from_latency(Some(0), &t), 100.0);
        assert_eq!(health_from_latency(Some(299), &t), 100.0);
        assert_eq!(health_from_latency(Some(300), &t), 100.0);
        assert_eq!(health_from_latency(Some(800), &t), 80.0);
        assert_eq!(health_from_latency(Some(2000), &t), 50.0);
        assert_eq!(health_from_latency(Some(5000), &t), 0.0);
        assert_eq!(health_from_latency(Some(60_000), &t), 0.0);
        assert_eq!(health_from_latency(None, &t), 50.0);
    }

    #[test]
    fn test_health_curve_interpolates() {
        let t = HealthThresholds::default();
        assert!((health_from_latency(Some(550), &t) - 90.0).abs() < 1e-9);
        assert!((health_from_latency(Some(1400), &t) - 65.0).abs() < 1e-9);
        assert!((health_from_latency(Some(3500), &t) - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_health_curve_is_monotonic() {
        let t = HealthThresholds::default();
        let mut previous = f64::INFINITY;
        for latency in (0..=6000).step_by(10) {
            let health = health_from_latency(Some(latency), &t);
            assert!(health <= previous, "health rose at {latency}ms");
            assert!((0.0..=100.0).contains(&health));
            previous = health;
        }
    }

    #[test]
    fn test_neutral_score_for_untested_proxy() {
        let score = score_proxy(&proxy(None, 0, 0, 0), &ScoreWeights::high_quality());
        assert_eq!(score.health, 50.0);
        assert_eq!(score.success_rate, 50.0);
        assert_eq!(score.fairness, 100.0);
        assert!((score.total - (50.0 * 0.6 + 50.0 * 0.3 + 100.0 * 0.1)).abs() < 1e-9);
    }

    #[test]
    fn test_weights_change_ranking() {
        let healthy_busy = proxy(Some(100.0), 5, 5, 9);
        let mediocre_fresh = proxy(Some(60.0), 10, 0, 0);

        let hq = ScoreWeights::high_quality();
        let balanced = ScoreWeights::balanced();

        assert_eq!(score_proxy(&healthy_busy, &hq).success_rate, 50.0);
        assert_eq!(score_proxy(&healthy_busy, &hq).fairness, 10.0);
        assert!(score_proxy(&mediocre_fresh, &balanced).total > score_proxy(&healthy_busy, &balanced).total);
    }
}
