//! Classification of engine output lines.
//!
//! Every line reaches the engine log file. What reaches the interactive log is filtered:
//! per-provider initialization chatter and health-check noise are folded into a periodic
//! "N of total providers initialized" counter, while warnings, errors, and startup
//! milestones always pass through.

use std::time::{Duration, Instant};

/// How a single engine output line is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    Error,
    Warning,
    Milestone,
    /// One provider finished initializing.
    ProviderInitialized,
    /// Health-check and similar chatter.
    Noise,
    Other,
}

const MILESTONES: &[&str] = &[
    "restful api listening",
    "initial configuration complete",
    "start initial configuration",
    "tun adapter listening",
    "tun stack listening",
];

const PROVIDER_INIT: &[&str] = &["start initial provider", "initial compatible provider"];

const NOISE: &[&str] =
    &["health check", "healthcheck", "url-test", "provider fetch", "proxy listening at"];

#[must_use]
pub fn classify(line: &str) -> LineClass {
    let lower = line.to_ascii_lowercase();

    if lower.contains("level=error") || lower.contains("level=fatal") || lower.starts_with("error") {
        LineClass::Error
    } else if lower.contains("level=warn") || lower.starts_with("warn") {
        LineClass::Warning
    } else if PROVIDER_INIT.iter().any(|p| lower.contains(p)) {
        LineClass::ProviderInitialized
    } else if MILESTONES.iter().any(|m| lower.contains(m)) {
        LineClass::Milestone
    } else if NOISE.iter().any(|n| lower.contains(n)) {
        LineClass::Noise
    } else {
        LineClass::Other
    }
}

/// Provider-initialization progress to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub initialized: u64,
    pub total: u64,
}

/// Counts provider initializations and decides when to report progress.
pub struct OutputFilter {
    total: u64,
    every: u64,
    interval: Duration,
    initialized: u64,
    last_reported: u64,
    last_report_at: Instant,
}

impl OutputFilter {
    #[must_use]
    pub fn new(total: u64, every: u64, interval: Duration) -> Self {
        Self {
            total,
            every: every.max(1),
            interval,
            initialized: 0,
            last_reported: 0,
            last_report_at: Instant::now(),
        }
    }

    /// Classifies `line` and returns progress when a report is due.
    pub fn observe(&mut self, line: &str) -> (LineClass, Option<Progress>) {
        let class = classify(line);
        if class != LineClass::ProviderInitialized {
            return (class, None);
        }

        self.initialized += 1;
        let now = Instant::now();
        let due = self.initialized - self.last_reported >= self.every
            || now.duration_since(self.last_report_at) >= self.interval
            || self.initialized == self.total;

        if due {
            self.last_reported = self.initialized;
            self.last_report_at = now;
            (class, Some(Progress { initialized: self.initialized, total: self.total }))
        } else {
            (class, None)
        }
    }

    #[must_use]
    pub fn initialized(&self) -> u64 {
        self.initialized
    }
}
