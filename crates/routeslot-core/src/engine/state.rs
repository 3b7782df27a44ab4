use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Supervisor lifecycle.
///
/// ```text
/// Stopped → VerifyingPrereqs → GeneratingConfig → Spawning → WaitingForInterface
///         → InjectingRoute → WaitingForControlApi → SmokeTesting → Running
///         → Stopping → Stopped
/// ```
///
/// A failure in any state before `Running` returns straight to `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Stopped,
    VerifyingPrereqs,
    GeneratingConfig,
    Spawning,
    WaitingForInterface,
    InjectingRoute,
    WaitingForControlApi,
    SmokeTesting,
    Running,
    Stopping,
}

impl EngineState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::VerifyingPrereqs => "verifying_prereqs",
            Self::GeneratingConfig => "generating_config",
            Self::Spawning => "spawning",
            Self::WaitingForInterface => "waiting_for_interface",
            Self::InjectingRoute => "injecting_route",
            Self::WaitingForControlApi => "waiting_for_control_api",
            Self::SmokeTesting => "smoke_testing",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }

    /// Whether the supervisor is somewhere between `Stopped` and `Running`.
    #[must_use]
    pub fn is_starting(&self) -> bool {
        !matches!(self, Self::Stopped | Self::Running | Self::Stopping)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The running engine process and what startup learned about it.
#[derive(Debug, Clone, Serialize)]
pub struct EngineProcess {
    pub pid: Option<u32>,
    pub tun_name: Option<String>,
    pub tun_index: Option<u32>,
    pub route_injected: bool,
    pub started_at: DateTime<Utc>,
    pub proxy_swaps: u64,
    pub version: Option<String>,
}

impl EngineProcess {
    #[must_use]
    pub fn new(pid: Option<u32>) -> Self {
        Self {
            pid,
            tun_name: None,
            tun_index: None,
            route_injected: false,
            started_at: Utc::now(),
            proxy_swaps: 0,
            version: None,
        }
    }
}

/// Outcome of the startup smoke test.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SmokeReport {
    pub slot: u32,
    pub group: String,
    pub group_type: String,
    pub target_proxy: String,
    pub current_proxy: String,
    pub real_members: usize,
    pub duration_ms: u64,
}

/// Snapshot for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub state: EngineState,
    pub process: Option<EngineProcess>,
    pub last_smoke_test: Option<SmokeReport>,
    pub last_failure: Option<String>,
}
