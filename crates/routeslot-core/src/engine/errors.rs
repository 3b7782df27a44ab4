use super::state::EngineState;
use crate::errors::ErrorKind;
use std::fmt;
use thiserror::Error;

/// Errors from the engine's control API.
#[derive(Debug, Error)]
pub enum ControlApiError {
    #[error("failed to build control API client: {0}")]
    Client(String),

    #[error("control API request {method} {path} failed: {message}")]
    Network { method: &'static str, path: String, message: String },

    #[error("control API returned HTTP {status} for {method} {path}: {body}")]
    Status { method: &'static str, path: String, status: u16, body: String },

    #[error("control API response for {path} could not be decoded: {message}")]
    Decode { path: String, message: String },
}

impl ControlApiError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 404 || *status == 429,
            Self::Client(_) | Self::Decode { .. } => false,
        }
    }

    pub(crate) fn from_reqwest(method: &'static str, path: &str, error: &reqwest::Error) -> Self {
        let message = if error.is_connect() {
            "connection refused or unreachable".to_string()
        } else if error.is_timeout() {
            "request timed out".to_string()
        } else if error.is_decode() {
            return Self::Decode { path: path.to_string(), message: error.to_string() };
        } else {
            error.to_string()
        };
        Self::Network { method, path: path.to_string(), message }
    }
}

/// A startup failure: the step that failed, why, and what to do about it.
#[derive(Debug, Clone)]
pub struct StartupFailure {
    pub step: EngineState,
    pub kind: ErrorKind,
    pub cause: String,
    pub remediation: String,
}

impl StartupFailure {
    #[must_use]
    pub fn new(
        step: EngineState,
        kind: ErrorKind,
        cause: impl Into<String>,
        remediation: impl Into<String>,
    ) -> Self {
        Self { step, kind, cause: cause.into(), remediation: remediation.into() }
    }
}

impl fmt::Display for StartupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "engine startup failed during {} ({}): {}. Remediation: {}",
            self.step, self.kind, self.cause, self.remediation
        )
    }
}

impl std::error::Error for StartupFailure {}

/// Errors returned by [`super::EngineSupervisor`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine supervisor is busy ({0}); stop it first")]
    InvalidState(EngineState),

    #[error("engine is not running")]
    NotRunning,

    #[error(transparent)]
    Startup(#[from] StartupFailure),

    #[error(transparent)]
    ControlApi(#[from] ControlApiError),

    #[error("slot {0} is outside the configured slot range")]
    InvalidSlot(u32),

    #[error("group '{group}' still reports '{current}' after selecting '{target}'")]
    SwitchUnconfirmed { group: String, target: String, current: String },
}
