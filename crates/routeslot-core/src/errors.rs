//! Cross-module error classification.
//!
//! Each module owns its `thiserror` enum; [`ErrorKind`] folds them into the five
//! categories operators reason about.

use crate::{
    assignment::AssignmentError,
    engine::{ControlApiError, EngineError},
    proxy::StoreError,
    slots::SlotError,
};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A finite resource (slots, proxies) ran out.
    Exhaustion,
    /// The engine process could not be spawned, exited, or never produced its interface.
    ExternalProcessFailure,
    /// The engine's control API was unreachable or answered unexpectedly.
    ControlApiFailure,
    /// A check of system behaviour failed, e.g. the smoke test.
    ValidationFailure,
    StoreFailure,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exhaustion => "exhaustion",
            Self::ExternalProcessFailure => "external process failure",
            Self::ControlApiFailure => "control API failure",
            Self::ValidationFailure => "validation failure",
            Self::StoreFailure => "store failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SlotError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Exhausted { .. } => ErrorKind::Exhaustion,
            Self::OutOfRange(_) | Self::Held { .. } => ErrorKind::ValidationFailure,
        }
    }
}

impl StoreError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::StoreFailure
    }
}

impl AssignmentError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoProxyAvailable { .. } => ErrorKind::Exhaustion,
            Self::InvalidSlot(_) | Self::SlotBusy { .. } => ErrorKind::ValidationFailure,
            Self::Slot(e) => e.kind(),
            Self::Store(e) => e.kind(),
        }
    }
}

impl ControlApiError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ControlApiFailure
    }
}

impl EngineError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Startup(failure) => failure.kind,
            Self::ControlApi(e) => e.kind(),
            Self::NotRunning => ErrorKind::ExternalProcessFailure,
            Self::InvalidState(_) | Self::InvalidSlot(_) | Self::SwitchUnconfirmed { .. } => {
                ErrorKind::ValidationFailure
            }
        }
    }
}
