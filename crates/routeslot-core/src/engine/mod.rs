//! Routing engine supervision.
//!
//! The engine is an external process configured with one HTTP proxy provider, one
//! `select` group and one local listener per slot. [`EngineSupervisor`] owns its
//! lifecycle; the remaining modules are the pieces it drives.

pub mod config_gen;
pub mod control;
pub mod errors;
pub mod host;
pub mod launcher;
pub mod output;
pub mod state;
pub mod supervisor;

pub use config_gen::EngineConfigGenerator;
pub use control::{EngineControlClient, EngineVersion, ProxyGroup};
pub use errors::{ControlApiError, EngineError, StartupFailure};
pub use host::{HostNetwork, InterfaceInfo, LinuxHost};
pub use launcher::{CommandLauncher, EngineHandle, EngineLauncher, ExitInfo, LaunchSpec, ProcessControl};
pub use state::{EngineProcess, EngineState, EngineStatus, SmokeReport};
pub use supervisor::{EngineSupervisor, SMOKE_TEST_WORKER};
