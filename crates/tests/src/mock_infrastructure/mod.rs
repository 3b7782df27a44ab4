//! Mock infrastructure for end-to-end tests.
//!
//! - `StubEngine`: axum stand-in for the routing engine's control API
//! - `StubLauncher` / `RecordingHost`: fake process launcher and host network
//! - `Harness`: a full runtime wired to the stub, with a live provider server
//!
//! ```ignore
//! use tests::mock_infrastructure::Harness;
//!
//! let harness = Harness::start(3).await;
//! let report = harness.runtime.supervisor().start().await?;
//! assert_eq!(report.target_proxy, report.current_proxy);
//! ```

pub mod fakes;
pub mod stub_engine;
pub mod test_helpers;

pub use fakes::{RecordingHost, StubLauncher};
pub use stub_engine::{StubBehavior, StubEngine, StubGroup};
pub use test_helpers::*;
