//! Integration and end-to-end tests for RouteSlot.
//!
//! - `engine_tests`: supervisor startup, smoke test, crash handling and switching against a
//!   stub engine that fetches provider documents over HTTP
//! - `assignment_tests`: allocation, cooldown, quarantine and stale sweeps through the runtime
//! - `runtime_tests`: the full stack on the `SQLite` store
//! - `mock_infrastructure`: the stub engine, fake launcher and host, and the test harness
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --package tests
//! ```
//!
//! No engine binary, TUN device or root privileges are required.

#[cfg(test)]
mod assignment_tests;

#[cfg(test)]
mod engine_tests;

#[cfg(test)]
mod runtime_tests;

/// Mock infrastructure for testing
pub mod mock_infrastructure;
