//! # RouteSlot Core
//!
//! Core library for RouteSlot, which hands out numbered proxy slots to concurrent workers
//! and keeps an external routing engine pointed at the proxy bound to each slot.
//!
//! - **[`slots`]**: Fixed pool of slot numbers with reuse-before-fresh allocation.
//!
//! - **[`proxy`]**: Proxy records, the `SQLite` and in-memory stores, health scoring, and
//!   best-proxy selection.
//!
//! - **[`assignment`]**: Slot ↔ proxy bindings, store-arbitrated claims, release with
//!   cooldown and quarantine, and the stale-lock sweeper.
//!
//! - **[`provider`]**: HTTP endpoint serving one proxy-provider document per slot.
//!
//! - **[`engine`]**: Routing engine lifecycle: config generation, process launch, TUN and
//!   route setup, control API, and the startup smoke test.
//!
//! - **[`runtime`]**: Construction and shutdown of all of the above.
//!
//! ## Architecture
//!
//! ```text
//!  worker ──acquire──► AssignmentRegistry ──select──► ProxySelector ──► ProxyStore
//!                            │                                      (claim / release)
//!                            │ bindings
//!                            ▼
//!                      ProviderServer ◄──GET /provider/slot/{n}── routing engine
//!                                                                      ▲
//!                      EngineSupervisor ──spawn / control API──────────┘
//! ```

pub mod assignment;
pub mod config;
pub mod engine;
pub mod errors;
pub mod provider;
pub mod proxy;
pub mod runtime;
pub mod slots;
