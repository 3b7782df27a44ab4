//! Admin API handlers.

pub mod engine;
pub mod proxies;
pub mod slots;
