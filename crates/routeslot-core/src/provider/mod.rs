//! Provider documents and the HTTP endpoint that serves them to the routing engine.

pub mod document;
pub mod server;
pub mod stats;

pub use server::{ProviderServer, ProviderStatus, SlotListing};
pub use stats::{ProviderStats, ProviderStatsSnapshot};
