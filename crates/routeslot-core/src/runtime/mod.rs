//! RouteSlot runtime initialization and lifecycle management.
//!
//! Every component is constructed once by [`RouteSlotRuntimeBuilder`] and shared through
//! `Arc`. Background tasks listen on one broadcast channel for shutdown.
//!
//! ```no_run
//! use routeslot_core::{config::AppConfig, runtime::RouteSlotRuntime};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!     let runtime = RouteSlotRuntime::builder().with_config(config).build().await?;
//!
//!     let listener = tokio::net::TcpListener::bind(runtime.config().provider_addr()?).await?;
//!     let _provider = runtime.spawn_provider_server(listener);
//!     runtime.supervisor().start().await?;
//!
//!     runtime.wait_for_shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod components;
pub mod lifecycle;

pub use builder::{RouteSlotRuntimeBuilder, RuntimeError};
pub use components::RouteSlotComponents;
pub use lifecycle::RouteSlotRuntime;
