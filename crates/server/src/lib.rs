//! RouteSlot server components: admin API, middleware, and logging setup.

pub mod admin;
pub mod logging;
pub mod middleware;
