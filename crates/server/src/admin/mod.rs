//! Admin API.
//!
//! Runs on its own port next to the provider endpoint and shares the runtime's
//! components through `Arc` references.

pub mod handlers;
pub mod types;

use std::{sync::Arc, time::Instant};

use axum::{
    http::StatusCode,
    routing::{delete, get, post},
    Router,
};
use routeslot_core::{
    assignment::AssignmentRegistry, config::AppConfig, engine::EngineSupervisor, errors::ErrorKind,
    runtime::RouteSlotRuntime,
};
use tower::limit::ConcurrencyLimitLayer;

use crate::middleware::{request_id_layers, trace_layer};

/// Shared state for admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub registry: Arc<AssignmentRegistry>,
    pub supervisor: Arc<EngineSupervisor>,
    pub config: Arc<AppConfig>,
    pub start_time: Instant,
    pub version: &'static str,
}

impl AdminState {
    #[must_use]
    pub fn new(
        registry: Arc<AssignmentRegistry>,
        supervisor: Arc<EngineSupervisor>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            registry,
            supervisor,
            config,
            start_time: Instant::now(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    #[must_use]
    pub fn from_runtime(runtime: &RouteSlotRuntime) -> Self {
        Self::new(
            Arc::clone(runtime.registry()),
            Arc::clone(runtime.supervisor()),
            Arc::new(runtime.config().clone()),
        )
    }
}

/// HTTP status for an error of the given kind.
#[must_use]
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Exhaustion => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::ValidationFailure => StatusCode::CONFLICT,
        ErrorKind::ControlApiFailure | ErrorKind::ExternalProcessFailure => StatusCode::BAD_GATEWAY,
        ErrorKind::StoreFailure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn create_admin_router(state: AdminState) -> Router {
    let (set_request_id, propagate_request_id) = request_id_layers();
    let max_concurrent = state.config.server.max_concurrent_requests;

    Router::new()
        .route(
            "/admin/slots",
            get(handlers::slots::list_slots).post(handlers::slots::allocate_slot),
        )
        .route("/admin/slots/{slot}", delete(handlers::slots::release_slot))
        .route("/admin/engine", get(handlers::engine::get_status))
        .route("/admin/engine/switch", post(handlers::engine::switch_proxy))
        .route("/admin/proxies/summary", get(handlers::proxies::get_summary))
        .route("/admin/health", get(handlers::engine::get_health))
        .layer(ConcurrencyLimitLayer::new(max_concurrent))
        .layer(trace_layer())
        .layer(propagate_request_id)
        .layer(set_request_id)
        .with_state(state)
}
