//! Routing engine endpoints.

#![allow(clippy::missing_errors_doc)]

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use routeslot_core::engine::{EngineState, EngineStatus};
use serde_json::json;

use crate::admin::{status_for, types::SwitchProxyRequest, AdminState};

/// GET /admin/engine
pub async fn get_status(State(state): State<AdminState>) -> Json<EngineStatus> {
    Json(state.supervisor.status())
}

/// POST /admin/engine/switch
///
/// Points a slot's group at another proxy by name and waits for the engine to confirm.
pub async fn switch_proxy(
    State(state): State<AdminState>,
    Json(request): Json<SwitchProxyRequest>,
) -> Result<Json<EngineStatus>, (StatusCode, String)> {
    state
        .supervisor
        .switch_slot_proxy(request.slot, &request.proxy)
        .await
        .map_err(|e| (status_for(e.kind()), e.to_string()))?;
    Ok(Json(state.supervisor.status()))
}

/// GET /admin/health
///
/// 200 while the engine is running, 503 otherwise.
pub async fn get_health(State(state): State<AdminState>) -> impl IntoResponse {
    let engine = state.supervisor.state();
    let status_code =
        if engine == EngineState::Running { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status_code,
        Json(json!({
            "engine": engine,
            "active_assignments": state.registry.active_count(),
            "uptime_secs": state.start_time.elapsed().as_secs(),
            "version": state.version,
        })),
    )
}
