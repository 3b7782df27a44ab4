//! Proxy pool endpoints.

#![allow(clippy::missing_errors_doc)]

use axum::{extract::State, http::StatusCode, Json};
use routeslot_core::proxy::PoolSummary;

use crate::admin::{status_for, AdminState};

/// GET /admin/proxies/summary
pub async fn get_summary(
    State(state): State<AdminState>,
) -> Result<Json<PoolSummary>, (StatusCode, String)> {
    state
        .registry
        .pool_summary()
        .await
        .map(Json)
        .map_err(|e| (status_for(e.kind()), e.to_string()))
}
