//! Slot allocation endpoints.

#![allow(clippy::missing_errors_doc)]

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use crate::admin::{
    status_for,
    types::{
        AllocateSlotRequest, ReleaseSlotRequest, ReleaseSlotResponse, ReleasedProxy,
        SlotAssignment, SlotsOverview,
    },
    AdminState,
};

/// GET /admin/slots
pub async fn list_slots(State(state): State<AdminState>) -> Json<SlotsOverview> {
    let base_port = state.config.engine.listener_base_port;
    Json(SlotsOverview {
        slots: state.registry.allocator().stats(),
        assignments: state
            .registry
            .list_active()
            .iter()
            .map(|assignment| SlotAssignment::new(assignment, base_port))
            .collect(),
    })
}

/// POST /admin/slots
///
/// Allocates a slot for the worker and binds the best available proxy to it.
pub async fn allocate_slot(
    State(state): State<AdminState>,
    Json(request): Json<AllocateSlotRequest>,
) -> Result<(StatusCode, Json<SlotAssignment>), (StatusCode, String)> {
    if request.worker_id.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "worker_id cannot be empty".to_string()));
    }

    let assignment = state
        .registry
        .acquire(&request.worker_id)
        .await
        .map_err(|e| (status_for(e.kind()), e.to_string()))?;

    info!(slot = assignment.slot, worker_id = %request.worker_id, "slot allocated via admin API");
    Ok((
        StatusCode::CREATED,
        Json(SlotAssignment::new(&assignment, state.config.engine.listener_base_port)),
    ))
}

/// DELETE /admin/slots/{slot}
///
/// Releases the worker's binding and returns the slot to the pool. `released` is false
/// when the slot was not bound to that worker.
pub async fn release_slot(
    State(state): State<AdminState>,
    Path(slot): Path<u32>,
    Json(request): Json<ReleaseSlotRequest>,
) -> Result<Json<ReleaseSlotResponse>, (StatusCode, String)> {
    if !state.registry.allocator().contains(slot) {
        return Err((StatusCode::NOT_FOUND, format!("slot {slot} does not exist")));
    }

    let proxy = state
        .registry
        .relinquish(slot, &request.worker_id, request.outcome())
        .await
        .map_err(|e| (status_for(e.kind()), e.to_string()))?;

    Ok(Json(ReleaseSlotResponse {
        slot,
        released: proxy.is_some(),
        proxy: proxy.as_ref().map(ReleasedProxy::from),
    }))
}

#[cfg(test)]
mod tests {
    use crate::admin::handlers::test_support::{admin_app, call};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_allocate_list_release() {
        let app = admin_app(4, 2);

        let (status, body) =
            call(&app, Method::POST, "/admin/slots", Some(json!({ "worker_id": "crawler-1" }))).await;
        assert_eq!(status, StatusCode::CREATED);
        let slot = body["slot"].as_u64().unwrap();
        assert_eq!(body["worker_id"], "crawler-1");
        assert_eq!(body["listener_port"].as_u64().unwrap(), 20000 + slot);
        assert!(body.get("password").is_none());

        let (status, body) = call(&app, Method::GET, "/admin/slots", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["assignments"].as_array().unwrap().len(), 1);
        assert_eq!(body["slots"]["allocated"], 1);

        let (status, body) = call(
            &app,
            Method::DELETE,
            &format!("/admin/slots/{slot}"),
            Some(json!({ "worker_id": "crawler-1", "success": false, "latency_ms": 900 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["released"], true);
        assert_eq!(body["proxy"]["fail_count"], 1);
        assert!(body["proxy"]["cooldown_until"].is_string());

        let (_, body) = call(&app, Method::GET, "/admin/slots", None).await;
        assert!(body["assignments"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_release_by_other_worker_is_ignored() {
        let app = admin_app(2, 1);
        let (_, body) = call(&app, Method::POST, "/admin/slots", Some(json!({ "worker_id": "a" }))).await;
        let slot = body["slot"].as_u64().unwrap();

        let (status, body) = call(
            &app,
            Method::DELETE,
            &format!("/admin/slots/{slot}"),
            Some(json!({ "worker_id": "b" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["released"], false);
    }

    #[tokio::test]
    async fn test_exhaustion_maps_to_service_unavailable() {
        let app = admin_app(2, 1);
        let (status, _) = call(&app, Method::POST, "/admin/slots", Some(json!({ "worker_id": "a" }))).await;
        assert_eq!(status, StatusCode::CREATED);

        // second slot exists but the only proxy is taken
        let (status, body) = call(&app, Method::POST, "/admin/slots", Some(json!({ "worker_id": "b" }))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.as_str().unwrap().contains("no proxy available"));

        let (_, overview) = call(&app, Method::GET, "/admin/slots", None).await;
        assert_eq!(overview["slots"]["allocated"], 1, "failed acquire must return its slot");
    }

    #[tokio::test]
    async fn test_bad_requests() {
        let app = admin_app(2, 1);
        let (status, _) = call(&app, Method::POST, "/admin/slots", Some(json!({ "worker_id": " " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) =
            call(&app, Method::DELETE, "/admin/slots/99", Some(json!({ "worker_id": "a" }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
