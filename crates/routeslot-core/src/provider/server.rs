use super::{
    document::{render_named_placeholder, render_placeholder, CONTENT_TYPE},
    stats::{ProviderStats, ProviderStatsSnapshot, ServedKind},
};
use crate::assignment::AssignmentRegistry;
use axum::{
    extract::{rejection::PathRejection, Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use serde::Serialize;
use std::{future::Future, io, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Shared state of the provider endpoint.
#[derive(Clone)]
pub struct ProviderState {
    registry: Arc<AssignmentRegistry>,
    /// Index `n - 1` holds the placeholder for slot `n`.
    placeholders: Arc<[Bytes]>,
    invalid_placeholder: Bytes,
    stats: Arc<ProviderStats>,
}

#[derive(Debug, Serialize)]
pub struct ProviderStatus {
    pub total_slots: u32,
    pub real_slots: usize,
    pub placeholder_slots: usize,
    pub requests: ProviderStatsSnapshot,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotDocumentKind {
    Real,
    Placeholder,
}

#[derive(Debug, Serialize)]
pub struct SlotListing {
    pub slot: u32,
    pub kind: SlotDocumentKind,
    pub proxy_id: Option<i64>,
    pub proxy_name: Option<String>,
}

/// HTTP endpoint the routing engine polls for per-slot provider documents.
///
/// Placeholders are rendered for every slot at construction and real documents at bind
/// time, so serving a document is a lookup plus a reference-count bump.
pub struct ProviderServer {
    state: ProviderState,
}

impl ProviderServer {
    #[must_use]
    pub fn new(registry: Arc<AssignmentRegistry>) -> Self {
        let total = registry.allocator().total_slots();
        let placeholders: Arc<[Bytes]> = (1..=total).map(render_placeholder).collect();

        debug!(slots = total, "pre-rendered placeholder documents");

        Self {
            state: ProviderState {
                registry,
                placeholders,
                invalid_placeholder: render_named_placeholder("placeholder-invalid"),
                stats: Arc::new(ProviderStats::new(Duration::from_secs(5))),
            },
        }
    }

    #[must_use]
    pub fn stats(&self) -> Arc<ProviderStats> {
        Arc::clone(&self.state.stats)
    }

    /// Builds the router: `/provider/slot/{slot_id}`, `/status`, `/list`.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route("/provider/slot/{slot_id}", get(serve_slot_document))
            .route("/status", get(status))
            .route("/list", get(list))
            .with_state(self.state.clone())
    }

    /// Serves until `shutdown` resolves.
    ///
    /// # Errors
    /// Returns I/O errors from the listener.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = listener.local_addr() {
            info!(address = %addr, "provider server listening");
        }
        axum::serve(listener, self.router()).with_graceful_shutdown(shutdown).await
    }
}

async fn serve_slot_document(
    State(state): State<ProviderState>,
    slot_id: Result<Path<u32>, PathRejection>,
) -> Response {
    let (kind, body) = match slot_id {
        Ok(Path(slot)) if state.registry.allocator().contains(slot) => {
            match state.registry.lookup(slot) {
                Some(assignment) => (ServedKind::Real, assignment.document.clone()),
                None => {
                    let index = usize::try_from(slot - 1).unwrap_or(usize::MAX);
                    match state.placeholders.get(index) {
                        Some(doc) => (ServedKind::Placeholder, doc.clone()),
                        None => (ServedKind::Invalid, state.invalid_placeholder.clone()),
                    }
                }
            }
        }
        _ => (ServedKind::Invalid, state.invalid_placeholder.clone()),
    };

    state.stats.record(kind);
    if state.stats.should_log() {
        let snapshot = state.stats.snapshot();
        info!(
            total = snapshot.total_requests,
            real = snapshot.real_served,
            placeholder = snapshot.placeholder_served,
            invalid = snapshot.invalid_requests,
            "provider requests served"
        );
    }

    ([(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response()
}

async fn status(State(state): State<ProviderState>) -> Json<ProviderStatus> {
    let total_slots = state.registry.allocator().total_slots();
    let real_slots = state.registry.active_count();
    let total = usize::try_from(total_slots).unwrap_or(usize::MAX);

    Json(ProviderStatus {
        total_slots,
        real_slots,
        placeholder_slots: total.saturating_sub(real_slots),
        requests: state.stats.snapshot(),
    })
}

async fn list(State(state): State<ProviderState>) -> Json<Vec<SlotListing>> {
    let total_slots = state.registry.allocator().total_slots();
    let mut active = state.registry.list_active().into_iter().peekable();

    let mut listing = Vec::with_capacity(usize::try_from(total_slots).unwrap_or_default());
    for slot in 1..=total_slots {
        match active.next_if(|a| a.slot == slot) {
            Some(assignment) => listing.push(SlotListing {
                slot,
                kind: SlotDocumentKind::Real,
                proxy_id: Some(assignment.proxy_id),
                proxy_name: Some(assignment.proxy_name.clone()),
            }),
            None => listing.push(SlotListing {
                slot,
                kind: SlotDocumentKind::Placeholder,
                proxy_id: None,
                proxy_name: None,
            }),
        }
    }

    Json(listing)
}
