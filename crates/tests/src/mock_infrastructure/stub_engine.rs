//! In-process stand-in for the routing engine's control API.
//!
//! The stub reads the generated engine configuration, fetches every proxy provider from
//! the provider server just like the real engine does at startup, and keeps one selector
//! group per provider. `PUT /providers/proxies/{name}` re-fetches the provider document over
//! HTTP, so the supervisor's smoke test exercises the real provider endpoint end to end.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    io,
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::{net::TcpListener, task::JoinHandle};

/// Misbehaviours the stub can be told to exhibit.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubBehavior {
    /// Accept provider refreshes without re-fetching, as if the provider were unreachable.
    pub ignore_refresh: bool,
    /// Accept selections but never change the selected member.
    pub freeze_selection: bool,
}

/// Snapshot of one selector group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StubGroup {
    pub now: Option<String>,
    pub all: Vec<String>,
}

struct StubState {
    behavior: StubBehavior,
    http: reqwest::Client,
    providers: RwLock<HashMap<String, String>>,
    groups: RwLock<HashMap<String, StubGroup>>,
    refreshes: AtomicUsize,
    selections: AtomicUsize,
}

impl StubState {
    async fn fetch_members(&self, provider: &str) -> Result<Vec<String>, String> {
        let url = self
            .providers
            .read()
            .get(provider)
            .cloned()
            .ok_or_else(|| format!("unknown provider {provider}"))?;

        let document: Value = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .json()
            .await
            .map_err(|e| e.to_string())?;

        Ok(document["proxies"]
            .as_array()
            .map(|entries| {
                entries.iter().filter_map(|entry| entry["name"].as_str().map(str::to_string)).collect()
            })
            .unwrap_or_default())
    }

    fn apply_members(&self, provider: &str, members: Vec<String>) {
        let mut groups = self.groups.write();
        let group = groups.entry(provider.to_string()).or_default();
        let keep_current = self.behavior.freeze_selection
            || group.now.as_ref().is_some_and(|now| members.contains(now));
        if !keep_current {
            group.now = members.first().cloned();
        }
        group.all = members;
    }
}

/// A running stub engine bound to an ephemeral loopback port.
pub struct StubEngine {
    addr: SocketAddr,
    state: Arc<StubState>,
    task: JoinHandle<()>,
}

impl StubEngine {
    /// Starts the stub control API.
    ///
    /// # Panics
    /// Panics if no loopback port can be bound.
    pub async fn start(behavior: StubBehavior) -> Self {
        let state = Arc::new(StubState {
            behavior,
            http: reqwest::Client::new(),
            providers: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
            refreshes: AtomicUsize::new(0),
            selections: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/version", get(version))
            .route("/providers/proxies/{name}", put(refresh_provider))
            .route("/proxies/{name}", get(get_group).put(select_member))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub engine");
        let addr = listener.local_addr().expect("stub engine address");
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state, task }
    }

    #[must_use]
    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Loads providers from a generated engine configuration and performs the initial fetch.
    ///
    /// # Errors
    /// Returns an error if the file is missing or not valid JSON.
    pub async fn load_config(&self, path: &std::path::Path) -> io::Result<()> {
        let raw = tokio::fs::read(path).await?;
        let config: Value = serde_json::from_slice(&raw).map_err(io::Error::other)?;

        let providers: HashMap<String, String> = config["proxy-providers"]
            .as_object()
            .map(|providers| {
                providers
                    .iter()
                    .filter_map(|(name, provider)| {
                        provider["url"].as_str().map(|url| (name.clone(), url.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let names: Vec<String> = providers.keys().cloned().collect();
        *self.state.providers.write() = providers;
        self.state.groups.write().clear();

        for name in names {
            let members = self.state.fetch_members(&name).await.unwrap_or_default();
            self.state.apply_members(&name, members);
        }
        Ok(())
    }

    #[must_use]
    pub fn group(&self, name: &str) -> Option<StubGroup> {
        self.state.groups.read().get(name).cloned()
    }

    #[must_use]
    pub fn refresh_count(&self) -> usize {
        self.state.refreshes.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn selection_count(&self) -> usize {
        self.state.selections.load(Ordering::SeqCst)
    }
}

impl Drop for StubEngine {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn not_found(name: &str) -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "message": format!("{name} not found") }))).into_response()
}

async fn version() -> Json<Value> {
    Json(json!({ "meta": true, "version": "stub-1.0.0" }))
}

async fn refresh_provider(State(state): State<Arc<StubState>>, Path(name): Path<String>) -> Response {
    if !state.providers.read().contains_key(&name) {
        return not_found(&name);
    }
    state.refreshes.fetch_add(1, Ordering::SeqCst);
    if state.behavior.ignore_refresh {
        return StatusCode::NO_CONTENT.into_response();
    }

    match state.fetch_members(&name).await {
        Ok(members) => {
            state.apply_members(&name, members);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(message) => (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "message": message }))).into_response(),
    }
}

async fn get_group(State(state): State<Arc<StubState>>, Path(name): Path<String>) -> Response {
    match state.groups.read().get(&name) {
        Some(group) => Json(json!({
            "name": name,
            "type": "Selector",
            "now": group.now,
            "all": group.all,
        }))
        .into_response(),
        None => not_found(&name),
    }
}

#[derive(Deserialize)]
struct SelectBody {
    name: String,
}

async fn select_member(
    State(state): State<Arc<StubState>>,
    Path(name): Path<String>,
    Json(body): Json<SelectBody>,
) -> Response {
    let mut groups = state.groups.write();
    let Some(group) = groups.get_mut(&name) else {
        return not_found(&name);
    };
    if !group.all.contains(&body.name) {
        return (StatusCode::BAD_REQUEST, Json(json!({ "message": "Selector update error: not found" })))
            .into_response();
    }

    state.selections.fetch_add(1, Ordering::SeqCst);
    if !state.behavior.freeze_selection {
        group.now = Some(body.name);
    }
    StatusCode::NO_CONTENT.into_response()
}
